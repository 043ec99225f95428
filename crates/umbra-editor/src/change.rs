//! Recorded changes.
//!
//! A transaction records every change in the order it happened. Model and
//! canvas changes wrap their crates' events; item lifecycle, matrix and
//! `combined` changes are editor-level. Each change can be inverted, so
//! undo is "replay the inverses, newest first".

use crate::item::Item;
use smallvec::SmallVec;
use umbra_canvas::CanvasEvent;
use umbra_core::geometry::{Matrix, Point};
use umbra_core::{Element, ElementId, ModelEvent};

/// Everything needed to bring a removed item back exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    /// The presentation node, slots not included.
    pub node: Element,
    pub item: Item,
    /// Handle positions in canvas coordinates.
    pub positions: SmallVec<[Point; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Model(ModelEvent),
    Canvas {
        diagram: ElementId,
        event: CanvasEvent,
    },
    ItemCreated(Box<ItemSnapshot>),
    ItemDeleted(Box<ItemSnapshot>),
    ItemMatrix {
        item: ElementId,
        old: Matrix,
        new: Matrix,
    },
    ItemCombined {
        item: ElementId,
        old: Option<String>,
        new: Option<String>,
    },
}

impl Change {
    #[must_use]
    pub fn invert(&self) -> Change {
        match self.clone() {
            Change::Model(event) => Change::Model(event.invert()),
            Change::Canvas { diagram, event } => Change::Canvas {
                diagram,
                event: event.invert(),
            },
            Change::ItemCreated(snapshot) => Change::ItemDeleted(snapshot),
            Change::ItemDeleted(snapshot) => Change::ItemCreated(snapshot),
            Change::ItemMatrix { item, old, new } => Change::ItemMatrix {
                item,
                old: new,
                new: old,
            },
            Change::ItemCombined { item, old, new } => Change::ItemCombined {
                item,
                old: new,
                new: old,
            },
        }
    }
}
