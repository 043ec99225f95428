//! Change events emitted by the element graph.
//!
//! Every event is one-sided: a bidirectional association change emits one
//! event per end. Replaying the inverse of each event, newest first, through
//! [`ElementGraph::replay`](crate::graph::ElementGraph::replay) restores the
//! previous state without the opposite ends being touched twice.

use crate::id::{ElementId, Name};
use crate::model::{AttrValue, Element};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A registry element was created. Carries its initial snapshot.
    ElementCreated { element: Box<Element> },
    /// A registry element was removed. Carries its last (detached) snapshot.
    ElementDeleted { element: Box<Element> },
    AttributeUpdated {
        element: ElementId,
        name: Name,
        old: Option<AttrValue>,
        new: Option<AttrValue>,
    },
    /// A single-valued association changed.
    AssociationSet {
        element: ElementId,
        name: Name,
        old: Option<ElementId>,
        new: Option<ElementId>,
    },
    /// A value was inserted into a multi-valued association at `index`.
    AssociationAdded {
        element: ElementId,
        name: Name,
        value: ElementId,
        index: usize,
    },
    /// A value was removed from a multi-valued association at `index`.
    AssociationDeleted {
        element: ElementId,
        name: Name,
        value: ElementId,
        index: usize,
    },
}

impl ModelEvent {
    /// The element whose state changed.
    pub fn element(&self) -> ElementId {
        match self {
            ModelEvent::ElementCreated { element } | ModelEvent::ElementDeleted { element } => {
                element.id
            }
            ModelEvent::AttributeUpdated { element, .. }
            | ModelEvent::AssociationSet { element, .. }
            | ModelEvent::AssociationAdded { element, .. }
            | ModelEvent::AssociationDeleted { element, .. } => *element,
        }
    }

    /// The attribute or association touched, if any.
    pub fn property(&self) -> Option<Name> {
        match self {
            ModelEvent::ElementCreated { .. } | ModelEvent::ElementDeleted { .. } => None,
            ModelEvent::AttributeUpdated { name, .. }
            | ModelEvent::AssociationSet { name, .. }
            | ModelEvent::AssociationAdded { name, .. }
            | ModelEvent::AssociationDeleted { name, .. } => Some(*name),
        }
    }

    /// The event that undoes this one.
    #[must_use]
    pub fn invert(&self) -> ModelEvent {
        match self.clone() {
            ModelEvent::ElementCreated { element } => ModelEvent::ElementDeleted { element },
            ModelEvent::ElementDeleted { element } => ModelEvent::ElementCreated { element },
            ModelEvent::AttributeUpdated {
                element,
                name,
                old,
                new,
            } => ModelEvent::AttributeUpdated {
                element,
                name,
                old: new,
                new: old,
            },
            ModelEvent::AssociationSet {
                element,
                name,
                old,
                new,
            } => ModelEvent::AssociationSet {
                element,
                name,
                old: new,
                new: old,
            },
            ModelEvent::AssociationAdded {
                element,
                name,
                value,
                index,
            } => ModelEvent::AssociationDeleted {
                element,
                name,
                value,
                index,
            },
            ModelEvent::AssociationDeleted {
                element,
                name,
                value,
                index,
            } => ModelEvent::AssociationAdded {
                element,
                name,
                value,
                index,
            },
        }
    }
}
