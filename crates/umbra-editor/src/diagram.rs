//! Per-diagram state: the canvas and the items placed on it.

use crate::error::EditorError;
use crate::item::Item;
use std::collections::HashMap;
use umbra_canvas::{Canvas, SolverConfig, VarId};
use umbra_core::ElementId;

#[derive(Debug)]
pub struct Diagram {
    pub id: ElementId,
    pub canvas: Canvas,
    /// Items in creation order.
    order: Vec<ElementId>,
    map: HashMap<ElementId, Item>,
    /// Items with a pending visual update, in request order.
    dirty: Vec<ElementId>,
    /// Which item a handle variable belongs to.
    var_owner: HashMap<VarId, ElementId>,
}

impl Diagram {
    pub fn new(id: ElementId, config: SolverConfig) -> Self {
        Self {
            id,
            canvas: Canvas::new(config),
            order: Vec::new(),
            map: HashMap::new(),
            dirty: Vec::new(),
            var_owner: HashMap::new(),
        }
    }

    pub fn item(&self, id: ElementId) -> Result<&Item, EditorError> {
        self.map.get(&id).ok_or(EditorError::InvalidItem {
            item: id,
            reason: "not an item of this diagram",
        })
    }

    pub fn item_mut(&mut self, id: ElementId) -> Result<&mut Item, EditorError> {
        self.map.get_mut(&id).ok_or(EditorError::InvalidItem {
            item: id,
            reason: "not an item of this diagram",
        })
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn insert_item(&mut self, item: Item) {
        for handle in item.handles() {
            self.var_owner.insert(handle.pos.x, item.id);
            self.var_owner.insert(handle.pos.y, item.id);
        }
        if !self.order.contains(&item.id) {
            self.order.push(item.id);
        }
        self.map.insert(item.id, item);
    }

    pub fn remove_item(&mut self, id: ElementId) -> Option<Item> {
        let item = self.map.remove(&id)?;
        for handle in item.handles() {
            self.var_owner.remove(&handle.pos.x);
            self.var_owner.remove(&handle.pos.y);
        }
        self.order.retain(|i| *i != id);
        self.dirty.retain(|i| *i != id);
        Some(item)
    }

    /// The item whose handle is backed by `var`.
    pub fn owner_of(&self, var: VarId) -> Option<ElementId> {
        self.var_owner.get(&var).copied()
    }

    /// Schedule a visual update. Returns `false` if one is already pending.
    pub fn request_update(&mut self, item: ElementId) -> bool {
        if !self.map.contains_key(&item) || self.dirty.contains(&item) {
            return false;
        }
        self.dirty.push(item);
        true
    }

    /// Items waiting for a visual update, oldest request first.
    pub fn take_updates(&mut self) -> Vec<ElementId> {
        std::mem::take(&mut self.dirty)
    }
}
