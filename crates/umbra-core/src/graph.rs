//! The element graph: every model element and presentation node, with
//! association values mirrored as petgraph edges.
//!
//! Slots on the [`Element`] keep the ordered values; the edges make
//! "who references me" a cheap incoming-edge walk, which is what `detach`
//! needs to leave no dangling reference behind.

use crate::error::ModelError;
use crate::event::ModelEvent;
use crate::id::{ElementId, IdGenerator, Name};
use crate::model::{AssociationDef, AttrValue, Element, ElementType, Owner, Schema, Upper};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Edge weight: which association of the source holds the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub association: Name,
}

#[derive(Debug)]
pub struct ElementGraph {
    graph: StableDiGraph<Element, Link>,
    /// Index from ElementId → NodeIndex for fast lookup.
    id_index: HashMap<ElementId, NodeIndex>,
    schema: Schema,
    ids: IdGenerator,
    /// Events not yet picked up by the owner of the graph.
    pending: Vec<ModelEvent>,
}

impl ElementGraph {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            graph: StableDiGraph::new(),
            id_index: HashMap::new(),
            schema,
            ids: IdGenerator::new(),
            pending: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Create a registry element with a fresh id.
    pub fn create(&mut self, ty: ElementType) -> ElementId {
        let id = self.fresh_id(ty.name());
        self.attach(Element::new(id, ty, Owner::Registry));
        id
    }

    /// Create a registry element under a known id (used when loading).
    pub fn create_with_id(&mut self, ty: ElementType, id: ElementId) -> Result<(), ModelError> {
        if self.id_index.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        self.attach(Element::new(id, ty, Owner::Registry));
        Ok(())
    }

    /// Add a presentation node owned by `diagram`. Emits nothing: presentation
    /// lifecycle is announced by the diagram, not the registry.
    pub fn insert_presentation(&mut self, ty: ElementType, diagram: ElementId) -> ElementId {
        let id = self.fresh_id(ty.name());
        self.attach(Element::new(id, ty, Owner::Diagram(diagram)));
        id
    }

    /// Re-insert an element snapshot. Association slots are emptied; they are
    /// restored by their own events.
    pub fn insert_element(&mut self, mut element: Element) -> Result<(), ModelError> {
        if self.id_index.contains_key(&element.id) {
            return Err(ModelError::DuplicateId(element.id));
        }
        element.slots.clear();
        self.attach(element);
        Ok(())
    }

    fn fresh_id(&mut self, ty: Name) -> ElementId {
        loop {
            let id = self.ids.next_with_prefix(ty.as_str());
            if !self.id_index.contains_key(&id) {
                return id;
            }
        }
    }

    fn attach(&mut self, element: Element) {
        let id = element.id;
        let snapshot = (!element.is_presentation()).then(|| Box::new(element.clone()));
        let idx = self.graph.add_node(element);
        self.id_index.insert(id, idx);
        log::trace!("element {id} attached");
        if let Some(element) = snapshot {
            self.pending.push(ModelEvent::ElementCreated { element });
        }
    }

    /// Remove a node from the graph, detaching whatever still references it.
    pub fn delete(&mut self, id: ElementId) -> Result<Element, ModelError> {
        self.detach(id)?;
        let idx = self.index(id)?;
        let element = self
            .graph
            .remove_node(idx)
            .ok_or_else(|| ModelError::unlinked(id))?;
        self.id_index.remove(&id);
        if !element.is_presentation() {
            self.pending.push(ModelEvent::ElementDeleted {
                element: Box::new(element.clone()),
            });
        }
        Ok(element)
    }

    /// Unlink an element and, transitively, everything it owns compositely.
    ///
    /// This is the plain graph-level cascade. Presentation nodes carry canvas
    /// state the graph knows nothing about, so sessions orchestrate their
    /// removal themselves from [`composite_members`](Self::composite_members),
    /// [`detach`](Self::detach) and [`delete`](Self::delete).
    pub fn unlink(&mut self, id: ElementId) -> Result<(), ModelError> {
        self.index(id)?;
        let members = self.composite_members(id);
        self.detach(id)?;
        for member in members {
            if self.contains(member) {
                self.unlink(member)?;
            }
        }
        self.delete(id)?;
        log::debug!("unlinked {id}");
        Ok(())
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    pub fn contains(&self, id: ElementId) -> bool {
        self.id_index.contains_key(&id)
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Like [`get`](Self::get), failing with `InvalidState` for unlinked ids.
    pub fn element(&self, id: ElementId) -> Result<&Element, ModelError> {
        self.get(id).ok_or_else(|| ModelError::unlinked(id))
    }

    fn index(&self, id: ElementId) -> Result<NodeIndex, ModelError> {
        self.id_index
            .get(&id)
            .copied()
            .ok_or_else(|| ModelError::unlinked(id))
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, ModelError> {
        let idx = self.index(id)?;
        Ok(&mut self.graph[idx])
    }

    /// Number of nodes, presentations included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All registry elements. Presentations are never listed.
    pub fn lselect(&self) -> Vec<ElementId> {
        self.graph
            .node_indices()
            .map(|idx| &self.graph[idx])
            .filter(|e| !e.is_presentation())
            .map(|e| e.id)
            .collect()
    }

    /// Registry elements whose type is `ty` or a specialization of it.
    pub fn lselect_type(&self, ty: Name) -> Vec<ElementId> {
        self.graph
            .node_indices()
            .map(|idx| &self.graph[idx])
            .filter(|e| !e.is_presentation() && e.ty.is_a(ty))
            .map(|e| e.id)
            .collect()
    }

    // ─── Attributes ──────────────────────────────────────────────────────

    pub fn attribute(&self, id: ElementId, name: Name) -> Option<&AttrValue> {
        self.get(id).and_then(|e| e.attributes.get(&name))
    }

    /// Set (`Some`) or clear (`None`) an attribute. Unchanged values emit nothing.
    pub fn set_attribute(
        &mut self,
        id: ElementId,
        name: Name,
        value: Option<AttrValue>,
    ) -> Result<(), ModelError> {
        let element = self.element_mut(id)?;
        let old = match &value {
            Some(v) => element.attributes.insert(name, v.clone()),
            None => element.attributes.remove(&name),
        };
        if old != value {
            self.pending.push(ModelEvent::AttributeUpdated {
                element: id,
                name,
                old,
                new: value,
            });
        }
        Ok(())
    }

    // ─── Associations ────────────────────────────────────────────────────

    /// First (for single-valued associations: the only) value.
    pub fn value(&self, id: ElementId, name: Name) -> Option<ElementId> {
        self.values(id, name).first().copied()
    }

    pub fn values(&self, id: ElementId, name: Name) -> &[ElementId] {
        self.get(id).map(|e| e.values(name)).unwrap_or(&[])
    }

    fn definition(&self, name: Name) -> Result<AssociationDef, ModelError> {
        self.schema
            .get(name)
            .cloned()
            .ok_or(ModelError::UnknownAssociation(name))
    }

    /// Add `value` to association `name` of `id`, updating the opposite end.
    ///
    /// Adding a value already present is a no-op. Adding to an occupied
    /// single-valued slot fails; the opposite end, if single-valued, is
    /// replaced instead.
    pub fn add(&mut self, id: ElementId, name: Name, value: ElementId) -> Result<(), ModelError> {
        let def = self.definition(name)?;
        let opposite = def.opposite.map(|o| self.definition(o)).transpose()?;
        let current = self.element(id)?.values(name);
        self.element(value)?;
        if current.contains(&value) {
            return Ok(());
        }
        if def.upper == Upper::One && !current.is_empty() {
            return Err(ModelError::ConstraintViolation {
                id,
                association: name,
                reason: "single-valued association already holds a value",
            });
        }
        self.push_value(id, name, value, None)?;
        if let Some(opposite) = opposite {
            self.link_opposite(value, &opposite, id)?;
        }
        Ok(())
    }

    fn link_opposite(
        &mut self,
        holder: ElementId,
        def: &AssociationDef,
        value: ElementId,
    ) -> Result<(), ModelError> {
        let current: SmallVec<[ElementId; 2]> = self.values(holder, def.name).into();
        if current.contains(&value) {
            return Ok(());
        }
        if def.upper == Upper::One {
            for old in current {
                self.remove(holder, def.name, old)?;
            }
        }
        self.push_value(holder, def.name, value, None)
    }

    /// Remove `value` from association `name` of `id` and from the opposite end.
    /// Removing an absent value is a no-op.
    pub fn remove(&mut self, id: ElementId, name: Name, value: ElementId) -> Result<(), ModelError> {
        self.definition(name)?;
        if !self.element(id)?.values(name).contains(&value) {
            return Ok(());
        }
        self.unlink_value(id, name, value)
    }

    /// Replace the value of a single-valued association.
    pub fn set_one(
        &mut self,
        id: ElementId,
        name: Name,
        value: Option<ElementId>,
    ) -> Result<(), ModelError> {
        let def = self.definition(name)?;
        if def.upper != Upper::One {
            return Err(ModelError::ConstraintViolation {
                id,
                association: name,
                reason: "association is multi-valued",
            });
        }
        self.element(id)?;
        if let Some(value) = value {
            self.element(value)?;
        }
        let current = self.value(id, name);
        if current == value {
            return Ok(());
        }
        if let Some(old) = current {
            self.remove(id, name, old)?;
        }
        if let Some(value) = value {
            self.add(id, name, value)?;
        }
        Ok(())
    }

    /// Drop every association the element takes part in, on both ends.
    pub fn detach(&mut self, id: ElementId) -> Result<(), ModelError> {
        let mut names: Vec<Name> = self.element(id)?.slots.keys().copied().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for name in names {
            let values: SmallVec<[ElementId; 2]> = self.values(id, name).into();
            for value in values {
                self.unlink_value(id, name, value)?;
            }
        }

        let idx = self.index(id)?;
        let incoming: Vec<(ElementId, Name)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (self.graph[e.source()].id, e.weight().association))
            .collect();
        for (holder, name) in incoming {
            self.pop_value(holder, name, id)?;
        }
        Ok(())
    }

    /// Values held through composite associations, in slot order.
    pub fn composite_members(&self, id: ElementId) -> Vec<ElementId> {
        let Some(element) = self.get(id) else {
            return Vec::new();
        };
        let mut names: Vec<Name> = element
            .slots
            .keys()
            .copied()
            .filter(|n| self.schema.get(*n).is_some_and(|d| d.composite))
            .collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
            .into_iter()
            .flat_map(|n| element.values(n).iter().copied())
            .collect()
    }

    fn unlink_value(&mut self, id: ElementId, name: Name, value: ElementId) -> Result<(), ModelError> {
        self.pop_value(id, name, value)?;
        if let Some(opposite) = self.schema.get(name).and_then(|d| d.opposite)
            && self.values(value, opposite).contains(&id)
        {
            self.pop_value(value, opposite, id)?;
        }
        Ok(())
    }

    fn upper(&self, name: Name) -> Upper {
        self.schema.get(name).map_or(Upper::Many, |d| d.upper)
    }

    /// One-sided insert. Emits one event.
    fn push_value(
        &mut self,
        id: ElementId,
        name: Name,
        value: ElementId,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        let upper = self.upper(name);
        let holder_idx = self.index(id)?;
        let value_idx = self.index(value)?;
        let slot = self.graph[holder_idx].slots.entry(name).or_default();
        if slot.contains(&value) {
            return Ok(());
        }
        let index = index.map_or(slot.len(), |i| i.min(slot.len()));
        slot.insert(index, value);
        self.graph
            .add_edge(holder_idx, value_idx, Link { association: name });
        self.pending.push(match upper {
            Upper::One => ModelEvent::AssociationSet {
                element: id,
                name,
                old: None,
                new: Some(value),
            },
            Upper::Many => ModelEvent::AssociationAdded {
                element: id,
                name,
                value,
                index,
            },
        });
        Ok(())
    }

    /// One-sided removal. Emits one event, or nothing if the value is absent.
    fn pop_value(&mut self, id: ElementId, name: Name, value: ElementId) -> Result<(), ModelError> {
        let upper = self.upper(name);
        let holder_idx = self.index(id)?;
        let element = &mut self.graph[holder_idx];
        let Some(slot) = element.slots.get_mut(&name) else {
            return Ok(());
        };
        let Some(index) = slot.iter().position(|v| *v == value) else {
            return Ok(());
        };
        slot.remove(index);
        if slot.is_empty() {
            element.slots.remove(&name);
        }

        if let Some(value_idx) = self.id_index.get(&value).copied() {
            let edge = self
                .graph
                .edges_connecting(holder_idx, value_idx)
                .find(|e| e.weight().association == name)
                .map(|e| e.id());
            if let Some(edge) = edge {
                self.graph.remove_edge(edge);
            }
        }

        self.pending.push(match upper {
            Upper::One => ModelEvent::AssociationSet {
                element: id,
                name,
                old: Some(value),
                new: None,
            },
            Upper::Many => ModelEvent::AssociationDeleted {
                element: id,
                name,
                value,
                index,
            },
        });
        Ok(())
    }

    // ─── Replay ──────────────────────────────────────────────────────────

    /// Apply a recorded event one-sidedly. The opposite end has its own
    /// event in the same record list, so it is never touched here.
    pub fn replay(&mut self, event: &ModelEvent) -> Result<(), ModelError> {
        match event {
            ModelEvent::ElementCreated { element } => self.insert_element(element.as_ref().clone()),
            ModelEvent::ElementDeleted { element } => self.delete(element.id).map(|_| ()),
            ModelEvent::AttributeUpdated {
                element, name, new, ..
            } => self.set_attribute(*element, *name, new.clone()),
            ModelEvent::AssociationSet {
                element,
                name,
                old,
                new,
            } => {
                if let Some(old) = old {
                    self.pop_value(*element, *name, *old)?;
                }
                if let Some(new) = new {
                    self.push_value(*element, *name, *new, None)?;
                }
                Ok(())
            }
            ModelEvent::AssociationAdded {
                element,
                name,
                value,
                index,
            } => self.push_value(*element, *name, *value, Some(*index)),
            ModelEvent::AssociationDeleted {
                element,
                name,
                value,
                ..
            } => self.pop_value(*element, *name, *value),
        }
    }

    /// Take the events emitted since the last drain, in mutation order.
    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for ElementGraph {
    fn default() -> Self {
        Self::new(Schema::new())
    }
}
