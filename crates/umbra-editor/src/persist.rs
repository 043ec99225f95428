//! Save and load.
//!
//! Entities save themselves as `(name, value)` pairs through an emit
//! callback. Loading accepts the pairs back in any order. References to
//! other entities are collected on the first pass and resolved on a second
//! one, once every entity exists, through an id lookup.

use crate::error::EditorError;
use crate::item::ItemKind;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::collections::HashMap;
use umbra_core::geometry::{Matrix, Point};
use umbra_core::model::{PRESENTATION, Upper};
use umbra_core::{AttrValue, ElementId, ElementType, ModelError, Name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistValue {
    Number(f64),
    Text(String),
    Matrix([f64; 6]),
    Points(Vec<(f64, f64)>),
    Reference(ElementId),
    References(Vec<ElementId>),
    Connection { target: ElementId, port: usize },
    Attribute(AttrValue),
}

fn unexpected(name: &str, value: &PersistValue) -> EditorError {
    EditorError::Load {
        name: name.to_string(),
        reason: format!("unexpected value {value:?}"),
    }
}

// ─── Records ─────────────────────────────────────────────────────────────

/// A saved registry element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub id: ElementId,
    pub ty: String,
    #[serde(default)]
    pub generalizations: Vec<String>,
    pub values: Vec<(String, PersistValue)>,
}

impl ElementRecord {
    pub fn element_type(&self) -> ElementType {
        self.generalizations
            .iter()
            .fold(ElementType::new(&self.ty), |ty, g| ty.extends(g))
    }

    pub fn loader(&self) -> Result<ElementLoader, EditorError> {
        let mut loader = ElementLoader::new(self.id, self.element_type());
        for (name, value) in &self.values {
            loader.load(name, value.clone())?;
        }
        Ok(loader)
    }
}

/// A saved presentation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ElementId,
    pub diagram: ElementId,
    pub kind: ItemKind,
    pub values: Vec<(String, PersistValue)>,
}

impl ItemRecord {
    pub fn loader(&self) -> Result<ItemLoader, EditorError> {
        let mut loader = ItemLoader::new(self.id, self.diagram, self.kind);
        for (name, value) in &self.values {
            loader.load(name, value.clone())?;
        }
        Ok(loader)
    }
}

/// Everything a session holds, as records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub elements: Vec<ElementRecord>,
    pub items: Vec<ItemRecord>,
}

// ─── Loaders ─────────────────────────────────────────────────────────────

/// First-pass state of an element being loaded.
#[derive(Debug, Clone)]
pub struct ElementLoader {
    pub id: ElementId,
    pub ty: ElementType,
    attributes: Vec<(Name, AttrValue)>,
    references: Vec<(Name, SmallVec<[ElementId; 2]>)>,
}

impl ElementLoader {
    pub fn new(id: ElementId, ty: ElementType) -> Self {
        Self {
            id,
            ty,
            attributes: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn load(&mut self, name: &str, value: PersistValue) -> Result<(), EditorError> {
        match value {
            PersistValue::Attribute(v) => self.attributes.push((Name::new(name), v)),
            PersistValue::Reference(id) => self.references.push((Name::new(name), smallvec![id])),
            PersistValue::References(ids) => self
                .references
                .push((Name::new(name), SmallVec::from_vec(ids))),
            other => return Err(unexpected(name, &other)),
        }
        Ok(())
    }

    /// Every element this one refers to.
    pub fn references(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.references.iter().flat_map(|(_, ids)| ids.iter().copied())
    }

    /// Drop references `keep` rejects.
    pub fn retain_references(&mut self, keep: impl Fn(ElementId) -> bool) {
        for (_, ids) in &mut self.references {
            ids.retain(|id| keep(*id));
        }
        self.references.retain(|(_, ids)| !ids.is_empty());
    }
}

/// First-pass state of an item being loaded.
#[derive(Debug, Clone)]
pub struct ItemLoader {
    pub id: ElementId,
    pub diagram: ElementId,
    pub kind: ItemKind,
    pub matrix: Matrix,
    width: Option<f64>,
    height: Option<f64>,
    points: Option<Vec<Point>>,
    combined: Option<String>,
    subject: Option<ElementId>,
    /// `(handle index, target item, port index)`
    connections: SmallVec<[(usize, ElementId, usize); 2]>,
}

impl ItemLoader {
    pub fn new(id: ElementId, diagram: ElementId, kind: ItemKind) -> Self {
        Self {
            id,
            diagram,
            kind,
            matrix: Matrix::IDENTITY,
            width: None,
            height: None,
            points: None,
            combined: None,
            subject: None,
            connections: SmallVec::new(),
        }
    }

    pub fn load(&mut self, name: &str, value: PersistValue) -> Result<(), EditorError> {
        match (name, value) {
            ("matrix", PersistValue::Matrix(coeffs)) => self.matrix = Matrix::new(coeffs),
            ("width", PersistValue::Number(n)) => self.width = Some(n),
            ("height", PersistValue::Number(n)) => self.height = Some(n),
            ("points", PersistValue::Points(points)) => {
                self.points = Some(points.into_iter().map(Point::from).collect());
            }
            ("combined", PersistValue::Text(s)) => self.combined = Some(s),
            ("subject", PersistValue::Reference(id)) => self.subject = Some(id),
            ("head-connection", PersistValue::Connection { target, port }) => {
                self.connections.push((0, target, port));
            }
            ("tail-connection", PersistValue::Connection { target, port }) => {
                self.connections.push((1, target, port));
            }
            (name, other) => return Err(unexpected(name, &other)),
        }
        Ok(())
    }

    /// Handle layout in item coordinates, if the saved state carries one.
    /// Saved points win; a bare size rebuilds the layout from the origin.
    pub fn local_points(&self, width: f64, height: f64) -> Option<Vec<Point>> {
        if let Some(points) = &self.points {
            return Some(points.clone());
        }
        match self.kind {
            ItemKind::Element if self.width.is_some() || self.height.is_some() => {
                let w = self.width.unwrap_or(width);
                let h = self.height.unwrap_or(height);
                Some(vec![
                    Point::new(0.0, 0.0),
                    Point::new(w, 0.0),
                    Point::new(w, h),
                    Point::new(0.0, h),
                ])
            }
            ItemKind::Fork => self
                .height
                .map(|h| vec![Point::new(0.0, 0.0), Point::new(0.0, h)]),
            ItemKind::Element | ItemKind::Line => None,
        }
    }

    pub fn combined(&self) -> Option<&str> {
        self.combined.as_deref()
    }

    pub fn subject(&self) -> Option<ElementId> {
        self.subject
    }

    pub fn connections(&self) -> &[(usize, ElementId, usize)] {
        &self.connections
    }
}

// ─── Session save/load ───────────────────────────────────────────────────

impl Session {
    /// Emit an element's attributes and associations. Presentations are
    /// saved by their items, so the `presentation` end is skipped.
    pub fn save_element(
        &self,
        id: ElementId,
        emit: &mut dyn FnMut(&str, PersistValue),
    ) -> Result<(), EditorError> {
        let element = self.graph.element(id)?;
        let mut attributes: Vec<(&Name, &AttrValue)> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (name, value) in attributes {
            emit(name.as_str(), PersistValue::Attribute(value.clone()));
        }

        let presentation = Name::new(PRESENTATION);
        let mut slots: Vec<Name> = element
            .slots
            .keys()
            .copied()
            .filter(|n| *n != presentation)
            .collect();
        slots.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for name in slots {
            let values = element.values(name);
            match (self.is_single(name), values) {
                (true, [value]) => emit(name.as_str(), PersistValue::Reference(*value)),
                _ => emit(name.as_str(), PersistValue::References(values.to_vec())),
            }
        }
        Ok(())
    }

    /// Emit an item's geometry, variant state, subject and connections.
    pub fn save_item(
        &self,
        id: ElementId,
        emit: &mut dyn FnMut(&str, PersistValue),
    ) -> Result<(), EditorError> {
        let diagram = self.diagram_of(id)?;
        let item = diagram.item(id)?;
        item.save(&diagram.canvas, self.subject(id), emit)
    }

    pub fn element_record(&self, id: ElementId) -> Result<ElementRecord, EditorError> {
        let element = self.graph.element(id)?;
        let mut values = Vec::new();
        self.save_element(id, &mut |name: &str, value: PersistValue| {
            values.push((name.to_string(), value))
        })?;
        Ok(ElementRecord {
            id,
            ty: element.ty.name().to_string(),
            generalizations: element
                .ty
                .generalizations()
                .iter()
                .map(|g| g.to_string())
                .collect(),
            values,
        })
    }

    pub fn item_record(&self, id: ElementId) -> Result<ItemRecord, EditorError> {
        let diagram = self.diagram_of(id)?;
        let kind = diagram.item(id)?.kind();
        let mut values = Vec::new();
        self.save_item(id, &mut |name: &str, value: PersistValue| {
            values.push((name.to_string(), value))
        })?;
        Ok(ItemRecord {
            id,
            diagram: diagram.id,
            kind,
            values,
        })
    }

    /// Save every registry element and every item, diagrams in registry order.
    pub fn snapshot(&self) -> Result<ModelSnapshot, EditorError> {
        let mut snapshot = ModelSnapshot::default();
        for id in self.graph.lselect() {
            snapshot.elements.push(self.element_record(id)?);
            if let Some(diagram) = self.diagrams.get(&id) {
                for item in diagram.items() {
                    snapshot.items.push(self.item_record(item)?);
                }
            }
        }
        Ok(snapshot)
    }

    /// Load a snapshot under its saved ids, as one transaction.
    pub fn load(&mut self, snapshot: &ModelSnapshot) -> Result<(), EditorError> {
        let elements = snapshot
            .elements
            .iter()
            .map(ElementRecord::loader)
            .collect::<Result<Vec<_>, _>>()?;
        let items = snapshot
            .items
            .iter()
            .map(ItemRecord::loader)
            .collect::<Result<Vec<_>, _>>()?;
        self.load_entities(elements, items, &|id| Some(id))
            .map(|_| ())
    }

    /// Two-pass load: create every entity, then resolve references through
    /// `lookup`. Returns the ids of the loaded items.
    pub fn load_entities(
        &mut self,
        elements: Vec<ElementLoader>,
        items: Vec<ItemLoader>,
        lookup: &dyn Fn(ElementId) -> Option<ElementId>,
    ) -> Result<Vec<ElementId>, EditorError> {
        self.transaction(|s| {
            for loader in &elements {
                s.create_element(loader)?;
            }
            let mut loaded = Vec::with_capacity(items.len());
            for loader in &items {
                loaded.push(s.materialize_item(loader.diagram, loader, Some(loader.id))?);
            }
            s.postload(&elements, &items, lookup)?;
            log::debug!(
                "loaded {} elements and {} items",
                elements.len(),
                items.len()
            );
            Ok(loaded)
        })
    }

    /// Create a loaded element under its saved id, with its attributes.
    pub(crate) fn create_element(&mut self, loader: &ElementLoader) -> Result<(), EditorError> {
        self.graph.create_with_id(loader.ty.clone(), loader.id)?;
        for (name, value) in &loader.attributes {
            self.graph
                .set_attribute(loader.id, *name, Some(value.clone()))?;
        }
        self.flush()
    }

    /// Place a loaded item on `diagram`, with its saved geometry and
    /// `combined` state. `None` gives it a fresh id.
    pub(crate) fn materialize_item(
        &mut self,
        diagram: ElementId,
        loader: &ItemLoader,
        id: Option<ElementId>,
    ) -> Result<ElementId, EditorError> {
        let defaults = self.config().items;
        let points = loader.local_points(defaults.width, defaults.height);
        self.place_item(
            diagram,
            loader.kind,
            loader.matrix,
            points.as_deref(),
            loader.combined().map(str::to_string),
            id,
        )
    }

    /// Second pass: associations, subjects and connections.
    pub(crate) fn postload(
        &mut self,
        elements: &[ElementLoader],
        items: &[ItemLoader],
        lookup: &dyn Fn(ElementId) -> Option<ElementId>,
    ) -> Result<(), EditorError> {
        let resolve = |id: ElementId| lookup(id).ok_or(ModelError::UnknownElement(id));
        // Multi-valued ends go first so their saved order survives; the
        // single-valued opposites are already linked by then.
        for single in [false, true] {
            for loader in elements {
                let holder = resolve(loader.id)?;
                for (name, values) in &loader.references {
                    if self.is_single(*name) != single {
                        continue;
                    }
                    for value in values {
                        self.graph.add(holder, *name, resolve(*value)?)?;
                    }
                }
                self.flush()?;
            }
        }
        for loader in items {
            let item = resolve(loader.id)?;
            if let Some(subject) = loader.subject {
                self.set_subject(item, Some(resolve(subject)?))?;
            }
            self.resolve_connections(item, loader, |target| lookup(target))?;
        }
        self.solve_all()
    }

    fn is_single(&self, name: Name) -> bool {
        self.graph
            .schema()
            .get(name)
            .is_some_and(|d| d.upper == Upper::One)
    }

    /// Reconnect an item's saved connections whose target resolves.
    pub(crate) fn resolve_connections(
        &mut self,
        item: ElementId,
        loader: &ItemLoader,
        lookup: impl Fn(ElementId) -> Option<ElementId>,
    ) -> Result<(), EditorError> {
        let handles: Vec<_> = self.item(item)?.handles().iter().map(|h| h.id).collect();
        for &(index, target, port) in loader.connections() {
            // Head is the first handle, tail the last.
            let handle = match index {
                0 => handles.first(),
                _ => handles.last(),
            };
            let Some(&handle) = handle else {
                continue;
            };
            if let Some(target) = lookup(target) {
                self.connect(item, handle, target, Some(port))?;
            }
        }
        Ok(())
    }
}

/// Identity lookup restricted to a set of known ids.
pub fn lookup_in(map: &HashMap<ElementId, ElementId>) -> impl Fn(ElementId) -> Option<ElementId> + '_ {
    move |id| map.get(&id).copied()
}
