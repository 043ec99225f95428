//! Element model: types, attribute values, association definitions.
//!
//! The UML metamodel itself is opaque to the core. An element only knows
//! its type name (plus generalizations, for `[Type]` narrowing), a bag of
//! typed attributes, and named association slots. Cardinality, the
//! opposite end and composite ownership live in the [`Schema`].

use crate::id::{ElementId, Name};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Association connecting a presentation item to the element it shows.
pub const SUBJECT: &str = "subject";
/// Opposite of [`SUBJECT`]: all presentations of an element.
pub const PRESENTATION: &str = "presentation";

// ─── Attribute values ────────────────────────────────────────────────────

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Float(n)
    }
}

// ─── Element types ───────────────────────────────────────────────────────

/// The type of an element, with the names of the types it specializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementType {
    name: Name,
    generalizations: SmallVec<[Name; 2]>,
}

impl ElementType {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            generalizations: SmallVec::new(),
        }
    }

    /// Builder: declare a supertype (`Class` extends `NamedElement`).
    #[must_use]
    pub fn extends(mut self, general: &str) -> Self {
        let general = Name::new(general);
        if !self.generalizations.contains(&general) {
            self.generalizations.push(general);
        }
        self
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn generalizations(&self) -> &[Name] {
        &self.generalizations
    }

    /// True if this type is `ty` or specializes it.
    pub fn is_a(&self, ty: Name) -> bool {
        self.name == ty || self.generalizations.contains(&ty)
    }
}

// ─── Associations ────────────────────────────────────────────────────────

/// Upper bound of an association end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Upper {
    One,
    Many,
}

/// Definition of a named association end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDef {
    pub name: Name,
    pub upper: Upper,
    /// The association on the other end, kept consistent on every mutation.
    pub opposite: Option<Name>,
    /// The holder owns the values: unlinking the holder unlinks them.
    pub composite: bool,
}

impl AssociationDef {
    pub fn one(name: &str) -> Self {
        Self {
            name: Name::new(name),
            upper: Upper::One,
            opposite: None,
            composite: false,
        }
    }

    pub fn many(name: &str) -> Self {
        Self {
            name: Name::new(name),
            upper: Upper::Many,
            opposite: None,
            composite: false,
        }
    }

    #[must_use]
    pub fn opposite(mut self, name: &str) -> Self {
        self.opposite = Some(Name::new(name));
        self
    }

    #[must_use]
    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }
}

/// Association definitions known to a session, looked up by name.
#[derive(Debug, Clone)]
pub struct Schema {
    associations: HashMap<Name, AssociationDef>,
}

impl Schema {
    /// A schema with the `subject` / `presentation` pair predeclared.
    ///
    /// `presentation` is composite: deleting a subject unlinks its
    /// presentations, while unlinking a presentation leaves the subject alone.
    pub fn new() -> Self {
        let mut schema = Self {
            associations: HashMap::new(),
        };
        schema.define(AssociationDef::one(SUBJECT).opposite(PRESENTATION));
        schema.define(
            AssociationDef::many(PRESENTATION)
                .opposite(SUBJECT)
                .composite(),
        );
        schema
    }

    /// Register (or replace) an association definition.
    pub fn define(&mut self, def: AssociationDef) -> &mut Self {
        self.associations.insert(def.name, def);
        self
    }

    pub fn get(&self, name: Name) -> Option<&AssociationDef> {
        self.associations.get(&name)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Elements ────────────────────────────────────────────────────────────

/// Who owns an element's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// A model element, listed by the element registry.
    Registry,
    /// A presentation item owned by a diagram; never listed by the registry.
    Diagram(ElementId),
}

/// A node in the element graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub ty: ElementType,
    pub owner: Owner,
    pub attributes: HashMap<Name, AttrValue>,
    /// Association values in insertion order.
    pub slots: HashMap<Name, SmallVec<[ElementId; 2]>>,
}

impl Element {
    pub fn new(id: ElementId, ty: ElementType, owner: Owner) -> Self {
        Self {
            id,
            ty,
            owner,
            attributes: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn is_presentation(&self) -> bool {
        matches!(self.owner, Owner::Diagram(_))
    }

    pub fn values(&self, association: Name) -> &[ElementId] {
        self.slots
            .get(&association)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// True if no association slot holds a value.
    pub fn is_detached(&self) -> bool {
        self.slots.values().all(|v| v.is_empty())
    }
}
