//! Watch paths: declarative subscriptions from an item to nested state of
//! its subject.
//!
//! A path like `subject[NamedElement].name` is resolved against the element
//! graph into concrete `(element, property)` keys. Every association crossed
//! on the way is a *hop*: when a hop changes, the item is re-resolved so the
//! subscription follows the new target.

use crate::error::EditorError;
use crate::session::Session;
use smallvec::{SmallVec, smallvec};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use umbra_core::model::SUBJECT;
use umbra_core::{ElementGraph, ElementId, ModelEvent, Name};

// ─── Paths ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// An association (followed) or an attribute (ends the walk). Which one
    /// is decided by the schema at resolution time.
    Property(Name),
    /// Keep only elements of this type or a subtype.
    OfType(Name),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchPath {
    steps: SmallVec<[Step; 4]>,
}

impl WatchPath {
    /// The bare `subject` path.
    pub fn subject() -> Self {
        Self {
            steps: smallvec![Step::Property(Name::new(SUBJECT))],
        }
    }

    #[must_use]
    pub fn then(mut self, property: &str) -> Self {
        self.steps.push(Step::Property(Name::new(property)));
        self
    }

    #[must_use]
    pub fn of_type(mut self, ty: &str) -> Self {
        self.steps.push(Step::OfType(Name::new(ty)));
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Concrete keys for this path starting at `item`, each flagged with
    /// whether it is an association hop.
    fn resolve(&self, item: ElementId, graph: &ElementGraph) -> Vec<((ElementId, Name), bool)> {
        let mut current: SmallVec<[ElementId; 4]> = smallvec![item];
        let mut keys = Vec::new();
        for step in &self.steps {
            match *step {
                Step::Property(name) => {
                    let hop = graph.schema().get(name).is_some();
                    keys.extend(current.iter().map(|e| ((*e, name), hop)));
                    if hop {
                        current = current
                            .iter()
                            .flat_map(|e| graph.values(*e, name).iter().copied())
                            .collect();
                    } else {
                        current.clear();
                    }
                }
                Step::OfType(ty) => {
                    current.retain(|e| graph.get(*e).is_some_and(|el| el.ty.is_a(ty)));
                }
            }
        }
        keys
    }
}

impl FromStr for WatchPath {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EditorError::InvalidPath(s.to_string());
        let is_ident = |t: &str| {
            !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        };

        let mut steps = SmallVec::new();
        for segment in s.split('.') {
            let (name, mut rest) = segment.split_at(segment.find('[').unwrap_or(segment.len()));
            if !is_ident(name) {
                return Err(invalid());
            }
            steps.push(Step::Property(Name::new(name)));
            while !rest.is_empty() {
                let inner = rest.strip_prefix('[').ok_or_else(invalid)?;
                let end = inner.find(']').ok_or_else(invalid)?;
                if !is_ident(&inner[..end]) {
                    return Err(invalid());
                }
                steps.push(Step::OfType(Name::new(&inner[..end])));
                rest = &inner[end + 1..];
            }
        }
        Ok(Self { steps })
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Property(name) if i == 0 => write!(f, "{name}")?,
                Step::Property(name) => write!(f, ".{name}")?,
                Step::OfType(ty) => write!(f, "[{ty}]")?,
            }
        }
        Ok(())
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────

pub type HandlerFn = Rc<dyn Fn(&mut Session, ElementId, &ModelEvent) -> Result<(), EditorError>>;

/// What runs when a watched key changes. Called with the watching item.
#[derive(Clone)]
pub enum Handler {
    /// Schedule a visual update of the item.
    RequestUpdate,
    Custom(HandlerFn),
}

impl Handler {
    pub fn custom(
        f: impl Fn(&mut Session, ElementId, &ModelEvent) -> Result<(), EditorError> + 'static,
    ) -> Self {
        Handler::Custom(Rc::new(f))
    }

    /// Identity used to run each handler once per event.
    fn key(&self) -> usize {
        match self {
            Handler::RequestUpdate => 0,
            Handler::Custom(f) => Rc::as_ptr(f) as *const () as usize,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::RequestUpdate => f.write_str("RequestUpdate"),
            Handler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Watch {
    path: WatchPath,
    handler: Handler,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    item: ElementId,
    watch: usize,
    hop: bool,
}

/// Handlers to run for one event, and items whose paths must be re-resolved.
#[derive(Debug, Default)]
pub struct Matches {
    pub handlers: Vec<(ElementId, Handler)>,
    pub resubscribe: Vec<ElementId>,
}

/// Watch definitions per item plus the live subscription index.
///
/// Definitions outlive a subscription: an unlinked item keeps them so undo
/// can subscribe it again.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: HashMap<ElementId, Vec<Watch>>,
    index: HashMap<(ElementId, Name), Vec<Subscription>>,
    keys: HashMap<ElementId, Vec<(ElementId, Name)>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, item: ElementId, path: WatchPath, handler: Handler) {
        self.watches
            .entry(item)
            .or_default()
            .push(Watch { path, handler });
    }

    pub fn paths(&self, item: ElementId) -> Vec<WatchPath> {
        self.watches
            .get(&item)
            .map(|ws| ws.iter().map(|w| w.path.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, item: ElementId) -> bool {
        self.keys.contains_key(&item)
    }

    /// Resolve every path of `item` and (re)register its keys.
    pub fn subscribe(&mut self, item: ElementId, graph: &ElementGraph) {
        self.unsubscribe(item);
        let mut keys = Vec::new();
        if let Some(watches) = self.watches.get(&item) {
            for (watch, w) in watches.iter().enumerate() {
                for (key, hop) in w.path.resolve(item, graph) {
                    self.index
                        .entry(key)
                        .or_default()
                        .push(Subscription { item, watch, hop });
                    keys.push(key);
                }
            }
        }
        self.keys.insert(item, keys);
    }

    pub fn unsubscribe(&mut self, item: ElementId) {
        let Some(keys) = self.keys.remove(&item) else {
            return;
        };
        for key in keys {
            if let Some(subs) = self.index.get_mut(&key) {
                subs.retain(|s| s.item != item);
                if subs.is_empty() {
                    self.index.remove(&key);
                }
            }
        }
    }

    /// Drop definitions of items `keep` rejects.
    pub fn retain(&mut self, keep: impl Fn(ElementId) -> bool) {
        let gone: Vec<ElementId> = self.watches.keys().copied().filter(|i| !keep(*i)).collect();
        for item in gone {
            self.unsubscribe(item);
            self.watches.remove(&item);
        }
    }

    pub fn subscribed_items(&self) -> Vec<ElementId> {
        self.keys.keys().copied().collect()
    }

    /// Handlers touched by `event`, each `(item, handler)` pair once.
    pub fn matches(&self, event: &ModelEvent) -> Matches {
        let mut matches = Matches::default();
        let Some(name) = event.property() else {
            return matches;
        };
        let Some(subs) = self.index.get(&(event.element(), name)) else {
            return matches;
        };

        let mut seen: SmallVec<[(ElementId, usize); 4]> = SmallVec::new();
        for sub in subs {
            if sub.hop && !matches.resubscribe.contains(&sub.item) {
                matches.resubscribe.push(sub.item);
            }
            let Some(watch) = self.watches.get(&sub.item).and_then(|ws| ws.get(sub.watch)) else {
                continue;
            };
            let key = (sub.item, watch.handler.key());
            if !seen.contains(&key) {
                seen.push(key);
                matches.handlers.push((sub.item, watch.handler.clone()));
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use umbra_core::{AssociationDef, ElementType, Schema};

    #[test]
    fn paths_parse_and_display() {
        let path: WatchPath = "subject[NamedElement].name".parse().unwrap();
        assert_eq!(path, WatchPath::subject().of_type("NamedElement").then("name"));
        assert_eq!(path.to_string(), "subject[NamedElement].name");

        assert!("subject..name".parse::<WatchPath>().is_err());
        assert!("subject[Open".parse::<WatchPath>().is_err());
        assert!("".parse::<WatchPath>().is_err());
    }

    fn graph() -> (ElementGraph, ElementId, ElementId, ElementId) {
        let mut schema = Schema::new();
        schema.define(AssociationDef::one("type"));
        let mut g = ElementGraph::new(schema);
        let diagram = g.create(ElementType::new("Diagram"));
        let class = g.create(ElementType::new("Class").extends("NamedElement"));
        let ty = g.create(ElementType::new("Class").extends("NamedElement"));
        let item = g.insert_presentation(ElementType::new("ElementItem"), diagram);
        g.set_one(item, Name::new(SUBJECT), Some(class)).unwrap();
        g.set_one(class, Name::new("type"), Some(ty)).unwrap();
        g.drain_events();
        (g, item, class, ty)
    }

    #[test]
    fn aliased_paths_fire_once_per_event() {
        let (g, item, _class, ty) = graph();
        let mut registry = WatchRegistry::new();
        let handler = Handler::custom(|_, _, _| Ok(()));
        registry.watch(item, "subject.type.name".parse().unwrap(), handler.clone());
        registry.watch(
            item,
            "subject[NamedElement].type[Class].name".parse().unwrap(),
            handler,
        );
        registry.watch(item, WatchPath::subject(), Handler::RequestUpdate);
        registry.subscribe(item, &g);

        let rename = ModelEvent::AttributeUpdated {
            element: ty,
            name: Name::new("name"),
            old: None,
            new: Some("T".into()),
        };
        let matches = registry.matches(&rename);
        assert_eq!(matches.handlers.len(), 1);
        assert!(matches.resubscribe.is_empty());
    }

    #[test]
    fn type_filter_stops_the_walk() {
        let (g, item, _class, ty) = graph();
        let mut registry = WatchRegistry::new();
        registry.watch(
            item,
            "subject[JoinNode].type.name".parse().unwrap(),
            Handler::RequestUpdate,
        );
        registry.subscribe(item, &g);

        let rename = ModelEvent::AttributeUpdated {
            element: ty,
            name: Name::new("name"),
            old: None,
            new: Some("T".into()),
        };
        assert!(registry.matches(&rename).handlers.is_empty());
    }

    #[test]
    fn hop_change_requests_resubscription() {
        let (g, item, class, _ty) = graph();
        let mut registry = WatchRegistry::new();
        registry.watch(item, "subject.type.name".parse().unwrap(), Handler::RequestUpdate);
        registry.subscribe(item, &g);
        assert!(registry.is_subscribed(item));

        let retarget = ModelEvent::AssociationSet {
            element: class,
            name: Name::new("type"),
            old: None,
            new: None,
        };
        assert_eq!(registry.matches(&retarget).resubscribe, vec![item]);

        registry.unsubscribe(item);
        assert!(registry.matches(&retarget).handlers.is_empty());
        assert_eq!(registry.paths(item).len(), 1);
    }
}
