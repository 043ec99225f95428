//! The editing session.
//!
//! A [`Session`] owns the element graph, one [`Diagram`] per diagram
//! element, the watch registry, the transaction log and the undo stacks.
//! Every public mutator runs inside a transaction, joining the caller's
//! when one is open.
//!
//! Mutations push events to the graph and canvas outboxes. [`flush`]
//! drains them in batches: a batch is recorded into the open transaction
//! first, then dispatched to watchers and observers. Handlers may mutate
//! the session again; their events form the next batch.
//!
//! [`flush`]: Session::flush

use crate::change::{Change, ItemSnapshot};
use crate::config::SessionConfig;
use crate::copypaste::CopyBuffer;
use crate::diagram::Diagram;
use crate::error::EditorError;
use crate::item::{Item, ItemKind, Shape};
use crate::transaction::{Outcome, TransactionLog};
use crate::undo::UndoManager;
use crate::watcher::{Handler, WatchPath, WatchRegistry};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::rc::Rc;
use umbra_canvas::{CanvasError, CanvasEvent, Connection, Handle, HandleId, Port};
use umbra_core::geometry::{Affine, Matrix, Point, Vec2};
use umbra_core::model::SUBJECT;
use umbra_core::{
    AssociationDef, AttrValue, Element, ElementGraph, ElementId, ElementType, ModelEvent, Name,
    Owner, Schema,
};

/// Type name of diagram elements. Creating one creates its canvas.
pub const DIAGRAM_TYPE: &str = "Diagram";

/// Notifications delivered to session observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Model(ModelEvent),
    Canvas {
        diagram: ElementId,
        event: CanvasEvent,
    },
    DiagramItemCreated {
        diagram: ElementId,
        item: ElementId,
    },
    /// A presentation left its diagram. Distinct from element deletion.
    DiagramItemDeleted {
        diagram: ElementId,
        item: ElementId,
    },
    UpdateRequested {
        diagram: ElementId,
        item: ElementId,
    },
    TransactionBegin,
    TransactionCommit,
    TransactionRollback,
}

impl Event {
    fn change(&self) -> Option<Change> {
        match self {
            Event::Model(event) => Some(Change::Model(event.clone())),
            Event::Canvas { diagram, event } => Some(Change::Canvas {
                diagram: *diagram,
                event: event.clone(),
            }),
            _ => None,
        }
    }
}

pub type ObserverFn = Rc<dyn Fn(&mut Session, &Event) -> Result<(), EditorError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct Session {
    pub(crate) graph: ElementGraph,
    pub(crate) diagrams: HashMap<ElementId, Diagram>,
    /// Diagrams in creation order; every pass over them follows it.
    diagram_order: Vec<ElementId>,
    watches: WatchRegistry,
    log: TransactionLog,
    undo: UndoManager,
    observers: Vec<(ObserverId, ObserverFn)>,
    next_observer: u64,
    /// Set while undo, redo or rollback replays records.
    replaying: bool,
    pub(crate) clipboard: CopyBuffer,
    config: SessionConfig,
}

impl Session {
    pub fn new(schema: Schema, config: SessionConfig) -> Self {
        log::debug!("session started (undo depth {})", config.max_undo_depth);
        Self {
            graph: ElementGraph::new(schema),
            diagrams: HashMap::new(),
            diagram_order: Vec::new(),
            watches: WatchRegistry::new(),
            log: TransactionLog::new(),
            undo: UndoManager::new(config.max_undo_depth),
            observers: Vec::new(),
            next_observer: 0,
            replaying: false,
            clipboard: CopyBuffer::default(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn graph(&self) -> &ElementGraph {
        &self.graph
    }

    /// Register an association end. Schema changes are not undoable.
    pub fn define_association(&mut self, def: AssociationDef) {
        self.graph.schema_mut().define(def);
    }

    /// Tear the session down: roll back anything still open, drop
    /// subscriptions, observers and history.
    pub fn shutdown(&mut self) -> Result<(), EditorError> {
        while self.log.is_open() {
            self.rollback_transaction()?;
        }
        self.unsubscribe_all();
        self.observers.clear();
        self.undo.clear();
        self.clipboard = CopyBuffer::default();
        log::debug!("session shut down");
        Ok(())
    }

    // ─── Observers ───────────────────────────────────────────────────────

    pub fn subscribe(
        &mut self,
        observer: impl Fn(&mut Session, &Event) -> Result<(), EditorError> + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Rc::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(o, _)| *o != id);
        self.observers.len() != before
    }

    /// Deliver `event` to every observer. The first failure is returned once
    /// all of them ran.
    fn notify(&mut self, event: &Event) -> Result<(), EditorError> {
        let observers: Vec<ObserverFn> = self.observers.iter().map(|(_, f)| f.clone()).collect();
        let mut first = None;
        for observer in observers {
            if let Err(err) = observer(self, event) {
                log::warn!("observer failed on {event:?}: {err}");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    // ─── Event pump ──────────────────────────────────────────────────────

    /// Record and dispatch everything the graph and canvases emitted.
    pub(crate) fn flush(&mut self) -> Result<(), EditorError> {
        let mut first = None;
        loop {
            let mut batch: Vec<Event> = self
                .graph
                .drain_events()
                .into_iter()
                .map(Event::Model)
                .collect();
            for id in &self.diagram_order {
                let Some(diagram) = self.diagrams.get_mut(id) else {
                    continue;
                };
                batch.extend(
                    diagram
                        .canvas
                        .drain_events()
                        .into_iter()
                        .map(|event| Event::Canvas {
                            diagram: *id,
                            event,
                        }),
                );
            }
            if batch.is_empty() {
                break;
            }
            for event in &batch {
                if let Some(change) = event.change() {
                    self.record(change);
                }
            }
            for event in &batch {
                if let Err(err) = self.dispatch(event) {
                    first.get_or_insert(err);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn record(&mut self, change: Change) {
        if !self.replaying {
            self.log.record(change);
        }
    }

    fn dispatch(&mut self, event: &Event) -> Result<(), EditorError> {
        let mut first = None;
        match event {
            Event::Model(model) => {
                self.track_diagram(model);
                let matches = self.watches.matches(model);
                for item in matches.resubscribe {
                    if self.graph.contains(item) {
                        self.watches.subscribe(item, &self.graph);
                    }
                }
                for (item, handler) in matches.handlers {
                    let result = match handler {
                        Handler::RequestUpdate => self.schedule_update(item),
                        Handler::Custom(f) => f(self, item, model),
                    };
                    if let Err(err) = result {
                        log::warn!("watch handler of {item} failed: {err}");
                        first.get_or_insert(err);
                    }
                }
            }
            Event::Canvas {
                diagram,
                event: CanvasEvent::VariableChanged { var, .. },
            } => {
                let owner = self.diagrams.get(diagram).and_then(|d| d.owner_of(*var));
                if let Some(item) = owner
                    && let Err(err) = self.schedule_update(item)
                {
                    first.get_or_insert(err);
                }
            }
            _ => {}
        }
        if let Err(err) = self.notify(event) {
            first.get_or_insert(err);
        }
        first.map_or(Ok(()), Err)
    }

    fn track_diagram(&mut self, event: &ModelEvent) {
        let diagram_type = Name::new(DIAGRAM_TYPE);
        match event {
            ModelEvent::ElementCreated { element } if element.ty.is_a(diagram_type) => {
                let id = element.id;
                let config = self.config.solver;
                if !self.diagrams.contains_key(&id) {
                    self.diagrams.insert(id, Diagram::new(id, config));
                    self.diagram_order.push(id);
                }
                log::debug!("diagram {id} opened");
            }
            ModelEvent::ElementDeleted { element } if element.ty.is_a(diagram_type) => {
                self.diagrams.remove(&element.id);
                self.diagram_order.retain(|d| *d != element.id);
                log::debug!("diagram {} closed", element.id);
            }
            _ => {}
        }
    }

    // ─── Transactions ────────────────────────────────────────────────────

    /// Run `f` inside a transaction, joining an open one.
    ///
    /// An error from `f` rolls back immediately and is returned. If `f`
    /// succeeds but a nested scope failed, the whole group is rolled back
    /// and [`EditorError::RolledBack`] is returned.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        if self.replaying {
            let value = f(self)?;
            self.flush()?;
            return Ok(value);
        }
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => self.commit_transaction().map(|()| value),
            Err(err) => {
                if let Err(rollback) = self.rollback_transaction() {
                    log::error!("rollback after `{err}` failed: {rollback}");
                }
                Err(err)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.log.is_open()
    }

    pub fn begin_transaction(&mut self) -> Result<(), EditorError> {
        let outermost = !self.log.is_open();
        self.log.begin();
        if outermost {
            log::trace!("transaction begin");
            if let Err(err) = self.notify(&Event::TransactionBegin) {
                self.rollback_transaction()?;
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<(), EditorError> {
        if !self.log.is_open() {
            return Err(EditorError::NoTransaction);
        }
        if let Err(err) = self.flush() {
            self.rollback_transaction()?;
            return Err(err);
        }
        match self.log.end(true) {
            None => Err(EditorError::NoTransaction),
            Some(Outcome::Nested) => Ok(()),
            Some(Outcome::Commit(records)) => {
                log::debug!("transaction committed ({} records)", records.len());
                self.undo.push(records);
                self.notify(&Event::TransactionCommit)
            }
            Some(Outcome::Rollback(records)) | Some(Outcome::Poisoned(records)) => {
                log::debug!("transaction rolled back after a nested failure");
                self.revert(&records)?;
                self.notify(&Event::TransactionRollback)?;
                Err(EditorError::RolledBack)
            }
        }
    }

    /// Abort the innermost scope. Everything the transaction recorded so far
    /// is undone right away, whatever the depth.
    pub fn rollback_transaction(&mut self) -> Result<(), EditorError> {
        if !self.log.is_open() {
            return Err(EditorError::NoTransaction);
        }
        if let Err(err) = self.flush() {
            log::warn!("handler failed while rolling back: {err}");
        }
        let outermost = self.log.depth() == 1;
        match self.log.end(false) {
            None => Err(EditorError::NoTransaction),
            Some(Outcome::Rollback(records)) => {
                log::debug!("transaction rolled back ({} records)", records.len());
                self.revert(&records)?;
                if outermost {
                    self.notify(&Event::TransactionRollback)?;
                }
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    fn revert(&mut self, records: &[Change]) -> Result<(), EditorError> {
        let inverses: Vec<Change> = records.iter().rev().map(Change::invert).collect();
        self.replay(&inverses)
    }

    /// Apply records without recording them. Watchers and observers run as
    /// for a live edit; every diagram is solved once at the end.
    fn replay(&mut self, changes: &[Change]) -> Result<(), EditorError> {
        let was_replaying = std::mem::replace(&mut self.replaying, true);
        let mut first = None;
        for change in changes {
            if let Err(err) = self.apply_change(change) {
                log::error!("replay stopped at {change:?}: {err}");
                first.get_or_insert(err);
                break;
            }
            if let Err(err) = self.flush() {
                first.get_or_insert(err);
            }
        }
        if let Err(err) = self.solve_all() {
            first.get_or_insert(err);
        }
        self.replaying = was_replaying;
        first.map_or(Ok(()), Err)
    }

    fn apply_change(&mut self, change: &Change) -> Result<(), EditorError> {
        match change {
            Change::Model(event) => self.graph.replay(event)?,
            Change::Canvas { diagram, event } => self.diagram_mut(*diagram)?.canvas.apply(event)?,
            Change::ItemCreated(snapshot) => self.restore_item(snapshot)?,
            Change::ItemDeleted(snapshot) => self.drop_item(snapshot)?,
            Change::ItemMatrix { item, new, .. } => self.item_mut(*item)?.matrix = *new,
            Change::ItemCombined { item, new, .. } => {
                self.item_mut(*item)?.shape.set_combined(new.clone());
                self.schedule_update(*item)?;
            }
        }
        Ok(())
    }

    // ─── Undo / redo ─────────────────────────────────────────────────────

    /// Undo the most recent transaction. `Ok(false)` when there is none.
    pub fn undo_transaction(&mut self) -> Result<bool, EditorError> {
        if self.log.is_open() {
            return Err(EditorError::TransactionOpen);
        }
        let Some(records) = self.undo.pop_undo() else {
            return Ok(false);
        };
        log::debug!("undo ({} records)", records.len());
        let result = self.revert(&records);
        self.undo.push_redo(records);
        result.map(|()| true)
    }

    /// Redo the most recently undone transaction. `Ok(false)` when there is none.
    pub fn redo_transaction(&mut self) -> Result<bool, EditorError> {
        if self.log.is_open() {
            return Err(EditorError::TransactionOpen);
        }
        let Some(records) = self.undo.pop_redo() else {
            return Ok(false);
        };
        log::debug!("redo ({} records)", records.len());
        let result = self.replay(&records);
        self.undo.push_undo(records);
        result.map(|()| true)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Forget all history. Watch definitions of items that only history
    /// could bring back are dropped with it.
    pub fn clear_undo_stack(&mut self) {
        self.undo.clear();
        let graph = &self.graph;
        self.watches.retain(|item| graph.contains(item));
    }

    // ─── Elements ────────────────────────────────────────────────────────

    pub fn create(&mut self, ty: ElementType) -> Result<ElementId, EditorError> {
        self.transaction(|s| {
            let id = s.graph.create(ty);
            s.flush()?;
            log::debug!("created {id}");
            Ok(id)
        })
    }

    pub fn create_diagram(&mut self) -> Result<ElementId, EditorError> {
        self.create(ElementType::new(DIAGRAM_TYPE))
    }

    pub fn set_attribute(
        &mut self,
        id: ElementId,
        name: &str,
        value: Option<AttrValue>,
    ) -> Result<(), EditorError> {
        self.transaction(|s| {
            s.graph.set_attribute(id, Name::new(name), value)?;
            s.flush()
        })
    }

    pub fn add(&mut self, id: ElementId, name: &str, value: ElementId) -> Result<(), EditorError> {
        self.transaction(|s| {
            s.graph.add(id, Name::new(name), value)?;
            s.flush()
        })
    }

    pub fn remove(&mut self, id: ElementId, name: &str, value: ElementId) -> Result<(), EditorError> {
        self.transaction(|s| {
            s.graph.remove(id, Name::new(name), value)?;
            s.flush()
        })
    }

    pub fn set_one(
        &mut self,
        id: ElementId,
        name: &str,
        value: Option<ElementId>,
    ) -> Result<(), EditorError> {
        self.transaction(|s| {
            s.graph.set_one(id, Name::new(name), value)?;
            s.flush()
        })
    }

    /// Remove an element, its composite members and its presentations.
    /// Unlinking a diagram removes its items first; unlinking an item
    /// leaves its subject alone.
    pub fn unlink(&mut self, id: ElementId) -> Result<(), EditorError> {
        self.transaction(|s| s.unlink_inner(id))
    }

    fn unlink_inner(&mut self, id: ElementId) -> Result<(), EditorError> {
        if let Some(diagram) = self.diagrams.get(&id) {
            let items: Vec<ElementId> = diagram.items().collect();
            for item in items {
                if self.graph.contains(item) {
                    self.unlink_item(item)?;
                }
            }
        }
        if self.graph.element(id)?.is_presentation() {
            return self.unlink_item(id);
        }

        let members = self.graph.composite_members(id);
        self.graph.detach(id)?;
        self.flush()?;
        for member in members {
            if self.graph.contains(member) {
                self.unlink_inner(member)?;
            }
        }
        self.graph.delete(id)?;
        self.flush()?;
        log::debug!("unlinked {id}");
        Ok(())
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.graph.contains(id)
    }

    pub fn element(&self, id: ElementId) -> Result<&Element, EditorError> {
        Ok(self.graph.element(id)?)
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&AttrValue> {
        self.graph.attribute(id, Name::new(name))
    }

    pub fn value(&self, id: ElementId, name: &str) -> Option<ElementId> {
        self.graph.value(id, Name::new(name))
    }

    pub fn values(&self, id: ElementId, name: &str) -> &[ElementId] {
        self.graph.values(id, Name::new(name))
    }

    pub fn lselect(&self) -> Vec<ElementId> {
        self.graph.lselect()
    }

    pub fn lselect_type(&self, ty: &str) -> Vec<ElementId> {
        self.graph.lselect_type(Name::new(ty))
    }

    // ─── Diagrams & items ────────────────────────────────────────────────

    pub fn diagram(&self, id: ElementId) -> Result<&Diagram, EditorError> {
        self.diagrams.get(&id).ok_or(EditorError::NotADiagram(id))
    }

    fn diagram_mut(&mut self, id: ElementId) -> Result<&mut Diagram, EditorError> {
        self.diagrams.get_mut(&id).ok_or(EditorError::NotADiagram(id))
    }

    /// The diagram an item is placed on.
    pub(crate) fn diagram_of(&self, item: ElementId) -> Result<&Diagram, EditorError> {
        match self.graph.element(item)?.owner {
            Owner::Diagram(diagram) => self.diagram(diagram),
            Owner::Registry => Err(EditorError::InvalidItem {
                item,
                reason: "not a presentation",
            }),
        }
    }

    /// Like [`diagram_of`](Self::diagram_of), `None` for anything that is not
    /// a live item.
    fn live_item_diagram(&self, item: ElementId) -> Option<ElementId> {
        match self.graph.get(item)?.owner {
            Owner::Diagram(diagram) => self
                .diagrams
                .get(&diagram)
                .filter(|d| d.contains(item))
                .map(|d| d.id),
            Owner::Registry => None,
        }
    }

    pub fn item(&self, id: ElementId) -> Result<&Item, EditorError> {
        self.diagram_of(id)?.item(id)
    }

    fn item_mut(&mut self, id: ElementId) -> Result<&mut Item, EditorError> {
        let diagram = self.diagram_of(id)?.id;
        self.diagram_mut(diagram)?.item_mut(id)
    }

    pub fn items(&self, diagram: ElementId) -> Result<Vec<ElementId>, EditorError> {
        Ok(self.diagram(diagram)?.items().collect())
    }

    pub fn subject(&self, item: ElementId) -> Option<ElementId> {
        self.graph.value(item, Name::new(SUBJECT))
    }

    pub fn create_item(
        &mut self,
        diagram: ElementId,
        kind: ItemKind,
        subject: Option<ElementId>,
    ) -> Result<ElementId, EditorError> {
        self.create_item_at(diagram, kind, subject, Point::ORIGIN)
    }

    /// Place a new item with its origin at `at`, bound to `subject`.
    pub fn create_item_at(
        &mut self,
        diagram: ElementId,
        kind: ItemKind,
        subject: Option<ElementId>,
        at: Point,
    ) -> Result<ElementId, EditorError> {
        self.transaction(|s| {
            let item = s.place_item(
                diagram,
                kind,
                Affine::translate(at.to_vec2()),
                None,
                None,
                None,
            )?;
            if subject.is_some() {
                s.set_subject(item, subject)?;
            }
            s.solve_diagram(diagram)?;
            log::debug!("created {item} on {diagram}");
            Ok(item)
        })
    }

    /// Create the presentation node and the canvas side of an item, record
    /// it, then install its constraints and default watches.
    pub(crate) fn place_item(
        &mut self,
        diagram: ElementId,
        kind: ItemKind,
        matrix: Matrix,
        points: Option<&[Point]>,
        combined: Option<String>,
        id: Option<ElementId>,
    ) -> Result<ElementId, EditorError> {
        if !self.diagrams.contains_key(&diagram) {
            return Err(EditorError::NotADiagram(diagram));
        }
        self.flush()?;
        let id = match id {
            Some(id) => {
                let node = Element::new(id, kind.element_type(), Owner::Diagram(diagram));
                self.graph.insert_element(node)?;
                id
            }
            None => self.graph.insert_presentation(kind.element_type(), diagram),
        };

        let defaults = self.config.items;
        let canvas = &mut self.diagram_mut(diagram)?.canvas;
        let mut item = match Item::setup(
            id,
            diagram,
            Shape::new(kind, &defaults),
            matrix,
            points,
            &defaults,
            canvas,
        ) {
            Ok(item) => item,
            Err(err) => {
                self.graph.delete(id)?;
                return Err(err);
            }
        };
        item.shape.set_combined(combined);
        let constraints = item.constraints();
        let paths = item.shape.watch_paths();
        self.diagram_mut(diagram)?.insert_item(item);

        let snapshot = self.item_snapshot(id)?;
        self.record(Change::ItemCreated(Box::new(snapshot)));
        self.notify(&Event::DiagramItemCreated { diagram, item: id })?;

        let canvas = &mut self.diagram_mut(diagram)?.canvas;
        for constraint in constraints {
            canvas.add_constraint(Some(id), constraint)?;
        }
        self.flush()?;
        for path in paths {
            self.watches.watch(id, path, Handler::RequestUpdate);
        }
        self.watches.subscribe(id, &self.graph);
        Ok(id)
    }

    fn item_snapshot(&self, id: ElementId) -> Result<ItemSnapshot, EditorError> {
        let diagram = self.diagram_of(id)?;
        let item = diagram.item(id)?;
        Ok(ItemSnapshot {
            node: self.graph.element(id)?.clone(),
            item: item.clone(),
            positions: item.positions(&diagram.canvas)?,
        })
    }

    /// Bind an item to its subject (`None` unbinds it).
    pub fn set_subject(
        &mut self,
        item: ElementId,
        subject: Option<ElementId>,
    ) -> Result<(), EditorError> {
        self.transaction(|s| {
            s.diagram_of(item)?;
            s.graph.set_one(item, Name::new(SUBJECT), subject)?;
            s.flush()
        })
    }

    /// Remove an item: its watches, connections (its own and those made to
    /// it), constraints and links, then the item itself.
    fn unlink_item(&mut self, id: ElementId) -> Result<(), EditorError> {
        let diagram = self.diagram_of(id)?.id;
        self.watches.unsubscribe(id);

        let d = self.diagram_mut(diagram)?;
        let own: SmallVec<[HandleId; 4]> = d.item(id)?.handles().iter().map(|h| h.id).collect();
        for handle in own {
            d.canvas.disconnect(handle)?;
        }
        let incoming: Vec<HandleId> = d
            .canvas
            .connections()
            .connections_to(id)
            .map(|c| c.handle)
            .collect();
        for handle in incoming {
            d.canvas.disconnect(handle)?;
        }
        d.canvas.remove_owned(id)?;
        self.flush()?;

        self.graph.detach(id)?;
        self.flush()?;

        let snapshot = self.item_snapshot(id)?;
        self.record(Change::ItemDeleted(Box::new(snapshot.clone())));
        self.drop_item(&snapshot)?;
        self.solve_diagram(diagram)?;
        log::debug!("unlinked item {id} from {diagram}");
        Ok(())
    }

    fn drop_item(&mut self, snapshot: &ItemSnapshot) -> Result<(), EditorError> {
        let (id, diagram) = (snapshot.item.id, snapshot.item.diagram);
        self.watches.unsubscribe(id);
        let d = self.diagram_mut(diagram)?;
        if let Some(item) = d.remove_item(id) {
            for handle in item.handles() {
                d.canvas.remove_handle(handle.id)?;
            }
        }
        if self.graph.contains(id) {
            self.graph.delete(id)?;
        }
        self.flush()?;
        self.notify(&Event::DiagramItemDeleted { diagram, item: id })
    }

    fn restore_item(&mut self, snapshot: &ItemSnapshot) -> Result<(), EditorError> {
        let (id, diagram) = (snapshot.item.id, snapshot.item.diagram);
        self.graph.insert_element(snapshot.node.clone())?;
        let d = self.diagram_mut(diagram)?;
        for (handle, at) in snapshot.item.handles().iter().zip(&snapshot.positions) {
            d.canvas.restore_handle(*handle, *at)?;
        }
        d.insert_item(snapshot.item.clone());
        self.watches.subscribe(id, &self.graph);
        self.notify(&Event::DiagramItemCreated { diagram, item: id })
    }

    // ─── Geometry ────────────────────────────────────────────────────────

    pub fn handles(&self, item: ElementId) -> Result<&[Handle], EditorError> {
        Ok(self.item(item)?.handles())
    }

    pub fn ports(&self, item: ElementId) -> Result<&[Port], EditorError> {
        Ok(self.item(item)?.ports())
    }

    pub fn handle_position(&self, item: ElementId, handle: HandleId) -> Result<Point, EditorError> {
        let diagram = self.diagram_of(item)?;
        diagram
            .item(item)?
            .handle(handle)
            .ok_or(CanvasError::UnknownHandle(handle))?;
        Ok(diagram.canvas.position(handle)?)
    }

    pub fn constraint_count(&self, diagram: ElementId) -> Result<usize, EditorError> {
        Ok(self.diagram(diagram)?.canvas.constraint_count())
    }

    /// Drag one handle to `to` (canvas coordinates) and re-solve.
    pub fn move_handle(
        &mut self,
        item: ElementId,
        handle: HandleId,
        to: Point,
    ) -> Result<(), EditorError> {
        self.transaction(|s| {
            let diagram = s.diagram_of(item)?.id;
            let h = *s
                .item(item)?
                .handle(handle)
                .ok_or(CanvasError::UnknownHandle(handle))?;
            if !h.movable {
                return Err(EditorError::InvalidItem {
                    item,
                    reason: "handle is not movable",
                });
            }
            s.diagram_mut(diagram)?.canvas.set_position(handle, to)?;
            s.flush()?;
            s.solve_diagram(diagram)
        })
    }

    /// Translate an item: its matrix and every handle move by `delta`.
    pub fn move_item(&mut self, item: ElementId, delta: Vec2) -> Result<(), EditorError> {
        self.transaction(|s| {
            let diagram = s.diagram_of(item)?.id;
            s.flush()?;
            let d = s.diagram_mut(diagram)?;
            let it = d.item_mut(item)?;
            let old = it.matrix;
            let new = Affine::translate(delta) * old;
            it.matrix = new;
            let handles: SmallVec<[HandleId; 4]> = it.handles().iter().map(|h| h.id).collect();
            for handle in handles {
                let at = d.canvas.position(handle)?;
                d.canvas.set_position(handle, at + delta)?;
            }
            s.record(Change::ItemMatrix { item, old, new });
            s.flush()?;
            s.solve_diagram(diagram)
        })
    }

    /// Set the `combined` state of a box or fork item.
    pub fn set_combined(&mut self, item: ElementId, value: Option<&str>) -> Result<(), EditorError> {
        self.transaction(|s| {
            let new = value.map(str::to_string);
            let Some(old) = s.item_mut(item)?.shape.set_combined(new.clone()) else {
                return Err(EditorError::InvalidItem {
                    item,
                    reason: "item has no combined state",
                });
            };
            if old != new {
                s.record(Change::ItemCombined { item, old, new });
                s.schedule_update(item)?;
            }
            Ok(())
        })
    }

    /// Solve one diagram, recording the moves.
    pub(crate) fn solve_diagram(&mut self, diagram: ElementId) -> Result<(), EditorError> {
        let solved = self.diagram_mut(diagram)?.canvas.solve();
        if let Err(err) = &solved {
            log::warn!("solving {diagram} failed: {err}");
        }
        let flushed = self.flush();
        solved?;
        flushed
    }

    pub(crate) fn solve_all(&mut self) -> Result<(), EditorError> {
        for id in self.diagram_order.clone() {
            self.solve_diagram(id)?;
        }
        Ok(())
    }

    // ─── Connections ─────────────────────────────────────────────────────

    /// Glue `handle` of `item` to a port of `target`: the given port, or
    /// the first connectable one. A connected handle is disconnected first.
    pub fn connect(
        &mut self,
        item: ElementId,
        handle: HandleId,
        target: ElementId,
        port: Option<usize>,
    ) -> Result<Connection, EditorError> {
        self.transaction(|s| {
            let d = s.diagram_of(item)?;
            let diagram = d.id;
            if !d.contains(target) || item == target {
                return Err(EditorError::InvalidItem {
                    item: target,
                    reason: "not a connection target for this item",
                });
            }
            let h = *d
                .item(item)?
                .handle(handle)
                .ok_or(CanvasError::UnknownHandle(handle))?;
            if !h.connectable {
                return Err(EditorError::InvalidItem {
                    item,
                    reason: "handle is not connectable",
                });
            }
            let ports = d.item(target)?.ports();
            let index = match port {
                Some(i) => ports.get(i).filter(|p| p.connectable).map(|_| i),
                None => ports.iter().position(|p| p.connectable),
            }
            .ok_or(CanvasError::NoPortAvailable { item: target })?;
            let constraint = ports[index].constraint(h.pos);

            let canvas = &mut s.diagram_mut(diagram)?.canvas;
            canvas.disconnect(handle)?;
            let connection = canvas.connect(item, handle, target, index, constraint)?;
            s.flush()?;
            s.solve_diagram(diagram)?;
            Ok(connection)
        })
    }

    /// Drop the connection of `handle`, if any. The handle stays where it is.
    pub fn disconnect(&mut self, item: ElementId, handle: HandleId) -> Result<(), EditorError> {
        self.transaction(|s| {
            let diagram = s.diagram_of(item)?.id;
            s.item(item)?
                .handle(handle)
                .ok_or(CanvasError::UnknownHandle(handle))?;
            s.diagram_mut(diagram)?.canvas.disconnect(handle)?;
            s.flush()
        })
    }

    pub fn connection(&self, item: ElementId, handle: HandleId) -> Option<Connection> {
        self.diagram_of(item)
            .ok()
            .and_then(|d| d.canvas.connection(handle).copied())
    }

    /// The item `handle` is glued to.
    pub fn connected_item(&self, item: ElementId, handle: HandleId) -> Option<ElementId> {
        self.connection(item, handle).map(|c| c.connected)
    }

    // ─── Watches & updates ───────────────────────────────────────────────

    /// Add a watch to `item` and re-resolve its subscriptions.
    pub fn watch(
        &mut self,
        item: ElementId,
        path: WatchPath,
        handler: Handler,
    ) -> Result<(), EditorError> {
        self.diagram_of(item)?;
        self.watches.watch(item, path, handler);
        self.watches.subscribe(item, &self.graph);
        Ok(())
    }

    pub fn watch_paths(&self, item: ElementId) -> Vec<WatchPath> {
        self.watches.paths(item)
    }

    pub fn subscribe_all(&mut self) {
        let items: Vec<ElementId> = self
            .diagram_order
            .iter()
            .filter_map(|id| self.diagrams.get(id))
            .flat_map(|d| d.items().collect::<Vec<_>>())
            .collect();
        for item in items {
            self.watches.subscribe(item, &self.graph);
        }
    }

    pub fn unsubscribe_all(&mut self) {
        for item in self.watches.subscribed_items() {
            self.watches.unsubscribe(item);
        }
    }

    /// Schedule a visual update of `item`.
    pub fn request_update(&mut self, item: ElementId) -> Result<(), EditorError> {
        self.diagram_of(item)?;
        self.schedule_update(item)
    }

    /// Items that are gone are skipped silently.
    fn schedule_update(&mut self, item: ElementId) -> Result<(), EditorError> {
        let Some(diagram) = self.live_item_diagram(item) else {
            return Ok(());
        };
        if self.diagram_mut(diagram)?.request_update(item) {
            self.notify(&Event::UpdateRequested { diagram, item })?;
        }
        Ok(())
    }

    /// Items waiting for a redraw; the list is emptied.
    pub fn take_updates(&mut self, diagram: ElementId) -> Result<Vec<ElementId>, EditorError> {
        Ok(self.diagram_mut(diagram)?.take_updates())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Schema::new(), SessionConfig::default())
    }
}
