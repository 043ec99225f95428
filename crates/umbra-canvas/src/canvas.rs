//! A canvas: the solver, the handles living on it, the connection table and
//! which item owns which constraint.
//!
//! Every topology or value change is pushed to an outbox of
//! [`CanvasEvent`]s. Each event can be inverted and fed back through
//! [`Canvas::apply`], which is how undo restores constraints and
//! connections exactly.

use crate::connections::{Connection, Connections};
use crate::constraint::{Constraint, ConstraintId};
use crate::error::CanvasError;
use crate::handle::{Handle, HandleId};
use crate::solver::{Solver, SolverConfig};
use crate::variable::{Strength, VarId, Variable};
use smallvec::SmallVec;
use std::collections::HashMap;
use umbra_core::ElementId;
use umbra_core::geometry::Point;

#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    VariableChanged {
        var: VarId,
        old: f64,
        new: f64,
    },
    ConstraintAdded {
        id: ConstraintId,
        /// The item the constraint belongs to; `None` for connection constraints.
        owner: Option<ElementId>,
        constraint: Constraint,
    },
    ConstraintRemoved {
        id: ConstraintId,
        owner: Option<ElementId>,
        constraint: Constraint,
    },
    Connected {
        connection: Connection,
    },
    Disconnected {
        connection: Connection,
    },
}

impl CanvasEvent {
    #[must_use]
    pub fn invert(&self) -> CanvasEvent {
        match self.clone() {
            CanvasEvent::VariableChanged { var, old, new } => CanvasEvent::VariableChanged {
                var,
                old: new,
                new: old,
            },
            CanvasEvent::ConstraintAdded {
                id,
                owner,
                constraint,
            } => CanvasEvent::ConstraintRemoved {
                id,
                owner,
                constraint,
            },
            CanvasEvent::ConstraintRemoved {
                id,
                owner,
                constraint,
            } => CanvasEvent::ConstraintAdded {
                id,
                owner,
                constraint,
            },
            CanvasEvent::Connected { connection } => CanvasEvent::Disconnected { connection },
            CanvasEvent::Disconnected { connection } => CanvasEvent::Connected { connection },
        }
    }
}

#[derive(Debug)]
pub struct Canvas {
    solver: Solver,
    handles: HashMap<HandleId, Handle>,
    next_handle: u32,
    connections: Connections,
    owned: HashMap<ElementId, SmallVec<[ConstraintId; 6]>>,
    owners: HashMap<ConstraintId, ElementId>,
    events: Vec<CanvasEvent>,
}

impl Canvas {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            solver: Solver::new(config),
            handles: HashMap::new(),
            next_handle: 0,
            connections: Connections::new(),
            owned: HashMap::new(),
            owners: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    // ─── Handles ─────────────────────────────────────────────────────────

    pub fn add_handle(
        &mut self,
        at: Point,
        strength: Strength,
        movable: bool,
        connectable: bool,
    ) -> Handle {
        let x = self.solver.add_variable(at.x, strength);
        let y = self.solver.add_variable(at.y, strength);
        let handle = Handle {
            id: HandleId(self.next_handle),
            pos: crate::variable::Pos { x, y },
            strength,
            movable,
            connectable,
        };
        self.next_handle += 1;
        self.handles.insert(handle.id, handle);
        handle
    }

    /// Bring back a removed handle with its old ids.
    pub fn restore_handle(&mut self, handle: Handle, at: Point) -> Result<(), CanvasError> {
        if self.handles.contains_key(&handle.id) {
            return Err(CanvasError::InvalidState(format!(
                "handle {:?} already exists",
                handle.id
            )));
        }
        self.solver
            .insert_variable(handle.pos.x, Variable::new(at.x, handle.strength))?;
        self.solver
            .insert_variable(handle.pos.y, Variable::new(at.y, handle.strength))?;
        self.next_handle = self.next_handle.max(handle.id.0 + 1);
        self.handles.insert(handle.id, handle);
        Ok(())
    }

    /// Remove a handle. Its connection and constraints must be gone already.
    pub fn remove_handle(&mut self, id: HandleId) -> Result<Handle, CanvasError> {
        let handle = *self.handle(id)?;
        if self.connections.get(id).is_some() {
            return Err(CanvasError::InvalidState(format!(
                "handle {id:?} is still connected"
            )));
        }
        self.solver.remove_variable(handle.pos.x)?;
        self.solver.remove_variable(handle.pos.y)?;
        self.handles.remove(&id);
        Ok(handle)
    }

    pub fn handle(&self, id: HandleId) -> Result<&Handle, CanvasError> {
        self.handles.get(&id).ok_or(CanvasError::UnknownHandle(id))
    }

    pub fn position(&self, id: HandleId) -> Result<Point, CanvasError> {
        let handle = self.handle(id)?;
        Ok(Point::new(
            self.solver.value(handle.pos.x)?,
            self.solver.value(handle.pos.y)?,
        ))
    }

    /// Move a handle. Dependent constraints are queued; call [`solve`](Self::solve).
    pub fn set_position(&mut self, id: HandleId, at: Point) -> Result<(), CanvasError> {
        let handle = *self.handle(id)?;
        self.solver.set_value(handle.pos.x, at.x)?;
        self.solver.set_value(handle.pos.y, at.y)?;
        self.collect_changes();
        Ok(())
    }

    // ─── Constraints ─────────────────────────────────────────────────────

    pub fn add_constraint(
        &mut self,
        owner: Option<ElementId>,
        constraint: Constraint,
    ) -> Result<ConstraintId, CanvasError> {
        let id = self.solver.add_constraint(constraint.clone())?;
        self.track_owner(id, owner);
        self.events.push(CanvasEvent::ConstraintAdded {
            id,
            owner,
            constraint,
        });
        Ok(id)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), CanvasError> {
        let constraint = self.solver.remove_constraint(id)?;
        let owner = self.owners.remove(&id);
        if let Some(owner) = owner
            && let Some(ids) = self.owned.get_mut(&owner)
        {
            ids.retain(|c| *c != id);
            if ids.is_empty() {
                self.owned.remove(&owner);
            }
        }
        self.events.push(CanvasEvent::ConstraintRemoved {
            id,
            owner,
            constraint,
        });
        Ok(())
    }

    /// Remove every constraint owned by `owner`.
    pub fn remove_owned(&mut self, owner: ElementId) -> Result<(), CanvasError> {
        let ids: SmallVec<[ConstraintId; 6]> =
            self.owned.get(&owner).cloned().unwrap_or_default();
        for id in ids {
            self.remove_constraint(id)?;
        }
        Ok(())
    }

    pub fn owned_constraints(&self, owner: ElementId) -> &[ConstraintId] {
        self.owned.get(&owner).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn track_owner(&mut self, id: ConstraintId, owner: Option<ElementId>) {
        if let Some(owner) = owner {
            self.owned.entry(owner).or_default().push(id);
            self.owners.insert(id, owner);
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.solver.constraint_count()
    }

    // ─── Connections ─────────────────────────────────────────────────────

    /// Record a connection and install the constraint that keeps the handle
    /// on the port. The handle must not be connected already.
    pub fn connect(
        &mut self,
        item: ElementId,
        handle: HandleId,
        connected: ElementId,
        port: usize,
        constraint: Constraint,
    ) -> Result<Connection, CanvasError> {
        self.handle(handle)?;
        if self.connections.get(handle).is_some() {
            return Err(CanvasError::InvalidState(format!(
                "handle {handle:?} is already connected"
            )));
        }
        let constraint = self.add_constraint(None, constraint)?;
        let connection = Connection {
            item,
            handle,
            connected,
            port,
            constraint,
        };
        self.connections.insert(connection);
        self.events.push(CanvasEvent::Connected { connection });
        log::debug!("{item} handle {handle:?} connected to {connected} port {port}");
        Ok(connection)
    }

    /// Drop the handle's connection and its constraint. No-op when unconnected.
    pub fn disconnect(&mut self, handle: HandleId) -> Result<Option<Connection>, CanvasError> {
        let Some(connection) = self.connections.remove(handle) else {
            return Ok(None);
        };
        self.events.push(CanvasEvent::Disconnected { connection });
        self.remove_constraint(connection.constraint)?;
        log::debug!(
            "{} handle {handle:?} disconnected from {}",
            connection.item,
            connection.connected
        );
        Ok(Some(connection))
    }

    pub fn connection(&self, handle: HandleId) -> Option<&Connection> {
        self.connections.get(handle)
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    // ─── Solving & replay ────────────────────────────────────────────────

    pub fn solve(&mut self) -> Result<(), CanvasError> {
        let result = self.solver.solve();
        self.collect_changes();
        result.map(|_| ())
    }

    /// Apply a recorded event, re-emitting it.
    pub fn apply(&mut self, event: &CanvasEvent) -> Result<(), CanvasError> {
        match event {
            CanvasEvent::VariableChanged { var, new, .. } => {
                self.solver.restore_value(*var, *new)?;
                self.collect_changes();
            }
            CanvasEvent::ConstraintAdded {
                id,
                owner,
                constraint,
            } => {
                self.solver.insert_constraint(*id, constraint.clone())?;
                self.track_owner(*id, *owner);
                self.events.push(event.clone());
            }
            CanvasEvent::ConstraintRemoved { id, .. } => self.remove_constraint(*id)?,
            CanvasEvent::Connected { connection } => {
                if !self.connections.insert(*connection) {
                    return Err(CanvasError::InvalidState(format!(
                        "handle {:?} is already connected",
                        connection.handle
                    )));
                }
                self.events.push(event.clone());
            }
            CanvasEvent::Disconnected { connection } => {
                self.connections.remove(connection.handle);
                self.events.push(event.clone());
            }
        }
        Ok(())
    }

    fn collect_changes(&mut self) {
        let mut merged: Vec<(VarId, f64, f64)> = Vec::new();
        for (var, old, new) in self.solver.drain_changes() {
            match merged.iter_mut().find(|(v, ..)| *v == var) {
                Some(entry) => entry.2 = new,
                None => merged.push((var, old, new)),
            }
        }
        self.events.extend(
            merged
                .into_iter()
                .filter(|(_, old, new)| old != new)
                .map(|(var, old, new)| CanvasEvent::VariableChanged { var, old, new }),
        );
    }

    pub fn drain_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Port;
    use pretty_assertions::assert_eq;

    fn line_with_target(canvas: &mut Canvas) -> (Handle, Port) {
        let top = canvas.add_handle(Point::new(0.0, 0.0), Strength::Strong, true, false);
        let bottom = canvas.add_handle(Point::new(0.0, 100.0), Strength::Strong, true, false);
        let end = canvas.add_handle(Point::new(30.0, 40.0), Strength::Normal, true, true);
        (end, Port::line("left", top.pos, bottom.pos))
    }

    #[test]
    fn connect_then_disconnect_restores_constraint_count() {
        let mut canvas = Canvas::default();
        let (end, port) = line_with_target(&mut canvas);
        let line = ElementId::intern("line_1");
        let target = ElementId::intern("box_1");

        let before = canvas.constraint_count();
        canvas
            .connect(line, end.id, target, 0, port.constraint(end.pos))
            .unwrap();
        canvas.solve().unwrap();
        assert_eq!(canvas.constraint_count(), before + 1);
        assert_eq!(canvas.position(end.id).unwrap(), Point::new(0.0, 40.0));

        canvas.disconnect(end.id).unwrap();
        assert_eq!(canvas.constraint_count(), before);
        assert_eq!(canvas.position(end.id).unwrap(), Point::new(0.0, 40.0));
        assert_eq!(canvas.disconnect(end.id).unwrap(), None);
    }

    #[test]
    fn inverted_events_restore_connection() {
        let mut canvas = Canvas::default();
        let (end, port) = line_with_target(&mut canvas);
        let line = ElementId::intern("line_2");
        let target = ElementId::intern("box_2");
        canvas
            .connect(line, end.id, target, 0, port.constraint(end.pos))
            .unwrap();
        canvas.solve().unwrap();
        canvas.drain_events();

        canvas.disconnect(end.id).unwrap();
        let events = canvas.drain_events();
        assert!(canvas.connection(end.id).is_none());

        for event in events.iter().rev() {
            canvas.apply(&event.invert()).unwrap();
        }
        let restored = canvas.connection(end.id).copied().unwrap();
        assert_eq!(restored.connected, target);
        assert_eq!(canvas.constraint_count(), 1);
    }

    #[test]
    fn owned_constraints_are_removed_together() {
        let mut canvas = Canvas::default();
        let a = canvas.add_handle(Point::new(0.0, 0.0), Strength::Normal, true, false);
        let b = canvas.add_handle(Point::new(5.0, 9.0), Strength::Normal, true, false);
        let owner = ElementId::intern("fork_1");
        canvas
            .add_constraint(Some(owner), Constraint::vertical(a.pos, b.pos))
            .unwrap();
        canvas
            .add_constraint(Some(owner), Constraint::above(a.pos, b.pos, 30.0))
            .unwrap();
        canvas.solve().unwrap();
        assert_eq!(canvas.owned_constraints(owner).len(), 2);
        let (pa, pb) = (canvas.position(a.id).unwrap(), canvas.position(b.id).unwrap());
        assert_eq!(pa.x, pb.x);
        assert!(pa.y + 30.0 <= pb.y + 1e-6);

        canvas.remove_owned(owner).unwrap();
        assert_eq!(canvas.constraint_count(), 0);
        assert!(canvas.remove_handle(a.id).is_ok());
    }

    #[test]
    fn unknown_handle_is_reported() {
        let mut canvas = Canvas::default();
        let err = canvas
            .set_position(HandleId(42), Point::new(1.0, 1.0))
            .unwrap_err();
        assert_eq!(err, CanvasError::UnknownHandle(HandleId(42)));
    }
}
