//! The connection table: which line handle is glued to which item port.

use crate::constraint::ConstraintId;
use crate::handle::HandleId;
use umbra_core::ElementId;

/// Handle `handle` of `item` is attached to port `port` of `connected`,
/// held there by `constraint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub item: ElementId,
    pub handle: HandleId,
    pub connected: ElementId,
    /// Index into the connected item's port list.
    pub port: usize,
    pub constraint: ConstraintId,
}

/// At most one connection per handle, kept in connection order.
#[derive(Debug, Default, Clone)]
pub struct Connections {
    entries: Vec<Connection>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Returns `false` if the handle is already connected.
    pub fn insert(&mut self, connection: Connection) -> bool {
        if self.get(connection.handle).is_some() {
            return false;
        }
        self.entries.push(connection);
        true
    }

    pub fn remove(&mut self, handle: HandleId) -> Option<Connection> {
        let pos = self.entries.iter().position(|c| c.handle == handle)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, handle: HandleId) -> Option<&Connection> {
        self.entries.iter().find(|c| c.handle == handle)
    }

    /// Connections whose target is `item`.
    pub fn connections_to(&self, item: ElementId) -> impl Iterator<Item = &Connection> {
        self.entries.iter().filter(move |c| c.connected == item)
    }

    /// Connections made by `item`'s own handles.
    pub fn connections_of(&self, item: ElementId) -> impl Iterator<Item = &Connection> {
        self.entries.iter().filter(move |c| c.item == item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
