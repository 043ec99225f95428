use crate::constraint::Constraint;
use crate::variable::{Pos, Strength};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u32);

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// A point on an item, backed by two solver variables in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    pub id: HandleId,
    pub pos: Pos,
    pub strength: Strength,
    pub movable: bool,
    /// Line ends are connectable; box corners are not.
    pub connectable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortShape {
    Point(Pos),
    /// The segment between two handle positions.
    Line { start: Pos, end: Pos },
}

/// An attachment locus on an item's outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub name: &'static str,
    pub shape: PortShape,
    pub connectable: bool,
}

impl Port {
    pub fn line(name: &'static str, start: Pos, end: Pos) -> Self {
        Self {
            name,
            shape: PortShape::Line { start, end },
            connectable: true,
        }
    }

    pub fn point(name: &'static str, pos: Pos) -> Self {
        Self {
            name,
            shape: PortShape::Point(pos),
            connectable: true,
        }
    }

    /// The constraint that keeps `point` attached to this port.
    pub fn constraint(&self, point: Pos) -> Constraint {
        match self.shape {
            PortShape::Point(target) => Constraint::Coincident { target, point },
            PortShape::Line { start, end } => Constraint::Line { start, end, point },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VarId;

    #[test]
    fn port_kind_selects_constraint() {
        let pos = |n| Pos {
            x: VarId(n),
            y: VarId(n + 1),
        };
        let point = Port::point("center", pos(0)).constraint(pos(10));
        assert!(matches!(point, Constraint::Coincident { .. }));

        let line = Port::line("top", pos(0), pos(2)).constraint(pos(10));
        assert!(matches!(line, Constraint::Line { .. }));
    }
}
