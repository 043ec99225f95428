use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a solver variable. Stable across undo: a removed variable that
/// is restored gets its old id back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How reluctant the solver is to change a variable. When a constraint is
/// violated, the weakest of its variables is the one that moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strength {
    Weak,
    Normal,
    Strong,
    /// Never moved by the solver.
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub value: f64,
    pub strength: Strength,
}

impl Variable {
    pub fn new(value: f64, strength: Strength) -> Self {
        Self { value, strength }
    }
}

/// A 2D position made of two solver variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub x: VarId,
    pub y: VarId,
}
