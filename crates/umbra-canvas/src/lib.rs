pub mod canvas;
pub mod connections;
pub mod constraint;
pub mod error;
pub mod handle;
pub mod solver;
pub mod variable;

pub use canvas::{Canvas, CanvasEvent};
pub use connections::{Connection, Connections};
pub use constraint::{Constraint, ConstraintId};
pub use error::CanvasError;
pub use handle::{Handle, HandleId, Port, PortShape};
pub use solver::{Solver, SolverConfig};
pub use variable::{Pos, Strength, VarId, Variable};
