pub mod error;
pub mod event;
pub mod geometry;
pub mod graph;
pub mod id;
pub mod model;

pub use error::ModelError;
pub use event::ModelEvent;
pub use geometry::{Matrix, Point};
pub use graph::ElementGraph;
pub use id::{ElementId, IdGenerator, Name};
pub use model::*;
