use crate::constraint::ConstraintId;
use crate::handle::HandleId;
use thiserror::Error;
use umbra_core::ElementId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    /// `connect` was asked to attach to an item that exposes no port.
    #[error("{item} has no port available for connection")]
    NoPortAvailable { item: ElementId },

    /// The variable, constraint or connection is not (or no longer) part of the canvas.
    #[error("invalid canvas state: {0}")]
    InvalidState(String),

    /// Satisfying the constraint would require moving a required variable.
    #[error("constraint {constraint:?} cannot be satisfied")]
    Infeasible { constraint: ConstraintId },

    #[error("solver did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("unknown handle {0:?}")]
    UnknownHandle(HandleId),
}
