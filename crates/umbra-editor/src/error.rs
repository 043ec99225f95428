use thiserror::Error;
use umbra_canvas::CanvasError;
use umbra_core::{ElementId, ModelError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    /// An inner scope failed; the enclosing transaction was rolled back
    /// instead of committed.
    #[error("transaction rolled back after a nested scope failed")]
    RolledBack,

    #[error("no transaction is open")]
    NoTransaction,

    /// Undo and redo are refused while a transaction is recording.
    #[error("a transaction is still open")]
    TransactionOpen,

    #[error("{0} is not a diagram")]
    NotADiagram(ElementId),

    #[error("{item}: {reason}")]
    InvalidItem {
        item: ElementId,
        reason: &'static str,
    },

    #[error("invalid watch path `{0}`")]
    InvalidPath(String),

    #[error("cannot load `{name}`: {reason}")]
    Load { name: String, reason: String },

    /// An observer or watch handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),
}
