//! Element graph errors.

use crate::id::{ElementId, Name};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The element was never created or has been unlinked.
    #[error("{id} is not part of the model: {reason}")]
    InvalidState { id: ElementId, reason: &'static str },

    /// A cardinality rule was broken.
    #[error("association `{association}` of {id}: {reason}")]
    ConstraintViolation {
        id: ElementId,
        association: Name,
        reason: &'static str,
    },

    /// The association was never registered in the schema.
    #[error("unknown association `{0}`")]
    UnknownAssociation(Name),

    /// A reference could not be resolved to a live element.
    #[error("unknown element {0}")]
    UnknownElement(ElementId),

    /// An element with this id already exists.
    #[error("duplicate element id {0}")]
    DuplicateId(ElementId),
}

impl ModelError {
    pub(crate) fn unlinked(id: ElementId) -> Self {
        ModelError::InvalidState {
            id,
            reason: "element is unlinked",
        }
    }
}
