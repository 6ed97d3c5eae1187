//! Dispatch orchestrator error types.

use welfare_core::{DispatchId, StoreError};

use crate::model::DispatchStatus;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Required input missing; nothing was created.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The dispatch record could not be written or read.
    #[error("Dispatch persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Another caller changed the status first.
    #[error("Dispatch {id} was already moved to {current}")]
    Conflict { id: DispatchId, current: DispatchStatus },

    #[error("Dispatch {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DispatchId,
        from: DispatchStatus,
        to: DispatchStatus,
    },

    #[error("Dispatch {0} is not dispatch-eligible")]
    NotEligible(DispatchId),

    #[error("Dispatch {0} not found")]
    NotFound(DispatchId),
}
