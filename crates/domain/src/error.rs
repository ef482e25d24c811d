use thiserror::Error;

use crate::ports::applications::StoreError;
use crate::workflow::{WorkflowAction, WorkflowStage};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Failure of a workflow operation.
///
/// `InvalidTransition` and `Forbidden` are rule violations raised before any
/// write. `Store` carries the collaborator's error unchanged.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("action '{action}' is not available from stage '{stage}'")]
    InvalidTransition {
        stage: WorkflowStage,
        action: WorkflowAction,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) => WorkflowError::Validation(message),
        }
    }
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::Forbidden(_) => "FORBIDDEN",
            WorkflowError::Validation(_) => "VALIDATION",
            WorkflowError::Store(_) => "STORE_ERROR",
        }
    }
}
