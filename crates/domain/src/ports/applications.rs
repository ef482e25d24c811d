use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoxFuture;
use crate::applications::{AidApplication, Assignment, HistoryEntry};
use crate::workflow::WorkflowStage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("application '{0}' not found")]
    NotFound(String),
    #[error("stage changed concurrently: expected '{expected}', found '{actual}'")]
    StaleStage {
        expected: WorkflowStage,
        actual: WorkflowStage,
    },
    #[error("application '{0}' already exists")]
    Conflict(String),
    /// The write did not finish in time. It may or may not have been applied.
    #[error("store write timed out; outcome unknown")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// One conditional stage change. The store applies it only while the
/// application is still in `expected_stage`, and writes the new stage, the
/// provided assignment fields and the appended history entry together.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransitionWrite {
    pub expected_stage: WorkflowStage,
    pub stage: WorkflowStage,
    pub entry: HistoryEntry,
    #[serde(default)]
    pub assignment: Assignment,
}

pub trait ApplicationStore: Send + Sync {
    fn create(
        &self,
        application: &AidApplication,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>>;

    fn get(&self, application_id: &str)
    -> BoxFuture<'_, Result<Option<AidApplication>, StoreError>>;

    fn list(&self) -> BoxFuture<'_, Result<Vec<AidApplication>, StoreError>>;

    fn apply_transition(
        &self,
        application_id: &str,
        write: &TransitionWrite,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>>;
}
