use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoxFuture;

/// Identifies one attempted transition: the client's request id, scoped to
/// the application it targets and the user who sent it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub application_id: String,
    pub user_id: String,
    pub request_id: String,
}

impl IdempotencyKey {
    pub fn transition(
        application_id: impl Into<String>,
        user_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            user_id: user_id.into(),
            request_id: request_id.into(),
        }
    }

    /// `{prefix}:transition:{application_id}:{user_id}:{request_id}`
    pub fn cache_key(&self, prefix: &str) -> String {
        format!(
            "{prefix}:transition:{}:{}:{}",
            self.application_id, self.user_id, self.request_id
        )
    }
}

/// Status and JSON body of the first finished attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IdempotencyResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

/// `fingerprint` identifies the request body the key was first used with.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    InProgress {
        fingerprint: String,
    },
    Completed {
        fingerprint: String,
        response: IdempotencyResponse,
    },
}

impl IdempotencyRecord {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::InProgress { fingerprint } | Self::Completed { fingerprint, .. } => fingerprint,
        }
    }
}

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
    #[error("idempotency record could not be encoded: {0}")]
    Serialization(String),
    #[error("idempotency store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    Stored,
    Existing(IdempotencyRecord),
}

/// Records expire after their ttl; a zero ttl never expires.
pub trait IdempotencyStore: Send + Sync {
    fn get(
        &self,
        key: &IdempotencyKey,
    ) -> BoxFuture<'_, Result<Option<IdempotencyRecord>, IdempotencyError>>;

    /// Atomically claims `key` unless a live record already holds it.
    fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<PutOutcome, IdempotencyError>>;

    fn update(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>>;

    fn remove(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>>;
}
