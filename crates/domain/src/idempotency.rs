use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::ports::BoxFuture;
use crate::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyResponse, IdempotencyStore,
    PutOutcome,
};

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub in_progress_ttl: Duration,
    pub completed_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            in_progress_ttl: Duration::from_secs(60),
            completed_ttl: Duration::from_secs(60 * 60 * 24),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BeginOutcome {
    Started,
    InProgress,
    Replay(IdempotencyResponse),
    /// The key was first used with a different request body.
    Mismatch,
}

/// Guards a request id so a retried transition replays the first answer
/// instead of executing twice.
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    config: IdempotencyConfig,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    /// Claims `key` for this attempt, or reports what an earlier attempt
    /// with the same key left behind. `fingerprint` must identify the
    /// request body; a reused key with another body is a `Mismatch`.
    pub async fn begin(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
    ) -> Result<BeginOutcome, IdempotencyError> {
        let claim = IdempotencyRecord::InProgress {
            fingerprint: fingerprint.to_string(),
        };
        let claimed = self
            .store
            .put_if_absent(key, &claim, self.config.in_progress_ttl)
            .await?;
        Ok(match claimed {
            PutOutcome::Stored => BeginOutcome::Started,
            PutOutcome::Existing(existing) if existing.fingerprint() != fingerprint => {
                BeginOutcome::Mismatch
            }
            PutOutcome::Existing(IdempotencyRecord::InProgress { .. }) => BeginOutcome::InProgress,
            PutOutcome::Existing(IdempotencyRecord::Completed { response, .. }) => {
                BeginOutcome::Replay(response)
            }
        })
    }

    pub async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
        response: IdempotencyResponse,
    ) -> Result<(), IdempotencyError> {
        let record = IdempotencyRecord::Completed {
            fingerprint: fingerprint.to_string(),
            response,
        };
        self.store
            .update(key, &record, self.config.completed_ttl)
            .await
    }

    /// Drops an in-progress claim whose outcome is unknown, so the caller
    /// may retry with the same request id.
    pub async fn release(&self, key: &IdempotencyKey) -> Result<(), IdempotencyError> {
        self.store.remove(key).await
    }
}

#[derive(Clone, Debug)]
pub struct InMemoryIdempotencyStore {
    prefix: String,
    inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    record: IdempotencyRecord,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(record: IdempotencyRecord, ttl: Duration) -> Self {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        Self { record, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl InMemoryIdempotencyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache_key(&self, key: &IdempotencyKey) -> String {
        key.cache_key(&self.prefix)
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn get(
        &self,
        key: &IdempotencyKey,
    ) -> BoxFuture<'_, Result<Option<IdempotencyRecord>, IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            let mut guard = self.inner.lock().await;
            match guard.get(&cache_key) {
                Some(entry) if entry.is_expired() => {
                    guard.remove(&cache_key);
                    Ok(None)
                }
                Some(entry) => Ok(Some(entry.record.clone())),
                None => Ok(None),
            }
        })
    }

    fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<PutOutcome, IdempotencyError>> {
        let cache_key = self.cache_key(key);
        let record = record.clone();
        Box::pin(async move {
            let mut guard = self.inner.lock().await;
            if let Some(entry) = guard.get(&cache_key) {
                if !entry.is_expired() {
                    return Ok(PutOutcome::Existing(entry.record.clone()));
                }
            }
            guard.insert(cache_key, MemoryEntry::new(record, ttl));
            Ok(PutOutcome::Stored)
        })
    }

    fn update(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = self.cache_key(key);
        let record = record.clone();
        Box::pin(async move {
            let mut guard = self.inner.lock().await;
            guard.insert(cache_key, MemoryEntry::new(record, ttl));
            Ok(())
        })
    }

    fn remove(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            self.inner.lock().await.remove(&cache_key);
            Ok(())
        })
    }
}
