use std::time::Duration;

use dernek_domain::ports::BoxFuture;
use dernek_domain::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyStore, PutOutcome,
};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const DEFAULT_PREFIX: &str = "dernek:idem";
const CLAIM_ATTEMPTS: usize = 2;

/// Idempotency records in Redis. Claims use `SET NX PX`, so two replicas
/// racing on one request id cannot both start it.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str) -> Result<Self, IdempotencyError> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, IdempotencyError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        let prefix = prefix.into();
        tracing::info!(prefix = %prefix, "redis idempotency store connected");
        Ok(Self { manager, prefix })
    }

    fn cache_key(&self, key: &IdempotencyKey) -> String {
        key.cache_key(&self.prefix)
    }
}

/// `None` for a zero ttl, which stores the record without expiry.
fn expiry_ms(ttl: Duration) -> Option<u64> {
    (!ttl.is_zero()).then(|| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

fn encode(record: &IdempotencyRecord) -> Result<String, IdempotencyError> {
    serde_json::to_string(record).map_err(|err| IdempotencyError::Serialization(err.to_string()))
}

fn decode(payload: &str) -> Result<IdempotencyRecord, IdempotencyError> {
    serde_json::from_str(payload).map_err(|err| IdempotencyError::Serialization(err.to_string()))
}

fn unavailable(err: redis::RedisError) -> IdempotencyError {
    IdempotencyError::Unavailable(err.to_string())
}

fn store_error(err: redis::RedisError) -> IdempotencyError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        return unavailable(err);
    }
    IdempotencyError::Store(err.to_string())
}

impl IdempotencyStore for RedisIdempotencyStore {
    fn get(
        &self,
        key: &IdempotencyKey,
    ) -> BoxFuture<'_, Result<Option<IdempotencyRecord>, IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let value: Option<String> = conn.get(cache_key).await.map_err(store_error)?;
            value.as_deref().map(decode).transpose()
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
            let payload = encode(&record)?;
            let mut claim = redis::cmd("SET");
            claim.arg(&cache_key).arg(&payload).arg("NX");
            if let Some(ms) = expiry_ms(ttl) {
                claim.arg("PX").arg(ms);
            }
            for _ in 0..CLAIM_ATTEMPTS {
                let mut conn = self.manager.clone();
                let claimed: Option<String> = claim
                    .query_async(&mut conn)
                    .await
                    .map_err(store_error)?;
                if claimed.is_some() {
                    return Ok(PutOutcome::Stored);
                }

                // The holder may expire between SET and GET; claim again.
                let existing: Option<String> = conn.get(&cache_key).await.map_err(store_error)?;
                if let Some(existing) = existing {
                    return Ok(PutOutcome::Existing(decode(&existing)?));
                }
            }

            Err(IdempotencyError::Store(format!(
                "failed to claim idempotency key {cache_key}"
            )))
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
            let payload = encode(&record)?;
            let mut conn = self.manager.clone();
            let written: redis::RedisResult<()> = match expiry_ms(ttl) {
                Some(ms) => conn.pset_ex(&cache_key, payload, ms).await,
                None => conn.set(&cache_key, payload).await,
            };
            written.map_err(store_error)?;
            Ok(())
        })
    }

    fn remove(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = self.cache_key(key);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn.del(&cache_key).await.map_err(store_error)?;
            Ok(())
        })
    }
}
