//! Read-through / write-through cache decorator over any inner
//! [`Repository`]. The cache is advisory: the inner repository remains
//! authoritative and a `NotFound` from it is never shadowed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::RepoError;
use crate::model::UrlRecord;
use crate::repository::Repository;

const CACHE_TTL_SECONDS: u64 = 3600;
const CACHE_KEY_PREFIX: &str = "url:";

fn cache_key(shortcode: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{shortcode}")
}

/// Serialize `record` and `SET EX` it under its cache key. Failures are
/// logged and swallowed; the cache is never the source of truth.
///
/// Shared by [`CacheRepository`] (populate on the spot) and
/// [`crate::unit_of_work::RepositoryFactory::execute_transaction`]
/// (populate only after the transaction that produced `record` has
/// committed).
pub(crate) async fn populate(redis: &Arc<Mutex<ConnectionManager>>, record: &UrlRecord) {
    let Ok(value) = serde_json::to_string(record) else {
        return;
    };
    let key = cache_key(&record.shortcode);
    let mut conn = redis.lock().await;
    if let Err(e) = conn
        .set_ex::<_, _, ()>(&key, value, CACHE_TTL_SECONDS)
        .await
    {
        tracing::warn!(shortcode = %record.shortcode, error = %e, "cache populate failed");
    }
}

pub struct CacheRepository {
    inner: Arc<dyn Repository>,
    redis: Arc<Mutex<ConnectionManager>>,
}

impl CacheRepository {
    pub fn new(inner: Arc<dyn Repository>, redis: Arc<Mutex<ConnectionManager>>) -> Self {
        Self { inner, redis }
    }
}

#[async_trait]
impl Repository for CacheRepository {
    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError> {
        let key = cache_key(shortcode);
        let cached: Option<String> = {
            let mut conn = self.redis.lock().await;
            conn.get(&key).await.unwrap_or(None)
        };

        if let Some(raw) = cached {
            // Deserialization errors are treated as a miss; the store
            // remains authoritative.
            if let Ok(record) = serde_json::from_str::<UrlRecord>(&raw) {
                return Ok(record);
            }
            tracing::warn!(shortcode, "cache value failed to deserialize, treating as miss");
        }

        let record = self.inner.find(shortcode).await?;
        populate(&self.redis, &record).await;
        Ok(record)
    }

    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError> {
        self.inner.save(record).await?;
        populate(&self.redis, record).await;
        Ok(())
    }
}

/// Like [`CacheRepository`], but never writes to Redis itself. Used inside
/// a shard-local transaction, where an inner `save` succeeding only means
/// the row landed in the still-open transaction, not that it is durable.
/// Buffers the records it would have populated; the unit-of-work populates
/// them for real only once the transaction has actually committed, and
/// discards them on rollback.
pub(crate) struct DeferredCacheRepository {
    inner: Arc<dyn Repository>,
    pending: Mutex<Vec<UrlRecord>>,
}

impl DeferredCacheRepository {
    pub(crate) fn new(inner: Arc<dyn Repository>) -> Self {
        Self {
            inner,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Drain the records buffered by successful `save` calls.
    pub(crate) async fn take_pending(&self) -> Vec<UrlRecord> {
        std::mem::take(&mut *self.pending.lock().await)
    }
}

#[async_trait]
impl Repository for DeferredCacheRepository {
    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError> {
        self.inner.find(shortcode).await
    }

    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError> {
        self.inner.save(record).await?;
        self.pending.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A live ConnectionManager requires a real Redis connection, so the
    // cache-hit/miss paths through `CacheRepository` itself are exercised
    // only as integration scenarios, not unit tests here. `cache_key` is
    // the one pure piece worth pinning down.

    #[test]
    fn cache_key_is_prefixed_with_url_colon() {
        assert_eq!(cache_key("abc123"), "url:abc123");
    }

    #[tokio::test]
    async fn deferred_repository_buffers_saves_until_drained() {
        use crate::repository::mock::MockRepository;

        let mut inner = MockRepository::new();
        inner
            .expect_save()
            .withf(|r| r.shortcode == "abc123")
            .times(1)
            .returning(|_| Ok(()));

        let deferred = DeferredCacheRepository::new(Arc::new(inner));
        deferred
            .save(&UrlRecord::new("https://example.com", "abc123"))
            .await
            .unwrap();

        let pending = deferred.take_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].shortcode, "abc123");

        // Draining clears the buffer.
        assert!(deferred.take_pending().await.is_empty());
    }
}
