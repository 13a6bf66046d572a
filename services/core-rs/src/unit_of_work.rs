//! Unit-of-Work / repository factory: assembles the layered repository
//! stack for a given sharding key.
//!
//! `stack(key) = Cache(Queue(Database(shard(key))))` when a broker channel
//! is configured, else `Cache(Database(shard(key)))`.
//!
//! `execute_transaction` produces a *different* stack — a shard-local
//! transactional database handle rebound to the same cache layer, with no
//! queue layer at all, since an uncommitted enqueue cannot be rolled back.
//! These are deliberately two separate builders rather than one with a
//! runtime flag.

use std::future::Future;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::cache_repository::{self, CacheRepository, DeferredCacheRepository};
use crate::db_repository::{DatabaseRepository, TransactionalDatabaseRepository};
use crate::error::RepoError;
use crate::queue_repository::QueuePublisherRepository;
use crate::repository::Repository;
use crate::shard::ShardRouter;

pub struct RepositoryFactory {
    shard_router: Arc<ShardRouter>,
    redis: Arc<Mutex<ConnectionManager>>,
    amqp_channel: Option<Arc<lapin::Channel>>,
}

impl RepositoryFactory {
    pub fn new(
        shard_router: Arc<ShardRouter>,
        redis: Arc<Mutex<ConnectionManager>>,
        amqp_channel: Option<Arc<lapin::Channel>>,
    ) -> Self {
        Self {
            shard_router,
            redis,
            amqp_channel,
        }
    }

    /// The metrics shard label (`shard-<i>`) that owns `sharding_key`.
    pub fn shard_label(&self, sharding_key: &str) -> String {
        self.shard_router.shard_label(sharding_key)
    }

    /// Build the request-scoped repository stack for `sharding_key`. Built
    /// once, never mutated.
    pub fn build_stack(&self, sharding_key: &str) -> Arc<dyn Repository> {
        let shard_index = self.shard_router.shard_index(sharding_key);
        let pool = self.shard_router.shard(shard_index).clone();
        let db_repo: Arc<dyn Repository> = Arc::new(DatabaseRepository::new(pool));

        let inner: Arc<dyn Repository> = match &self.amqp_channel {
            Some(channel) => Arc::new(QueuePublisherRepository::new(channel.clone(), db_repo)),
            None => db_repo,
        };

        Arc::new(CacheRepository::new(inner, self.redis.clone()))
    }

    /// Run `op` inside a shard-local transaction bound to `sharding_key`,
    /// decorated only with the cache layer (no queue). Commits iff `op`
    /// returns `Ok`, else rolls back.
    ///
    /// Cache population for anything `op` saves is deferred until the
    /// commit actually succeeds: an insert landing in the open transaction
    /// is not yet durable, so populating Redis any earlier could serve a
    /// record the store never really kept.
    pub async fn execute_transaction<F, Fut, T>(
        &self,
        sharding_key: &str,
        op: F,
    ) -> Result<T, RepoError>
    where
        F: FnOnce(Arc<dyn Repository>) -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let shard_index = self.shard_router.shard_index(sharding_key);
        let pool = self.shard_router.shard(shard_index);
        let tx = pool.begin().await.map_err(RepoError::transient)?;

        let tx_repo = Arc::new(TransactionalDatabaseRepository::new(tx));
        let deferred = Arc::new(DeferredCacheRepository::new(tx_repo.clone()));
        let stack: Arc<dyn Repository> = deferred.clone();

        let result = op(stack).await;

        // `op` only holds its stack argument for the duration of the
        // future it returned, which has already resolved above, so
        // `deferred` and `tx_repo` are otherwise only held here.
        let pending = deferred.take_pending().await;
        drop(deferred);
        let tx_repo = Arc::try_unwrap(tx_repo).unwrap_or_else(|_| {
            unreachable!("transaction repository outlived its only two owners")
        });

        match result {
            Ok(value) => {
                tx_repo.commit().await?;
                for record in &pending {
                    cache_repository::populate(&self.redis, record).await;
                }
                Ok(value)
            }
            Err(e) => {
                tx_repo.rollback().await?;
                Err(e)
            }
        }
    }
}
