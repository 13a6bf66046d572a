//! Database repository: persists and retrieves a single shard's `urls`
//! table row. Schema (`id, shortcode, url, accesses`, unique on
//! `shortcode`) is established out of band by an external migration tool;
//! this layer only ever reads and writes rows.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::{InfrastructureError, RepoError};
use crate::model::UrlRecord;
use crate::repository::Repository;

/// Postgres-specific unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Connection- and pool-exhaustion-class `sqlx` failures. These are the
/// likely shape of a failure against the 10/5 bounded per-shard pool and
/// must survive classification as infrastructure, not as a logical error
/// that burns retry budget.
fn is_connection_class(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

fn classify_sqlx_error(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return RepoError::IntegrityViolation(db_err.message().to_string());
        }
    }
    if is_connection_class(&err) {
        return RepoError::transient(InfrastructureError(err.to_string()));
    }
    RepoError::transient(err)
}

pub struct DatabaseRepository {
    pool: PgPool,
}

impl DatabaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for DatabaseRepository {
    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO urls (shortcode, url, accesses) VALUES ($1, $2, 0)")
            .bind(&record.shortcode)
            .bind(&record.url)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError> {
        sqlx::query_as::<_, UrlRecord>(
            "SELECT id, shortcode, url, accesses FROM urls WHERE shortcode = $1",
        )
        .bind(shortcode)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?
        .ok_or(RepoError::NotFound)
    }
}

/// Shard-local transactional repository. Produced only by
/// [`crate::unit_of_work::RepositoryFactory::execute_transaction`]; never
/// composed with the queue layer, since an uncommitted enqueue cannot be
/// rolled back.
pub struct TransactionalDatabaseRepository {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl TransactionalDatabaseRepository {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Consume self and commit the held transaction.
    pub async fn commit(self) -> Result<(), RepoError> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => tx.commit().await.map_err(RepoError::transient),
            None => Ok(()),
        }
    }

    /// Consume self and roll back the held transaction.
    pub async fn rollback(self) -> Result<(), RepoError> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => tx.rollback().await.map_err(RepoError::transient),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for TransactionalDatabaseRepository {
    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| {
            RepoError::transient(anyhow::anyhow!("transaction already finished"))
        })?;
        sqlx::query("INSERT INTO urls (shortcode, url, accesses) VALUES ($1, $2, 0)")
            .bind(&record.shortcode)
            .bind(&record.url)
            .execute(&mut **tx)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| {
            RepoError::transient(anyhow::anyhow!("transaction already finished"))
        })?;
        sqlx::query_as::<_, UrlRecord>(
            "SELECT id, shortcode, url, accesses FROM urls WHERE shortcode = $1",
        )
        .bind(shortcode)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify_sqlx_error)?
        .ok_or(RepoError::NotFound)
    }
}
