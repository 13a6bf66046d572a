//! The layered repository capability: every layer (database, cache,
//! queue-publisher) implements the same `save`/`find` contract and holds
//! the next layer behind a shared `Arc<dyn Repository>`. The factory in
//! [`crate::unit_of_work`] builds the chain once per request; it is never
//! mutated afterwards.

use async_trait::async_trait;

use crate::error::RepoError;
use crate::model::UrlRecord;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a new record. A duplicate `shortcode` must surface as
    /// `RepoError::IntegrityViolation`, never as `Transient`.
    async fn save(&self, record: &UrlRecord) -> Result<(), RepoError>;

    /// Look up a record by shortcode. An absent row is
    /// `RepoError::NotFound`, never a zero-valued record.
    async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError>;
}

#[cfg(test)]
pub mod mock {
    //! A mockall-generated mock of [`Repository`] for decorator tests.
    use super::*;

    mockall::mock! {
        pub Repository {}

        #[async_trait]
        impl Repository for Repository {
            async fn save(&self, record: &UrlRecord) -> Result<(), RepoError>;
            async fn find(&self, shortcode: &str) -> Result<UrlRecord, RepoError>;
        }
    }
}
