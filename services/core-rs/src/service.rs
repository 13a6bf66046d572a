//! Thin coordination surface sitting above the repository stack. No
//! validation of `url`/`code` beyond what the stack itself performs.

use std::sync::Arc;

use crate::error::RepoError;
use crate::model::UrlRecord;
use crate::unit_of_work::RepositoryFactory;

pub struct UrlService {
    factory: Arc<RepositoryFactory>,
}

impl UrlService {
    pub fn new(factory: Arc<RepositoryFactory>) -> Self {
        Self { factory }
    }

    pub async fn get(&self, code: &str) -> Result<UrlRecord, RepoError> {
        let stack = self.factory.build_stack(code);
        stack.find(code).await
    }

    pub async fn store(&self, url: &str, code: &str) -> Result<(), RepoError> {
        let stack = self.factory.build_stack(code);
        let record = UrlRecord::new(url, code);
        stack.save(&record).await
    }
}
