pub mod cache_repository;
pub mod config;
pub mod db_repository;
pub mod error;
pub mod model;
pub mod queue_repository;
pub mod repository;
pub mod service;
pub mod shard;
pub mod unit_of_work;

pub use error::{InfrastructureError, RepoError, StartupError};
pub use model::UrlRecord;
pub use repository::Repository;
pub use service::UrlService;
pub use shard::ShardRouter;
pub use unit_of_work::RepositoryFactory;
