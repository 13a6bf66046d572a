use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use urlshort_core::{RepositoryFactory, ShardRouter, UrlService};

use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub service: UrlService,
}

impl AppState {
    pub async fn build(
        config: Config,
        shard_router: Arc<ShardRouter>,
        redis: ConnectionManager,
        amqp_channel: Option<Arc<lapin::Channel>>,
    ) -> Arc<Self> {
        let factory = Arc::new(RepositoryFactory::new(
            shard_router,
            Arc::new(Mutex::new(redis)),
            amqp_channel,
        ));
        let service = UrlService::new(factory);
        Arc::new(Self { config, service })
    }
}
