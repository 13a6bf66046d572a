mod config;
mod consumer;
mod metrics;
mod retry;
mod topology;

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use urlshort_core::{RepositoryFactory, ShardRouter};

use crate::config::Config;
use crate::metrics::WorkerMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        shards = config.shard_dsns.len(),
        max_retries = config.max_retries,
        "starting worker-rs"
    );

    let shard_router = Arc::new(ShardRouter::connect(&config.shard_dsns).await?);
    tracing::info!("all shards reachable");

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis = Arc::new(Mutex::new(
        redis::aio::ConnectionManager::new(redis_client).await?,
    ));
    tracing::info!("redis ready");

    let connection =
        Connection::connect(&config.rabbitmq_url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    topology::declare(&channel).await?;
    tracing::info!("rabbitmq topology declared");

    let factory = Arc::new(RepositoryFactory::new(shard_router, redis, None));
    let metrics = Arc::new(WorkerMetrics::new()?);
    metrics::serve(Arc::clone(&metrics), config.metrics_addr.clone());

    consumer::run(channel, factory, metrics, config.max_retries, "worker-rs").await?;

    tracing::info!("worker-rs shut down cleanly");
    Ok(())
}
