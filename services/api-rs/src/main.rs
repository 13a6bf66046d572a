mod config;
mod dto;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use lapin::{Connection, ConnectionProperties};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use urlshort_core::ShardRouter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!(shards = config.shard_dsns.len(), "starting api-rs");

    let shard_router = Arc::new(ShardRouter::connect(&config.shard_dsns).await?);
    tracing::info!("all shards reachable");

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("redis ready");

    let amqp_channel = match &config.rabbitmq_url {
        Some(url) => {
            let conn = Connection::connect(url, ConnectionProperties::default()).await?;
            let channel = conn.create_channel().await?;
            tracing::info!("rabbitmq ready, direct-write fallback disabled");
            Some(Arc::new(channel))
        }
        None => {
            tracing::warn!("RABBITMQ_URL not set, running in direct-write mode");
            None
        }
    };

    let state = AppState::build(config.clone(), shard_router, redis, amqp_channel).await;

    let app = Router::new()
        .route("/", post(handlers::store))
        .route("/:shortcode", get(handlers::redirect))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    tracing::info!(addr = %state.config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
