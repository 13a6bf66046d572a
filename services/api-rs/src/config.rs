use urlshort_core::config::{env, env_or, parse_shard_dsns};
use urlshort_core::StartupError;

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub shard_dsns: Vec<String>,
    pub rabbitmq_url: Option<String>,
    pub redis_url: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        dotenvy::dotenv().ok();

        let dsns_raw = env("SHARD_DSNS")?;
        let shard_dsns = parse_shard_dsns(&dsns_raw);
        if shard_dsns.is_empty() {
            return Err(StartupError::InvalidEnv {
                name: "SHARD_DSNS".to_string(),
                value: dsns_raw,
            });
        }

        Ok(Self {
            shard_dsns,
            rabbitmq_url: std::env::var("RABBITMQ_URL").ok(),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
        })
    }
}
