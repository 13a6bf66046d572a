use thiserror::Error;

/// Errors surfaced by a [`crate::repository::Repository`] layer.
///
/// Callers must not coalesce `IntegrityViolation` and `Transient`: the
/// consumer's retry engine treats a duplicate shortcode as terminal-success
/// (it acks the message) while a transient failure consumes retry budget.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("shortcode not found")]
    NotFound,

    #[error("duplicate shortcode: {0}")]
    IntegrityViolation(String),

    #[error("transient error")]
    Transient(#[source] anyhow::Error),
}

impl RepoError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Marks a transient error as infrastructure-class (timeout, connection
/// refused/reset) at the point where the originating error type — e.g. a
/// `sqlx::Error` variant the consumer's retry classifier has no reason to
/// know about — would otherwise be erased into an opaque `anyhow::Error`.
#[derive(Debug, Error)]
#[error("infrastructure error: {0}")]
pub struct InfrastructureError(pub String);

/// Errors raised at process startup. Fatal by contract — the process aborts
/// rather than starting degraded.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid environment variable {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("shard {index} unreachable: {source}")]
    ShardUnreachable {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("broker connection failed: {0}")]
    BrokerUnreachable(#[source] anyhow::Error),
}
