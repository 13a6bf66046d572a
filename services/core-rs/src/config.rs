//! Shared environment-variable parsing helpers, reused by both binaries'
//! own `Config::from_env()`.

use crate::error::StartupError;

pub fn env(key: &str) -> Result<String, StartupError> {
    std::env::var(key).map_err(|_| StartupError::MissingEnv(key.to_string()))
}

pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse `SHARD_DSNS` — a comma-separated list of database connection
/// strings. Order defines shard index.
pub fn parse_shard_dsns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_dsns_preserving_order() {
        let dsns = parse_shard_dsns("postgres://a,postgres://b,postgres://c");
        assert_eq!(
            dsns,
            vec!["postgres://a", "postgres://b", "postgres://c"]
        );
    }

    #[test]
    fn trims_whitespace_and_drops_empty_entries() {
        let dsns = parse_shard_dsns(" postgres://a , , postgres://b ");
        assert_eq!(dsns, vec!["postgres://a", "postgres://b"]);
    }
}
