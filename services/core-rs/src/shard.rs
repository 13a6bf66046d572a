//! Shard router: maps a short code to one of N database shards by a stable
//! hash, and owns the bounded connection pool for each shard.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StartupError;

const MAX_OPEN_CONNS: u32 = 10;
const MAX_IDLE_CONNS: u32 = 5;

/// 32-bit FNV-1a over the UTF-8 bytes of `key`.
///
/// Part of the wire contract: the same code must always map to the same
/// shard for a given shard count N, so this is hand-rolled rather than
/// taken from a hashing crate tuned for `HashMap` use (which gives no
/// guarantee about the exact bit pattern it produces).
fn fnv1a_32(key: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub struct ShardRouter {
    shards: Vec<PgPool>,
}

impl ShardRouter {
    /// Connect to every shard and verify reachability before accepting
    /// traffic. Refuses to start if any shard is unreachable.
    pub async fn connect(dsns: &[String]) -> Result<Self, StartupError> {
        let mut shards = Vec::with_capacity(dsns.len());
        for (index, dsn) in dsns.iter().enumerate() {
            let pool = PgPoolOptions::new()
                .max_connections(MAX_OPEN_CONNS)
                .min_connections(MAX_IDLE_CONNS)
                .connect(dsn)
                .await
                .map_err(|e| StartupError::ShardUnreachable {
                    index,
                    source: e.into(),
                })?;

            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(|e| StartupError::ShardUnreachable {
                    index,
                    source: e.into(),
                })?;

            tracing::info!(shard = index, "connected to shard");
            shards.push(pool);
        }
        Ok(Self { shards })
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Deterministic shard index for `key` in `[0, N)`.
    pub fn shard_index(&self, key: &str) -> usize {
        (fnv1a_32(key) % self.shards.len() as u32) as usize
    }

    /// The shard label used in metrics, `shard-<i>`.
    pub fn shard_label(&self, key: &str) -> String {
        format!("shard-{}", self.shard_index(key))
    }

    /// The pool handle for shard `i`.
    pub fn shard(&self, i: usize) -> &PgPool {
        &self.shards[i]
    }

    /// Convenience: the pool handle for the shard that owns `key`.
    pub fn shard_for_key(&self, key: &str) -> &PgPool {
        self.shard(self.shard_index(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic_and_matches_reference_vectors() {
        // FNV-1a reference vectors for the empty string and "a" (32-bit).
        assert_eq!(fnv1a_32(""), 0x811c9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c292c);
        assert_eq!(fnv1a_32("abc123"), fnv1a_32("abc123"));
    }

    #[test]
    fn different_keys_can_still_collide_but_hash_is_stable_across_calls() {
        let h1 = fnv1a_32("shortcode-one");
        let h2 = fnv1a_32("shortcode-one");
        assert_eq!(h1, h2);
    }
}
