//! Store adapter for the delay queue
//!
//! A typed wrapper over the key-value server: hash operations for job
//! metadata, sorted-set operations for the time-ordered buckets, and list
//! operations (including a blocking pop) for the ready queues. Everything
//! above this module talks to the trait; the Redis implementation carries
//! the pool and the per-command deadlines.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::collections::HashMap;

use crate::error::StoreResult;

/// Trait for store implementations
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Set hash fields, creating the hash if needed
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;

    /// Read all fields of a hash; an absent key reads as an empty map
    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Delete hash fields; deleting the last field deletes the hash
    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()>;

    /// Insert a member with a score, overwriting the score if present
    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;

    /// Members with scores in rank order, `start..=stop`, without removal
    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, i64)>>;

    /// Remove a member; removing a missing member succeeds
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Number of members in a sorted set
    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Prepend a value to a list
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Length of a list
    async fn llen(&self, key: &str) -> StoreResult<u64>;

    /// Pop the head of the first non-empty list, blocking up to
    /// `timeout_secs` (0 blocks indefinitely); returns the `(key, value)`
    /// pair that was popped, or `None` on timeout
    async fn blpop(
        &self,
        keys: &[String],
        timeout_secs: u64,
    ) -> StoreResult<Option<(String, String)>>;
}

// Re-export async_trait for implementors outside this crate
pub use async_trait::async_trait;
