//! In-process store implementation
//!
//! Backs the engine with plain maps for tests and single-process local
//! development. The blocking pop is a polling loop; semantics match the
//! Redis commands the engine uses, including lexicographic tie-breaking on
//! equal sorted-set scores and hashes disappearing with their last field.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::StoreResult;
use crate::store::Store;

const BLPOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, ZSet>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Sorted set: rank order is `(score, member)`
#[derive(Default)]
struct ZSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl ZSet {
    fn insert(&mut self, score: i64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) {
        if let Some(old) = self.scores.remove(member) {
            self.ordered.remove(&(old, member.to_string()));
        }
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner operations never panic, so the lock cannot be poisoned.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let inner = self.lock();
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(hash) = inner.hashes.get_mut(key) {
            for field in fields {
                hash.remove(*field);
            }
            if hash.is_empty() {
                inner.hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(score, member);
        Ok(())
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, i64)>> {
        let inner = self.lock();
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        // Negative ranks are not needed by the engine and read as empty.
        if start < 0 || stop < start {
            return Ok(Vec::new());
        }
        let count = (stop - start + 1) as usize;
        Ok(zset
            .ordered
            .iter()
            .skip(start as usize)
            .take(count)
            .map(|(score, member)| (member.clone(), *score))
            .collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if let Some(zset) = inner.zsets.get_mut(key) {
            zset.remove(member);
        }
        Ok(())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let inner = self.lock();
        Ok(inner.zsets.get(key).map_or(0, |z| z.ordered.len() as u64))
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let inner = self.lock();
        Ok(inner.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn blpop(
        &self,
        keys: &[String],
        timeout_secs: u64,
    ) -> StoreResult<Option<(String, String)>> {
        let deadline = if timeout_secs == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(timeout_secs))
        };

        loop {
            {
                let mut inner = self.lock();
                for key in keys {
                    if let Some(list) = inner.lists.get_mut(key) {
                        if let Some(value) = list.pop_front() {
                            return Ok(Some((key.clone(), value)));
                        }
                    }
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
            }
            tokio::time::sleep(BLPOP_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zset_orders_by_score_then_member() {
        let store = MemoryStore::new();
        store.zadd("z", 5, "b").await.unwrap();
        store.zadd("z", 5, "a").await.unwrap();
        store.zadd("z", 1, "c").await.unwrap();

        let all = store.zrange_withscores("z", 0, 2).await.unwrap();
        assert_eq!(
            all,
            vec![
                ("c".to_string(), 1),
                ("a".to_string(), 5),
                ("b".to_string(), 5)
            ]
        );

        // Peek of the minimum does not remove it
        let min = store.zrange_withscores("z", 0, 0).await.unwrap();
        assert_eq!(min, vec![("c".to_string(), 1)]);
        assert_eq!(store.zcard("z").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_zadd_overwrites_score() {
        let store = MemoryStore::new();
        store.zadd("z", 10, "a").await.unwrap();
        store.zadd("z", 2, "a").await.unwrap();

        assert_eq!(store.zcard("z").await.unwrap(), 1);
        let min = store.zrange_withscores("z", 0, 0).await.unwrap();
        assert_eq!(min, vec![("a".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_zrem_is_idempotent() {
        let store = MemoryStore::new();
        store.zadd("z", 1, "a").await.unwrap();
        store.zrem("z", "a").await.unwrap();
        store.zrem("z", "a").await.unwrap();
        assert_eq!(store.zcard("z").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hash_disappears_with_last_field() {
        let store = MemoryStore::new();
        store
            .hset("h", &[("x", "1".into()), ("y", "2".into())])
            .await
            .unwrap();
        store.hdel("h", &["x", "y"]).await.unwrap();
        assert!(store.hget_all("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blpop_returns_queued_value() {
        let store = MemoryStore::new();
        store.lpush("q", "v1").await.unwrap();
        let hit = store
            .blpop(&["q".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(hit, Some(("q".to_string(), "v1".to_string())));
        assert_eq!(store.llen("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blpop_scans_keys_in_order() {
        let store = MemoryStore::new();
        store.lpush("q2", "v2").await.unwrap();
        let hit = store
            .blpop(&["q1".to_string(), "q2".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(hit, Some(("q2".to_string(), "v2".to_string())));
    }

    #[tokio::test]
    async fn test_blpop_times_out_empty() {
        let store = MemoryStore::new();
        let miss = store.blpop(&["empty".to_string()], 1).await.unwrap();
        assert_eq!(miss, None);
    }
}
