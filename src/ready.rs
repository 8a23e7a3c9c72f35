//! Ready queues: one list per topic holding deliverable job ids
//!
//! The scanner pushes promoted ids here; consumers block-pop across all of
//! their topics at once and the first non-empty list wins.

use std::sync::Arc;

use crate::config::Config;
use crate::error::StoreResult;
use crate::store::Store;

/// Operations on the per-topic ready lists
pub struct ReadyQueues {
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl ReadyQueues {
    /// Create a ready-queue view over the given backing store
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Append a job id to its topic's list
    pub async fn push(&self, topic: &str, job_id: &str) -> StoreResult<()> {
        self.store.lpush(&self.config.queue_key(topic), job_id).await
    }

    /// Block up to `timeout_secs` for an id on any of the topics; returns
    /// `None` on timeout or when `topics` is empty
    pub async fn pop_blocking(
        &self,
        topics: &[String],
        timeout_secs: u64,
    ) -> StoreResult<Option<String>> {
        if topics.is_empty() {
            return Ok(None);
        }
        let keys: Vec<String> = topics.iter().map(|t| self.config.queue_key(t)).collect();
        let hit = self.store.blpop(&keys, timeout_secs).await?;
        Ok(hit.map(|(_, job_id)| job_id))
    }

    /// Number of ids waiting on a topic
    pub async fn depth(&self, topic: &str) -> StoreResult<u64> {
        self.store.llen(&self.config.queue_key(topic)).await
    }
}
