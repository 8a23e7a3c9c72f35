//! The delay-queue façade
//!
//! Composes the job store, bucket index, router, and ready queues into the
//! public operations: `push`, `pop`, `remove`, `get`. Owns the scanner pool
//! and the shutdown signal; everything is an explicit value constructed at
//! startup, there are no process-wide singletons.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::buckets::BucketIndex;
use crate::config::Config;
use crate::error::Result;
use crate::job::{unix_now, Job, JobStore};
use crate::ready::ReadyQueues;
use crate::router::BucketRouter;
use crate::scanner::ScannerPool;
use crate::store::{RedisStore, Store};

/// A delay queue over a backing store
pub struct DelayQueue {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    jobs: JobStore,
    buckets: BucketIndex,
    ready: ReadyQueues,
    router: BucketRouter,
    scanners: Mutex<Option<ScannerPool>>,
}

/// Per-bucket and per-topic depths for operators
#[derive(Debug, Clone, Serialize)]
pub struct QueueDepths {
    /// `(bucket key, entry count)` in ordinal order
    pub buckets: Vec<(String, u64)>,
    /// `(topic, ready count)` for the requested topics
    pub topics: Vec<(String, u64)>,
}

impl DelayQueue {
    /// Build a queue over an existing store
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            jobs: JobStore::new(store.clone()),
            buckets: BucketIndex::new(store.clone()),
            ready: ReadyQueues::new(store.clone(), config.clone()),
            router: BucketRouter::new(config.clone()),
            scanners: Mutex::new(None),
            store,
            config,
        })
    }

    /// Build a queue over a freshly connected Redis pool
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(RedisStore::connect(&config.redis).await?);
        Self::new(config, store)
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the per-bucket scanners; calling twice is a no-op
    pub async fn start_scanners(&self) {
        let mut scanners = self.scanners.lock().await;
        if scanners.is_none() {
            *scanners = Some(ScannerPool::start(self.store.clone(), self.config.clone()));
        }
    }

    /// Stop the scanners, interrupting any in-flight tick
    pub async fn shutdown(&self) {
        let pool = self.scanners.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    /// Add a job. Validates the invariants, writes the metadata, then
    /// indexes `(delay, id)` into the routed bucket. A crash between the
    /// two writes leaves orphaned metadata, which nothing references and
    /// which `remove` reclaims.
    pub async fn push(&self, job: Job) -> Result<()> {
        job.validate()?;
        self.jobs.put(&job).await?;
        let bucket = self.router.bucket(&job.id);
        self.buckets.push(&bucket, job.delay, &job.id).await?;
        tracing::debug!("pushed job {} to {} (due {})", job.id, bucket, job.delay);
        Ok(())
    }

    /// Block for a deliverable job on any of the topics. On delivery the
    /// job is reserved: its id is re-indexed at `now + ttr`, so a consumer
    /// that does not `remove` it within the TTR window gets it redelivered.
    /// Returns `None` on timeout, and also when the popped id's metadata
    /// disappeared between promotion and consumption.
    pub async fn pop(&self, topics: &[String]) -> Result<Option<Job>> {
        let job_id = match self
            .ready
            .pop_blocking(topics, self.config.queue_block_timeout)
            .await?
        {
            Some(job_id) => job_id,
            None => return Ok(None),
        };

        let job = match self.jobs.get(&job_id).await? {
            Some(job) => job,
            None => {
                tracing::debug!("popped job {} was removed before delivery", job_id);
                return Ok(None);
            }
        };

        let reserve_at = unix_now() + job.ttr;
        let bucket = self.router.bucket(&job_id);
        self.buckets.push(&bucket, reserve_at, &job_id).await?;
        tracing::debug!("reserved job {} in {} until {}", job_id, bucket, reserve_at);
        Ok(Some(job))
    }

    /// Delete a job's metadata. Idempotent; stale bucket entries are
    /// reclaimed lazily by the scanners.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.jobs.remove(id).await?;
        Ok(())
    }

    /// Read a job without affecting any index
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.get(id).await?)
    }

    /// Depths of every bucket and of the given topics
    pub async fn depths(&self, topics: &[String]) -> Result<QueueDepths> {
        let mut buckets = Vec::with_capacity(self.config.bucket_size);
        for key in self.config.bucket_keys() {
            let depth = self.buckets.depth(&key).await?;
            buckets.push((key, depth));
        }
        let mut depths = Vec::with_capacity(topics.len());
        for topic in topics {
            depths.push((topic.clone(), self.ready.depth(topic).await?));
        }
        Ok(QueueDepths {
            buckets,
            topics: depths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DelayQueueError;
    use crate::store::MemoryStore;

    fn queue_with(config: Config) -> (DelayQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = DelayQueue::new(config, store.clone()).unwrap();
        (queue, store)
    }

    fn short_block_config() -> Config {
        Config {
            queue_block_timeout: 1,
            redis: crate::config::RedisConfig {
                read_timeout_ms: 5000,
                ..Default::default()
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_push_rejects_invalid_jobs() {
        let (queue, _) = queue_with(Config::default());

        let err = queue.push(Job::new("", "t", 0, 1, "")).await.unwrap_err();
        assert!(matches!(err, DelayQueueError::InvalidJob(_)));

        let err = queue.push(Job::new("e", "t", 0, 0, "")).await.unwrap_err();
        assert!(matches!(err, DelayQueueError::InvalidJob(_)));
    }

    #[tokio::test]
    async fn test_push_writes_metadata_and_index_entry() {
        let (queue, _) = queue_with(Config::default());
        let now = unix_now();
        queue
            .push(Job::new("a", "orders", now + 30, 60, "x"))
            .await
            .unwrap();

        assert!(queue.get("a").await.unwrap().is_some());
        let depths = queue.depths(&[]).await.unwrap();
        let total: u64 = depths.buckets.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (queue, _) = queue_with(Config::default());
        queue
            .push(Job::new("a", "orders", unix_now() + 30, 60, "x"))
            .await
            .unwrap();

        queue.remove("a").await.unwrap();
        queue.remove("a").await.unwrap();
        assert_eq!(queue.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_topics() {
        let (queue, _) = queue_with(short_block_config());
        let popped = queue.pop(&["orders".to_string()]).await.unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_pop_reserves_at_now_plus_ttr() {
        let (queue, store) = queue_with(short_block_config());
        let now = unix_now();
        let job = Job::new("a", "orders", now, 60, "x");
        queue.push(job.clone()).await.unwrap();

        // Promote by hand so the test does not depend on scanner timing.
        store
            .lpush(&queue.config().queue_key("orders"), "a")
            .await
            .unwrap();

        let popped = queue.pop(&["orders".to_string()]).await.unwrap().unwrap();
        assert_eq!(popped, job);

        // The reservation landed in the job's stable hash bucket.
        let bucket = queue.router.bucket("a");
        let entry = queue.buckets.peek(&bucket).await.unwrap().unwrap();
        assert_eq!(entry.job_id, "a");
        assert!(entry.timestamp >= now + 60);
    }

    #[tokio::test]
    async fn test_pop_of_removed_job_is_none() {
        let (queue, store) = queue_with(short_block_config());
        // A promoted id whose metadata is already gone.
        store
            .lpush(&queue.config().queue_key("orders"), "ghost")
            .await
            .unwrap();

        let popped = queue.pop(&["orders".to_string()]).await.unwrap();
        assert_eq!(popped, None);
    }
}
