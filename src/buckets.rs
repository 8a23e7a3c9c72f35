//! Bucket index: the sharded, time-ordered job index
//!
//! Each bucket is a sorted set scored by delivery timestamp, with the job
//! id as the member. Entries are references only; the scanner cross-checks
//! them against job metadata before promotion, so a stale entry is never
//! authoritative.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::store::Store;

/// A `(timestamp, id)` pair observed in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    /// Delivery timestamp, unix seconds
    pub timestamp: i64,
    /// Job id the entry points at
    pub job_id: String,
}

/// Operations on the bucket sorted sets
pub struct BucketIndex {
    store: Arc<dyn Store>,
}

impl BucketIndex {
    /// Create a bucket index over the given backing store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert an entry, overwriting the timestamp if the id is already in
    /// this bucket
    pub async fn push(&self, bucket: &str, timestamp: i64, job_id: &str) -> StoreResult<()> {
        self.store.zadd(bucket, timestamp, job_id).await
    }

    /// Minimum-timestamp entry without removing it; ties break by id
    pub async fn peek(&self, bucket: &str) -> StoreResult<Option<BucketEntry>> {
        let mut entries = self.store.zrange_withscores(bucket, 0, 0).await?;
        let result = entries.drain(..).next().map(|(job_id, timestamp)| BucketEntry {
            timestamp,
            job_id,
        });
        Ok(result)
    }

    /// Remove an entry; removing a missing entry succeeds
    pub async fn remove(&self, bucket: &str, job_id: &str) -> StoreResult<()> {
        self.store.zrem(bucket, job_id).await
    }

    /// Number of entries in a bucket
    pub async fn depth(&self, bucket: &str) -> StoreResult<u64> {
        self.store.zcard(bucket).await
    }
}
