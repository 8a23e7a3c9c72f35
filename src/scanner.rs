//! Scanner pool: per-bucket promotion and reconciliation
//!
//! One task per bucket, ticking once a second. Each tick drains the bucket
//! front-to-back: due entries are promoted into their topic's ready list,
//! entries whose metadata is gone are garbage-collected, and entries whose
//! metadata delay has been rewritten into the future are re-indexed at the
//! authoritative time. A tick never overlaps itself; a late tick is
//! deferred, not run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::buckets::BucketIndex;
use crate::config::Config;
use crate::job::{unix_now, JobStore};
use crate::ready::ReadyQueues;
use crate::store::Store;

/// Tick period of every bucket scanner
pub const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// The running set of per-bucket scanner tasks
pub struct ScannerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ScannerPool {
    /// Spawn one scanner per configured bucket
    pub fn start(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (1..=config.bucket_size)
            .map(|ordinal| {
                let bucket = config.bucket_key(ordinal);
                tokio::spawn(scan_loop(
                    store.clone(),
                    config.clone(),
                    bucket,
                    shutdown.clone(),
                ))
            })
            .collect();
        Self { shutdown, handles }
    }

    /// Stop all scanners, interrupting any in-flight tick
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn scan_loop(
    store: Arc<dyn Store>,
    config: Arc<Config>,
    bucket: String,
    shutdown: Arc<AtomicBool>,
) {
    let jobs = JobStore::new(store.clone());
    let buckets = BucketIndex::new(store.clone());
    let ready = ReadyQueues::new(store, config);

    let mut tick = tokio::time::interval(SCAN_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!("scanner started for {}", bucket);
    loop {
        tick.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            tracing::debug!("scanner stopped for {}", bucket);
            return;
        }
        drain_bucket(&jobs, &buckets, &ready, &bucket).await;
    }
}

/// One tick: promote every due entry, reconciling against job metadata.
///
/// Ends on an empty bucket, a minimum entry still in the future, or a store
/// error (whatever was due is retried on the next tick).
async fn drain_bucket(jobs: &JobStore, buckets: &BucketIndex, ready: &ReadyQueues, bucket: &str) {
    loop {
        let entry = match buckets.peek(bucket).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("scan {}: peek failed: {}", bucket, e);
                return;
            }
        };

        let now = unix_now();
        if entry.timestamp > now {
            return;
        }

        let job = match jobs.get(&entry.job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    "scan {}: reading metadata for job {} failed: {}",
                    bucket,
                    entry.job_id,
                    e
                );
                return;
            }
        };

        let job = match job {
            Some(job) => job,
            None => {
                // Metadata gone: the job was removed, drop the stale entry.
                if let Err(e) = buckets.remove(bucket, &entry.job_id).await {
                    tracing::warn!(
                        "scan {}: dropping removed job {} failed: {}",
                        bucket,
                        entry.job_id,
                        e
                    );
                }
                continue;
            }
        };

        if job.delay > now {
            // The entry is stale: the job was re-pushed with a later delay
            // after this entry was indexed. Metadata is authoritative, so
            // re-index at job.delay instead of promoting.
            if let Err(e) = buckets.remove(bucket, &entry.job_id).await {
                tracing::warn!(
                    "scan {}: dropping stale entry for job {} failed: {}",
                    bucket,
                    entry.job_id,
                    e
                );
            }
            if let Err(e) = buckets.push(bucket, job.delay, &entry.job_id).await {
                tracing::warn!(
                    "scan {}: re-indexing job {} at {} failed: {}",
                    bucket,
                    entry.job_id,
                    job.delay,
                    e
                );
            }
            continue;
        }

        if let Err(e) = ready.push(&job.topic, &entry.job_id).await {
            // Not removed from the bucket, so the next tick retries it.
            tracing::error!(
                "scan {}: promoting job {} to topic {} failed: {}",
                bucket,
                entry.job_id,
                job.topic,
                e
            );
            return;
        }
        if let Err(e) = buckets.remove(bucket, &entry.job_id).await {
            tracing::warn!(
                "scan {}: removing promoted job {} failed, duplicate delivery possible: {}",
                bucket,
                entry.job_id,
                e
            );
        }
    }
}
