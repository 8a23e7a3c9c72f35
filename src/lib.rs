//! delayq - Redis-backed delay queue
//!
//! A durable queue that accepts jobs scheduled for future delivery and
//! hands them to consumers only after a per-job delay has elapsed, with a
//! reservation discipline that redelivers any job a consumer fails to
//! acknowledge within its TTR window.
//!
//! # Architecture
//!
//! Job metadata is split from the time-ordered indexes:
//!
//! - **Job store**: one hash per job (`job:<id>`) holding topic, delay,
//!   TTR, and body. Metadata is the source of truth.
//! - **Buckets**: `bucket_size` sorted sets scored by delivery timestamp.
//!   A bucket entry is only a reference; the scanner re-checks metadata
//!   before every promotion.
//! - **Ready queues**: one list per topic of deliverable job ids.
//! - **Scanners**: one task per bucket on a 1-second tick, moving due ids
//!   into the ready lists and reconciling stale or orphaned entries.
//!
//! A `pop` is a blocking pop across the consumer's topics followed by a
//! reservation: the id goes back into a bucket at `now + ttr`, so delivery
//! is at-least-once and an unacknowledged job comes back after its TTR.
//!
//! # Example
//!
//! ```no_run
//! use delayq::{Config, DelayQueue, Job};
//!
//! # async fn example() -> delayq::Result<()> {
//! let queue = DelayQueue::connect(Config::default()).await?;
//! queue.start_scanners().await;
//!
//! queue.push(Job::new("order-17", "orders", delayq::unix_now() + 30, 60, "{}")).await?;
//!
//! if let Some(job) = queue.pop(&["orders".to_string()]).await? {
//!     // ... process ...
//!     queue.remove(&job.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod buckets;
pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod ready;
pub mod router;
pub mod scanner;
pub mod store;

pub use config::{Config, RedisConfig};
pub use error::{ConfigError, DelayQueueError, Result, StoreError, StoreResult};
pub use job::{unix_now, Job};
pub use queue::{DelayQueue, QueueDepths};
pub use router::BucketRouter;
pub use scanner::ScannerPool;
pub use store::{MemoryStore, RedisStore, Store};
