//! Bucket routing
//!
//! Maps a job id to one of the `bucket_size` bucket keys. Hash mode keeps
//! the mapping stable (the same id always lands in the same bucket, which
//! bounds duplicate-scan risk); round-robin trades that stability for a
//! uniform spread across buckets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;

/// Routes job ids to bucket keys
pub struct BucketRouter {
    config: Arc<Config>,
    mode: Mode,
}

enum Mode {
    /// Stable `fnv32a(id) mod size` routing
    Hash,
    /// Serialized counter emitting ordinals `1, 2, …, size, 1, …`
    RoundRobin(AtomicUsize),
}

impl BucketRouter {
    /// Create a router in the mode the configuration selects
    pub fn new(config: Arc<Config>) -> Self {
        let mode = if config.bucket_method == 0 {
            Mode::Hash
        } else {
            Mode::RoundRobin(AtomicUsize::new(0))
        };
        Self { config, mode }
    }

    /// Bucket key for a job id
    pub fn bucket(&self, id: &str) -> String {
        let size = self.config.bucket_size;
        let ordinal = match &self.mode {
            Mode::Hash => (fnv32a(id.as_bytes()) as usize % size) + 1,
            Mode::RoundRobin(counter) => (counter.fetch_add(1, Ordering::Relaxed) % size) + 1,
        };
        self.config.bucket_key(ordinal)
    }
}

/// 32-bit FNV-1a
pub(crate) fn fnv32a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 16_777_619;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(PRIME))
}
