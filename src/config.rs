//! Configuration types for delayq
//!
//! Plain structs with documented defaults, environment overrides, validation,
//! and the key-format helpers that pin the operator-visible Redis layout.
//! Loading a configuration file is left to the embedding process; the CLI
//! exposes every key as a flag with an environment fallback.

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

/// Address a front-end listener would bind; carried for that collaborator,
/// never bound by the engine itself
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9277";
/// Number of bucket shards
pub const DEFAULT_BUCKET_SIZE: usize = 3;
/// Format pattern for bucket keys (`%d` is the 1-based ordinal)
pub const DEFAULT_BUCKET_NAME: &str = "dq_bucket_%d";
/// 0 routes by stable hash, anything else round-robin
pub const DEFAULT_BUCKET_METHOD: u32 = 0;
/// Format pattern for per-topic ready lists (`%s` is the topic)
pub const DEFAULT_QUEUE_NAME: &str = "dq_queue_%s";
/// Seconds a blocking pop waits before reporting an empty queue
pub const DEFAULT_QUEUE_BLOCK_TIMEOUT: u64 = 178;

/// Redis address
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1:6379";
/// Redis database index
pub const DEFAULT_REDIS_DB: i64 = 1;
/// Idle connections the pool keeps warm
pub const DEFAULT_REDIS_MAX_IDLE: u32 = 10;
/// Pool cap on open connections, 0 = unlimited
pub const DEFAULT_REDIS_MAX_ACTIVE: u32 = 0;
/// Connect / pool checkout timeout in milliseconds
pub const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 5000;
/// Read deadline in milliseconds; must exceed the block timeout
pub const DEFAULT_REDIS_READ_TIMEOUT_MS: u64 = 180_000;
/// Write deadline in milliseconds
pub const DEFAULT_REDIS_WRITE_TIMEOUT_MS: u64 = 3000;

/// Margin the read deadline must keep above the block timeout, so a
/// server-side `BLPOP` timeout always wins over the client deadline
pub const READ_TIMEOUT_MARGIN_MS: u64 = 1000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Front-end listener address (external collaborator contract)
    pub bind_address: String,
    /// Number of bucket shards
    pub bucket_size: usize,
    /// Bucket key pattern, `%d` replaced by the ordinal
    pub bucket_name: String,
    /// 0 = hash routing, anything else = round-robin
    pub bucket_method: u32,
    /// Ready-list key pattern, `%s` replaced by the topic
    pub queue_name: String,
    /// Seconds a blocking pop waits
    pub queue_block_timeout: u64,
    /// Redis connection settings
    pub redis: RedisConfig,
}

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`, port optional (6379)
    pub host: String,
    /// Database index selected on connect
    pub db: i64,
    /// Auth password, empty = none
    pub password: String,
    /// Idle connections kept warm
    pub max_idle: u32,
    /// Open-connection cap, 0 = unlimited
    pub max_active: u32,
    /// Connect / checkout timeout, milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command read deadline, milliseconds
    pub read_timeout_ms: u64,
    /// Per-command write deadline, milliseconds
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            bucket_size: DEFAULT_BUCKET_SIZE,
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            bucket_method: DEFAULT_BUCKET_METHOD,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            queue_block_timeout: DEFAULT_QUEUE_BLOCK_TIMEOUT,
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            db: DEFAULT_REDIS_DB,
            password: String::new(),
            max_idle: DEFAULT_REDIS_MAX_IDLE,
            max_active: DEFAULT_REDIS_MAX_ACTIVE,
            connect_timeout_ms: DEFAULT_REDIS_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_REDIS_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_REDIS_WRITE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Defaults with every documented environment override applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply the documented environment overrides in place
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_string("HOST") {
            self.bind_address = v;
        }
        self.bucket_size = env_parse("BUCKET_SIZE", self.bucket_size)?;
        if let Some(v) = env_string("BUCKET_NAME") {
            self.bucket_name = v;
        }
        self.bucket_method = env_parse("BUCKET_METHOD", self.bucket_method)?;
        if let Some(v) = env_string("QUEUE_NAME") {
            self.queue_name = v;
        }
        self.queue_block_timeout = env_parse("QUEUE_BLOCK_TIMEOUT", self.queue_block_timeout)?;

        if let Some(v) = env_string("REDIS_HOST") {
            self.redis.host = v;
        }
        self.redis.db = env_parse("REDIS_DB", self.redis.db)?;
        if let Some(v) = env_string("REDIS_PASSWORD") {
            self.redis.password = v;
        }
        self.redis.max_idle = env_parse("REDIS_IDLE", self.redis.max_idle)?;
        self.redis.max_active = env_parse("REDIS_ACTIVE", self.redis.max_active)?;
        self.redis.connect_timeout_ms = env_parse("REDIS_TIMEOUT", self.redis.connect_timeout_ms)?;
        self.redis.read_timeout_ms =
            env_parse("REDIS_READ_TIMEOUT", self.redis.read_timeout_ms)?;
        self.redis.write_timeout_ms =
            env_parse("REDIS_WRITE_TIMEOUT", self.redis.write_timeout_ms)?;

        Ok(())
    }

    /// Validate cross-field constraints before the engine starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_size < 1 {
            return Err(ConfigError::InvalidBucketSize(self.bucket_size));
        }
        if !self.bucket_name.contains("%d") {
            return Err(ConfigError::InvalidBucketName(self.bucket_name.clone()));
        }
        if !self.queue_name.contains("%s") {
            return Err(ConfigError::InvalidQueueName(self.queue_name.clone()));
        }
        if self.queue_block_timeout < 1 {
            return Err(ConfigError::InvalidBlockTimeout);
        }
        split_host_port(&self.redis.host)?;
        if self.redis.read_timeout_ms < self.queue_block_timeout * 1000 + READ_TIMEOUT_MARGIN_MS {
            return Err(ConfigError::ReadTimeoutTooShort {
                read_timeout_ms: self.redis.read_timeout_ms,
                block_timeout_secs: self.queue_block_timeout,
            });
        }
        Ok(())
    }

    /// Key of the bucket with the given 1-based ordinal, e.g. `dq_bucket_1`
    pub fn bucket_key(&self, ordinal: usize) -> String {
        self.bucket_name.replacen("%d", &ordinal.to_string(), 1)
    }

    /// Keys of all buckets, in ordinal order
    pub fn bucket_keys(&self) -> Vec<String> {
        (1..=self.bucket_size).map(|n| self.bucket_key(n)).collect()
    }

    /// Key of the ready list for a topic, e.g. `dq_queue_orders`
    pub fn queue_key(&self, topic: &str) -> String {
        self.queue_name.replacen("%s", topic, 1)
    }
}

/// Split `host[:port]` into its parts, defaulting the port to 6379
pub(crate) fn split_host_port(host: &str) -> Result<(String, u16), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidRedisHost {
            host: host.to_string(),
            reason: "host must not be empty".to_string(),
        });
    }
    match host.rsplit_once(':') {
        Some((name, port)) => {
            let port = port.parse::<u16>().map_err(|_| ConfigError::InvalidRedisHost {
                host: host.to_string(),
                reason: format!("'{port}' is not a valid port"),
            })?;
            if name.is_empty() {
                return Err(ConfigError::InvalidRedisHost {
                    host: host.to_string(),
                    reason: "host must not be empty".to_string(),
                });
            }
            Ok((name.to_string(), port))
        }
        None => Ok((host.to_string(), 6379)),
    }
}

fn env_string(var: &'static str) -> Option<String> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn env_parse<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env_string(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvValue { var, value }),
        None => Ok(default),
    }
}
