//! Error types for delayq
//!
//! Two layers:
//! - `StoreError` for the Redis adapter, split into retryable transport
//!   failures and non-retryable protocol failures
//! - `DelayQueueError` for everything the public queue API can surface

use thiserror::Error;

/// Top-level error type for the delay queue
#[derive(Error, Debug)]
pub enum DelayQueueError {
    /// A job failed invariant validation on push
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// Store (Redis) errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Store adapter errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connectivity or timeout failure; the operation may be retried
    #[error("transport: {0}")]
    Transport(String),

    /// Unexpected response shape or undecodable data; retrying will not help
    #[error("protocol: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Transport(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}

impl From<bb8_redis::bb8::RunError<redis::RedisError>> for StoreError {
    fn from(err: bb8_redis::bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8_redis::bb8::RunError::User(e) => e.into(),
            bb8_redis::bb8::RunError::TimedOut => {
                StoreError::Transport("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Bucket count must be at least one
    #[error("bucket size {0} is invalid: need at least 1 bucket")]
    InvalidBucketSize(usize),

    /// Bucket name pattern is missing its ordinal placeholder
    #[error("bucket name pattern '{0}' must contain a %d placeholder")]
    InvalidBucketName(String),

    /// Queue name pattern is missing its topic placeholder
    #[error("queue name pattern '{0}' must contain a %s placeholder")]
    InvalidQueueName(String),

    /// Blocking pop timeout must be positive
    #[error("queue block timeout must be at least 1 second")]
    InvalidBlockTimeout,

    /// Redis host is missing or malformed
    #[error("invalid redis host '{host}': {reason}")]
    InvalidRedisHost { host: String, reason: String },

    /// The read timeout would cut blocking pops short
    #[error(
        "redis read timeout {read_timeout_ms}ms must exceed the queue block timeout \
         {block_timeout_secs}s plus a safety margin"
    )]
    ReadTimeoutTooShort {
        read_timeout_ms: u64,
        block_timeout_secs: u64,
    },

    /// An environment override could not be parsed
    #[error("invalid value '{value}' in environment variable {var}")]
    InvalidEnvValue { var: &'static str, value: String },
}

/// Result type alias for public queue operations
pub type Result<T> = std::result::Result<T, DelayQueueError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    #[test]
    fn test_redis_error_classification() {
        let io: StoreError = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))
        .into();
        assert!(matches!(io, StoreError::Transport(_)));
        assert!(io.is_retryable());

        let type_err: StoreError =
            redis::RedisError::from((ErrorKind::TypeError, "unexpected reply")).into();
        assert!(matches!(type_err, StoreError::Protocol(_)));
        assert!(!type_err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_transport() {
        let err: StoreError = bb8_redis::bb8::RunError::<redis::RedisError>::TimedOut.into();
        assert!(err.is_retryable());
    }
}
