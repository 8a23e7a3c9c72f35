//! Redis-backed store implementation
//!
//! Connections come from a bb8 pool of multiplexed connections. A blocking
//! pop checks its own connection out of the pool, so it only ever blocks
//! itself. Commands run under read/write deadlines; configuration
//! validation guarantees the read deadline outlasts a server-side `BLPOP`
//! timeout.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bb8_redis::{bb8, RedisConnectionManager};
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::config::{split_host_port, RedisConfig};
use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Pool cap substituted when `max_active` is 0; connections are created
/// lazily, so the cap is never reserved up front
const UNBOUNDED_POOL_SIZE: u32 = u32::MAX;

/// Redis-backed store
pub struct RedisStore {
    pool: bb8::Pool<RedisConnectionManager>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl RedisStore {
    /// Connect a pool using the given settings
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let (host, port) = split_host_port(&config.host)
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: config.db,
                password: if config.password.is_empty() {
                    None
                } else {
                    Some(config.password.clone())
                },
                ..Default::default()
            },
        };

        let manager = RedisConnectionManager::new(info).map_err(StoreError::from)?;
        let (max_size, min_idle) = pool_limits(config.max_idle, config.max_active);
        let pool = bb8::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_idle))
            .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build(manager)
            .await
            .map_err(StoreError::from)?;

        Ok(Self {
            pool,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        })
    }

    async fn conn(
        &self,
    ) -> StoreResult<bb8::PooledConnection<'_, RedisConnectionManager>> {
        self.pool.get().await.map_err(StoreError::from)
    }

    async fn with_deadline<T, F>(&self, deadline: Duration, fut: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Transport(format!(
                "command exceeded its {}ms deadline",
                deadline.as_millis()
            ))),
        }
    }
}

/// Map the configured idle/active caps onto the pool's size and
/// warm-connection floor
fn pool_limits(max_idle: u32, max_active: u32) -> (u32, u32) {
    let max_size = if max_active == 0 {
        UNBOUNDED_POOL_SIZE
    } else {
        max_active
    };
    (max_size, max_idle.min(max_size))
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fut = conn.hset_multiple(key, fields);
        let _: () = self.with_deadline(self.write_timeout, fut).await?;
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        let fut = conn.hgetall(key);
        self.with_deadline(self.read_timeout, fut).await
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fut = conn.hdel(key, fields);
        let _: () = self.with_deadline(self.write_timeout, fut).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fut = conn.zadd(key, member, score);
        let _: () = self.with_deadline(self.write_timeout, fut).await?;
        Ok(())
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, i64)>> {
        let mut conn = self.conn().await?;
        let fut = conn.zrange_withscores(key, start, stop);
        self.with_deadline(self.read_timeout, fut).await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fut = conn.zrem(key, member);
        let _: () = self.with_deadline(self.write_timeout, fut).await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let fut = conn.zcard(key);
        self.with_deadline(self.read_timeout, fut).await
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fut = conn.lpush(key, value);
        let _: () = self.with_deadline(self.write_timeout, fut).await?;
        Ok(())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let fut = conn.llen(key);
        self.with_deadline(self.read_timeout, fut).await
    }

    async fn blpop(
        &self,
        keys: &[String],
        timeout_secs: u64,
    ) -> StoreResult<Option<(String, String)>> {
        let mut conn = self.conn().await?;
        let fut = conn.blpop(keys, timeout_secs as f64);
        self.with_deadline(self.read_timeout, fut).await
    }
}
