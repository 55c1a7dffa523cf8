//! Redis connection management
//!
//! [`RedisStore`] implements [`KeyValueStore`] on top of a single multiplexed
//! async connection. The connection is opened lazily, shared by every caller
//! and dropped after a failure so that the next call reconnects. Each
//! operation, connecting included, is bounded by the configured timeout;
//! nothing blocks past it and nothing retries in the background.

use crate::error::{CacheError, Result};
use crate::kv::{human_bytes, KeyValueStore, ServerInfo};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection settings for [`RedisStore`]
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, `redis://[:password@]host:port/db`
    pub url: String,

    /// Upper bound for connecting and for every single command
    pub timeout: Duration,

    /// PING latency above which the store is reported as degraded
    pub degraded_threshold_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            timeout: Duration::from_secs(3),
            degraded_threshold_ms: 1000,
        }
    }
}

impl RedisConfig {
    /// Configuration for the given URL with default timeouts
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build the URL from its parts
    pub fn from_parts(host: &str, port: u16, db: u32, password: Option<&str>) -> Self {
        let auth = match password {
            Some(p) if !p.is_empty() => format!(":{}@", p),
            _ => String::new(),
        };
        Self::new(format!("redis://{}{}:{}/{}", auth, host, port, db))
    }

    /// Load settings from the environment (and `.env`, if present).
    ///
    /// `REDIS_URL` wins when set; otherwise the URL is assembled from
    /// `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB` and `REDIS_PASSWORD`.
    /// `REDIS_TIMEOUT` is in seconds.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("REDIS_URL") {
            Ok(url) => Self::new(url),
            Err(_) => {
                let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env_number("REDIS_PORT", 6379u16)?;
                let db = env_number("REDIS_DB", 0u32)?;
                let password = std::env::var("REDIS_PASSWORD").ok();
                Self::from_parts(&host, port, db, password.as_deref())
            }
        };

        let timeout_secs = env_number("REDIS_TIMEOUT", config.timeout.as_secs_f64())?;
        config.timeout = Duration::from_secs_f64(timeout_secs);

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("redis://")
            || self.url.starts_with("rediss://")
            || self.url.starts_with("unix://")
            || self.url.starts_with("redis+unix://"))
        {
            return Err(CacheError::ConfigError(format!(
                "unsupported Redis URL scheme: {}",
                redact(&self.url)
            )));
        }
        if self.timeout.is_zero() {
            return Err(CacheError::ConfigError(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CacheError::ConfigError(format!("{} is not a valid number: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Hide the password part of a connection URL for logging
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// Redis-backed [`KeyValueStore`]
pub struct RedisStore {
    client: redis::Client,
    config: RedisConfig,
    conn: StdMutex<Option<MultiplexedConnection>>,
    // Held while a connection is being opened, so only one attempt runs
    connecting: Mutex<()>,
}

impl RedisStore {
    /// Open a client and verify the server answers PING.
    ///
    /// # Example
    /// ```no_run
    /// use ouroboros_cache::{KeyValueStore, RedisConfig, RedisStore};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let store = RedisStore::connect(RedisConfig::new("redis://localhost:6379/0")).await?;
    ///     assert!(store.is_connected().await);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let store = Self::open(config)?;
        store.ping().await.map_err(|e| {
            CacheError::ConnectionError(format!(
                "Redis at {} did not answer: {}",
                redact(&store.config.url),
                e
            ))
        })?;
        info!("Successfully connected to Redis at {}", redact(&store.config.url));
        Ok(store)
    }

    /// Create a client without touching the network.
    ///
    /// The first command opens the connection. Use this when the service must
    /// start even while Redis is down; every cache call then degrades until
    /// the server comes back.
    pub fn open(config: RedisConfig) -> Result<Self> {
        config.validate()?;
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::ConfigError(format!("invalid Redis URL: {}", e)))?;

        debug!("Created Redis client for {}", redact(&config.url));

        Ok(Self {
            client,
            config,
            conn: StdMutex::new(None),
            connecting: Mutex::new(()),
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<MultiplexedConnection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared connection, opened on first use or after a failure.
    ///
    /// Not bounded by itself; callers apply their deadline.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let cached = self.slot().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let _gate = self.connecting.lock().await;
        // Another caller may have connected while we waited
        let cached = self.slot().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        debug!("Opening Redis connection to {}", redact(&self.config.url));
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis connection error: {}", e)))?;

        *self.slot() = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the shared connection so the next call reconnects.
    fn reset(&self) {
        if self.slot().take().is_some() {
            warn!("Dropped Redis connection after a failure; will reconnect on next use");
        }
    }

    fn timeout_error(&self, context: &str) -> CacheError {
        CacheError::TimeoutError {
            timeout_ms: self.config.timeout.as_millis() as u64,
            context: context.to_string(),
        }
    }

    /// Run one command under a single deadline that covers waiting for the
    /// connection, connecting and the command itself. The connection is
    /// dropped after an I/O failure or a timeout.
    async fn run<T, F, Fut>(&self, context: &str, op: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let deadline = Instant::now() + self.config.timeout;

        let conn = match tokio::time::timeout_at(deadline, self.connection()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.reset();
                return Err(e);
            }
            Err(_) => {
                debug!("Redis {} timed out waiting for a connection", context);
                return Err(self.timeout_error(context));
            }
        };

        match tokio::time::timeout_at(deadline, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                debug!("Redis {} failed: {}", context, e);
                if e.is_io_error() || e.is_connection_dropped() {
                    self.reset();
                }
                Err(CacheError::DriverError(e))
            }
            Err(_) => {
                self.reset();
                Err(self.timeout_error(context))
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let pong: String = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::ConnectionError(format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run("GET", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.run("SET", |mut conn| async move {
            conn.set::<_, _, ()>(key, value).await
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.run("SETEX", |mut conn| async move {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_secs)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: u64 = self
            .run("DEL", |mut conn| async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        // Batches keep single DEL commands small
        for chunk in keys.chunks(100) {
            removed += self
                .run("DEL", |mut conn| async move { conn.del::<_, u64>(chunk).await })
                .await?;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.run("EXISTS", |mut conn| async move { conn.exists(key).await })
            .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        self.run("EXPIRE", |mut conn| async move {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .query_async::<bool>(&mut conn)
                .await
        })
        .await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        // Incremental SCAN rather than KEYS so the server is never blocked
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = self
                .run("SCAN", |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may report a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let added: u64 = self
            .run("SADD", |mut conn| async move { conn.sadd(key, member).await })
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: u64 = self
            .run("SREM", |mut conn| async move { conn.srem(key, member).await })
            .await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.run("SMEMBERS", |mut conn| async move { conn.smembers(key).await })
            .await
    }

    async fn flush_database(&self) -> Result<()> {
        warn!("Flushing the entire Redis database at {}", redact(&self.config.url));
        self.run("FLUSHDB", |mut conn| async move {
            redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await
        })
        .await
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let raw: String = self
            .run("INFO", |mut conn| async move {
                redis::cmd("INFO").query_async(&mut conn).await
            })
            .await?;
        let total_keys: u64 = self
            .run("DBSIZE", |mut conn| async move {
                redis::cmd("DBSIZE").query_async(&mut conn).await
            })
            .await?;

        Ok(parse_server_info(&raw, total_keys))
    }
}

/// Parse the `key:value` lines of an `INFO` reply.
fn parse_server_info(raw: &str, total_keys: u64) -> ServerInfo {
    let fields: HashMap<&str, &str> = raw
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let number = |name: &str| -> u64 {
        fields
            .get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };

    let used_memory_bytes = number("used_memory");
    let used_memory_human = fields
        .get("used_memory_human")
        .map(|v| v.to_string())
        .unwrap_or_else(|| human_bytes(used_memory_bytes));

    ServerInfo {
        total_keys,
        used_memory_bytes,
        used_memory_human,
        uptime_seconds: number("uptime_in_seconds"),
        total_connections: number("total_connections_received"),
        connected_clients: number("connected_clients"),
    }
}
