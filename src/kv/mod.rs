//! Key-value store capability
//!
//! [`KeyValueStore`] is the narrow set of operations the caches need from
//! the backing store: strings with optional expiry, sets, pattern scans and
//! server statistics. Values are always strings; structured data is JSON
//! encoded by the caller.
//!
//! Two implementations ship with the crate:
//! - [`RedisStore`](crate::connection::RedisStore) for a real Redis server
//! - [`InMemoryStore`] for tests and offline runs, with outage simulation

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{InMemoryStore, StoreOp};

/// Operations against a networked key-value store.
///
/// Implementations must be safe to share across tasks. Every method that
/// touches the network returns a typed [`CacheError`](crate::CacheError)
/// instead of panicking or hanging past the configured timeout.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Round-trip liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Liveness as a plain flag. Never fails.
    async fn is_connected(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Fetch a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a string value without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store a string value with an expiry, atomically (SETEX).
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete one key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete several keys. Returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Set the expiry of an existing key. Returns false if the key is missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    /// All keys matching a glob pattern.
    ///
    /// Walks the whole key space; meant for reconciliation and admin tasks,
    /// not request paths.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Add a member to a set. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Remove every key of the selected database.
    async fn flush_database(&self) -> Result<()>;

    /// Server level statistics.
    async fn server_info(&self) -> Result<ServerInfo>;
}

/// Statistics reported by the store server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Number of keys in the selected database
    pub total_keys: u64,

    /// Memory used by the server in bytes
    pub used_memory_bytes: u64,

    /// Human readable memory usage (e.g. "1.05M")
    pub used_memory_human: String,

    /// Seconds since server start
    pub uptime_seconds: u64,

    /// Connections accepted since server start
    pub total_connections: u64,

    /// Currently connected clients
    pub connected_clients: u64,
}

/// Escape glob metacharacters so `value` matches itself literally inside a
/// `SCAN MATCH` pattern.
pub fn escape_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Format a byte count the way Redis reports `used_memory_human`.
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [(&str, f64); 3] = [
        ("G", 1024.0 * 1024.0 * 1024.0),
        ("M", 1024.0 * 1024.0),
        ("K", 1024.0),
    ];
    for (suffix, size) in UNITS {
        if bytes as f64 >= size {
            return format!("{:.2}{}", bytes as f64 / size, suffix);
        }
    }
    format!("{}B", bytes)
}
