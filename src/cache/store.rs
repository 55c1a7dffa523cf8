//! Namespaced JSON cache over a [`KeyValueStore`]

use crate::cache::{
    config::CacheConfig,
    invalidation::{FlushReport, FlushScope},
    key::generate_key,
    types::{CacheCounters, CacheStats},
};
use crate::kv::KeyValueStore;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// JSON value cache with per-entry TTL, stored under `{prefix}:{digest}` keys.
///
/// Every operation degrades instead of failing: writes report `false`, reads
/// report a miss and the underlying error is logged. An unreachable store
/// therefore behaves like an always-empty cache.
///
/// Cloning is cheap; clones share the store and the hit/miss counters.
#[derive(Clone)]
pub struct NamespacedCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    counters: Arc<CacheCounters>,
}

impl NamespacedCache {
    /// Create a cache over `store`
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        debug!("Initializing namespaced cache with config: {:?}", config);
        Self {
            store,
            config,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Cache with the default configuration
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Deterministic key for `payload` under `prefix`
    pub fn generate_key(&self, prefix: &str, payload: &Value) -> String {
        let key = generate_key(prefix, payload);
        debug!("Generated cache key: {}", key);
        key
    }

    /// JSON-encode `value` and store it with `ttl`.
    ///
    /// Returns false, without writing, if the value cannot be encoded or the
    /// store fails.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> bool
    where
        T: Serialize + ?Sized,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode cache value for {}: {}", key, e);
                return false;
            }
        };

        let ttl_secs = self.config.jittered_secs(ttl);
        match self.store.set_with_ttl(key, &payload, ttl_secs).await {
            Ok(()) => {
                debug!("Cached {} ({} bytes, ttl {}s)", key, payload.len(), ttl_secs);
                true
            }
            Err(e) => {
                warn!("Failed to cache {}: {}", key, e);
                false
            }
        }
    }

    /// [`set`](Self::set) with the default TTL
    pub async fn set_default<T>(&self, key: &str, value: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.set(key, value, self.config.default_ttl).await
    }

    /// Collect a sequence of chunks and store them as one JSON array.
    pub async fn set_stream<I>(&self, key: &str, chunks: I, ttl: Duration) -> bool
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let items: Vec<I::Item> = chunks.into_iter().collect();
        debug!("Caching stream of {} chunks under {}", items.len(), key);
        self.set(key, &items, ttl).await
    }

    /// Decode the value stored at `key`.
    ///
    /// Absent on a miss, on a payload that does not decode as `T`, and when
    /// the store fails. Each call counts as exactly one hit or miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => {
                debug!("Cache miss: {}", key);
                self.counters.record_miss();
                return None;
            }
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                self.counters.record_miss();
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                self.counters.record_hit();
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                self.counters.record_miss();
                None
            }
        }
    }

    /// Remove one entry. True iff it existed.
    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!("Failed to delete cache entry {}: {}", key, e);
                false
            }
        }
    }

    /// Whether `key` currently holds a value. False if the store fails.
    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to check cache entry {}: {}", key, e);
                false
            }
        }
    }

    /// Delete every key matching a glob pattern. Returns how many were
    /// removed, 0 on failure.
    ///
    /// Scans the whole key space; for administration, not request paths.
    pub async fn delete_by_pattern(&self, pattern: &str) -> u64 {
        match self.try_delete_by_pattern(pattern).await {
            Ok(removed) => {
                info!("Removed {} keys matching {}", removed, pattern);
                removed
            }
            Err(e) => {
                warn!("Failed to delete keys matching {}: {}", pattern, e);
                0
            }
        }
    }

    async fn try_delete_by_pattern(&self, pattern: &str) -> crate::Result<u64> {
        let keys = self.store.keys_matching(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.delete_many(&keys).await
    }

    /// Bulk invalidation according to the configured [`FlushScope`].
    ///
    /// True iff every part of the flush succeeded.
    pub async fn flush_all(&self) -> bool {
        self.flush(self.config.flush_scope).await.is_complete()
    }

    /// Bulk invalidation with an explicit scope
    pub async fn flush(&self, scope: FlushScope) -> FlushReport {
        match scope {
            FlushScope::Database => {
                warn!("Flushing the whole database, conversations included");
                match self.store.flush_database().await {
                    Ok(()) => FlushReport::default(),
                    Err(e) => {
                        warn!("Database flush failed: {}", e);
                        FlushReport {
                            removed: 0,
                            failed_patterns: 1,
                        }
                    }
                }
            }
            FlushScope::OwnedPrefixes => {
                let mut report = FlushReport::default();
                for pattern in scope.patterns() {
                    match self.try_delete_by_pattern(&pattern).await {
                        Ok(removed) => report.removed += removed,
                        Err(e) => {
                            warn!("Failed to flush {}: {}", pattern, e);
                            report.failed_patterns += 1;
                        }
                    }
                }
                info!(
                    "Flushed {} cache entries ({} patterns failed)",
                    report.removed, report.failed_patterns
                );
                report
            }
        }
    }

    /// Hit/miss counters since creation or the last reset
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    pub(crate) fn counters(&self) -> Arc<CacheCounters> {
        Arc::clone(&self.counters)
    }
}
