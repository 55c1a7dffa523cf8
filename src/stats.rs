//! Cache statistics and store health
//!
//! [`StatsReporter`] combines the server's own figures (key count, memory,
//! uptime, connections) with the hit/miss counters of a [`NamespacedCache`]
//! and, optionally, the embedding memo counters.

use crate::cache::{CacheCounters, NamespacedCache};
use crate::connection::RedisConfig;
use crate::embedding::{EmbeddingMemoCache, MemoStats};
use crate::error::{CacheError, Result};
use crate::kv::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection figures reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub total_connections: u64,
    pub connected_clients: u64,
}

/// Snapshot returned by [`StatsReporter::get_stats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    pub total_keys: u64,
    pub used_memory_bytes: u64,
    pub used_memory_human: String,
    pub uptime_seconds: u64,

    /// `hit_count / total_requests`, 0 when nothing was looked up
    pub hit_rate: f64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_requests: u64,

    pub connection: ConnectionInfo,

    /// Embedding memo counters, when a memo is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<MemoStats>,
}

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Store is healthy and responsive
    Healthy,
    /// Store is responsive but slow (above degraded threshold)
    Degraded,
    /// Store is not responsive or erroring
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code equivalent
    pub fn to_http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Detailed health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall health status
    pub status: HealthStatus,
    /// PING round trip in milliseconds
    pub response_time_ms: u64,
    /// Timestamp of the health check
    pub timestamp: DateTime<Utc>,
    /// Error message (if unhealthy)
    pub error: Option<String>,
}

impl HealthCheckResult {
    fn responsive(response_time: Duration, degraded_threshold_ms: u64) -> Self {
        let response_time_ms = response_time.as_millis() as u64;
        let status = if response_time_ms > degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            response_time_ms,
            timestamp: Utc::now(),
            error: None,
        }
    }

    fn unhealthy(response_time: Duration, error: &str) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: response_time.as_millis() as u64,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

/// Reports usage statistics and health of the cache's backing store
pub struct StatsReporter {
    store: Arc<dyn KeyValueStore>,
    counters: Arc<CacheCounters>,
    memo: Option<Arc<EmbeddingMemoCache>>,
    degraded_threshold_ms: u64,
}

impl StatsReporter {
    /// Reporter for `cache`, sharing its store and hit/miss counters.
    ///
    /// The degraded threshold starts at the [`RedisConfig`] default. A store
    /// opened with a custom threshold should go through
    /// [`with_redis_config`](Self::with_redis_config).
    pub fn new(cache: &NamespacedCache) -> Self {
        Self {
            store: Arc::clone(cache.store()),
            counters: cache.counters(),
            memo: None,
            degraded_threshold_ms: RedisConfig::default().degraded_threshold_ms,
        }
    }

    /// Use the degraded threshold of the configuration the store was opened with
    pub fn with_redis_config(self, config: &RedisConfig) -> Self {
        self.with_degraded_threshold(config.degraded_threshold_ms)
    }

    /// Include embedding memo counters in reports
    pub fn with_memo(mut self, memo: Arc<EmbeddingMemoCache>) -> Self {
        self.memo = Some(memo);
        self
    }

    /// PING latency above which the store is reported as degraded
    pub fn with_degraded_threshold(mut self, threshold_ms: u64) -> Self {
        self.degraded_threshold_ms = threshold_ms;
        self
    }

    /// Current statistics.
    ///
    /// Fails with [`CacheError::ConnectionError`] when the store cannot be
    /// reached; figures are never zero-filled.
    pub async fn get_stats(&self) -> Result<CacheReport> {
        let info = self.store.server_info().await.map_err(|e| {
            warn!("Cache statistics unavailable: {}", e);
            if e.is_connectivity() {
                CacheError::ConnectionError(format!("cache statistics unavailable: {}", e))
            } else {
                e
            }
        })?;

        let counts = self.counters.snapshot();
        let memo = match &self.memo {
            Some(memo) => Some(memo.stats().await),
            None => None,
        };

        debug!("Collected cache statistics: {} keys, {}", info.total_keys, counts);

        Ok(CacheReport {
            total_keys: info.total_keys,
            used_memory_bytes: info.used_memory_bytes,
            used_memory_human: info.used_memory_human,
            uptime_seconds: info.uptime_seconds,
            hit_rate: counts.hit_rate(),
            hit_count: counts.hits,
            miss_count: counts.misses,
            total_requests: counts.total_requests(),
            connection: ConnectionInfo {
                total_connections: info.total_connections,
                connected_clients: info.connected_clients,
            },
            memo,
        })
    }

    /// PING the store and classify the result.
    ///
    /// Always returns a result; failures are reported as `Unhealthy`.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => {
                let result =
                    HealthCheckResult::responsive(start.elapsed(), self.degraded_threshold_ms);
                if result.status == HealthStatus::Degraded {
                    warn!(
                        "Store responded slowly: {}ms (threshold: {}ms)",
                        result.response_time_ms, self.degraded_threshold_ms
                    );
                }
                result
            }
            Err(e) => {
                warn!("Store health check failed: {}", e);
                HealthCheckResult::unhealthy(start.elapsed(), &e.to_string())
            }
        }
    }
}
