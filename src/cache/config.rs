//! Configuration for the cache system

use crate::cache::invalidation::FlushScope;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by the namespaced cache, the conversation store and
/// the embedding memo.
///
/// The defaults are the TTLs the service has always used:
/// - default entries: 1 hour
/// - search results: 30 minutes
/// - frequently used results (vector search): 2 hours
/// - LLM responses: 1 hour
/// - conversations: 30 days, refreshed on every read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when the caller does not pick one
    pub default_ttl: Duration,

    /// TTL for search results
    pub search_ttl: Duration,

    /// TTL for frequently reused results
    pub frequent_ttl: Duration,

    /// TTL for LLM responses
    pub chat_ttl: Duration,

    /// Sliding TTL for conversation records and user indexes
    pub conversation_ttl: Duration,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expiry of entries written together. Off by default so the
    /// TTLs above are exact.
    pub ttl_jitter: f64,

    /// What `flush_all` removes
    pub flush_scope: FlushScope,

    /// Maximum number of memoised embeddings
    pub memo_max_entries: usize,

    /// Age after which a memoised embedding is ignored
    pub memo_ttl: Duration,

    /// Share of the memo evicted when it is full (0.0 - 1.0]
    pub memo_eviction_fraction: f64,

    /// Length of the zero vector returned for empty input
    pub embedding_dimension: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            search_ttl: Duration::from_secs(1800),
            frequent_ttl: Duration::from_secs(7200),
            chat_ttl: Duration::from_secs(3600),
            conversation_ttl: Duration::from_secs(30 * 24 * 3600),
            ttl_jitter: 0.0,
            flush_scope: FlushScope::default(),
            memo_max_entries: 2000,
            memo_ttl: Duration::from_secs(3600),
            memo_eviction_fraction: 0.2,
            embedding_dimension: 768,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("default_ttl", self.default_ttl),
            ("search_ttl", self.search_ttl),
            ("frequent_ttl", self.frequent_ttl),
            ("chat_ttl", self.chat_ttl),
            ("conversation_ttl", self.conversation_ttl),
            ("memo_ttl", self.memo_ttl),
        ];
        for (name, ttl) in ttls {
            if ttl.as_secs() == 0 {
                return Err(CacheError::ConfigError(format!(
                    "{} must be at least one second",
                    name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.memo_max_entries == 0 {
            return Err(CacheError::ConfigError(
                "memo_max_entries must be greater than 0".to_string(),
            ));
        }

        if !(self.memo_eviction_fraction > 0.0 && self.memo_eviction_fraction <= 1.0) {
            return Err(CacheError::ConfigError(
                "memo_eviction_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.embedding_dimension == 0 {
            return Err(CacheError::ConfigError(
                "embedding_dimension must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the configured jitter to `ttl`, in whole seconds (at least 1).
    pub fn jittered_secs(&self, ttl: Duration) -> u64 {
        let base_secs = ttl.as_secs_f64();
        if self.ttl_jitter == 0.0 {
            return (base_secs.round() as u64).max(1);
        }

        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        ((base_secs + jitter).round() as u64).max(1)
    }
}

/// Builder for cache configuration with validation
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    search_ttl: Option<Duration>,
    frequent_ttl: Option<Duration>,
    chat_ttl: Option<Duration>,
    conversation_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    flush_scope: Option<FlushScope>,
    memo_max_entries: Option<usize>,
    memo_ttl: Option<Duration>,
    memo_eviction_fraction: Option<f64>,
    embedding_dimension: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn search_ttl(mut self, ttl: Duration) -> Self {
        self.search_ttl = Some(ttl);
        self
    }

    pub fn frequent_ttl(mut self, ttl: Duration) -> Self {
        self.frequent_ttl = Some(ttl);
        self
    }

    pub fn chat_ttl(mut self, ttl: Duration) -> Self {
        self.chat_ttl = Some(ttl);
        self
    }

    /// Set the sliding TTL of conversation records
    pub fn conversation_ttl(mut self, ttl: Duration) -> Self {
        self.conversation_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Choose what `flush_all` removes
    pub fn flush_scope(mut self, scope: FlushScope) -> Self {
        self.flush_scope = Some(scope);
        self
    }

    /// Set maximum number of memoised embeddings
    pub fn memo_max_entries(mut self, max: usize) -> Self {
        self.memo_max_entries = Some(max);
        self
    }

    pub fn memo_ttl(mut self, ttl: Duration) -> Self {
        self.memo_ttl = Some(ttl);
        self
    }

    pub fn memo_eviction_fraction(mut self, fraction: f64) -> Self {
        self.memo_eviction_fraction = Some(fraction);
        self
    }

    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = Some(dimension);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            search_ttl: self.search_ttl.unwrap_or(defaults.search_ttl),
            frequent_ttl: self.frequent_ttl.unwrap_or(defaults.frequent_ttl),
            chat_ttl: self.chat_ttl.unwrap_or(defaults.chat_ttl),
            conversation_ttl: self.conversation_ttl.unwrap_or(defaults.conversation_ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            flush_scope: self.flush_scope.unwrap_or(defaults.flush_scope),
            memo_max_entries: self.memo_max_entries.unwrap_or(defaults.memo_max_entries),
            memo_ttl: self.memo_ttl.unwrap_or(defaults.memo_ttl),
            memo_eviction_fraction: self
                .memo_eviction_fraction
                .unwrap_or(defaults.memo_eviction_fraction),
            embedding_dimension: self
                .embedding_dimension
                .unwrap_or(defaults.embedding_dimension),
        }
    }

    /// Build and validate in one step
    pub fn try_build(self) -> Result<CacheConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
