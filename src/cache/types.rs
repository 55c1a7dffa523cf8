//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Key namespaces owned by the cache. Every generated key starts with one of
/// these followed by `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePrefix {
    /// Search results
    Search,

    /// LLM chat responses
    Chat,

    /// Vector search results
    Vector,

    /// Conversation snapshots
    Conversation,

    /// User settings
    Settings,

    /// Source attributions
    Source,

    /// Statistics
    Stats,

    /// User feedback
    Feedback,
}

impl CachePrefix {
    /// Every prefix, in a stable order.
    pub const ALL: [CachePrefix; 8] = [
        CachePrefix::Search,
        CachePrefix::Chat,
        CachePrefix::Vector,
        CachePrefix::Conversation,
        CachePrefix::Settings,
        CachePrefix::Source,
        CachePrefix::Stats,
        CachePrefix::Feedback,
    ];

    /// Wire form of the prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePrefix::Search => "search",
            CachePrefix::Chat => "chat",
            CachePrefix::Vector => "vector",
            CachePrefix::Conversation => "conv",
            CachePrefix::Settings => "settings",
            CachePrefix::Source => "source",
            CachePrefix::Stats => "stats",
            CachePrefix::Feedback => "feedback",
        }
    }

    /// Glob pattern matching every key in this namespace
    pub fn pattern(&self) -> String {
        format!("{}:*", self.as_str())
    }
}

impl fmt::Display for CachePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hit/miss counters shared between a cache and its reporters.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Hit/miss statistics of a [`NamespacedCache`](crate::cache::NamespacedCache)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a value
    pub hits: u64,

    /// Lookups that returned nothing, including failed ones
    pub misses: u64,
}

impl CacheStats {
    /// Total number of lookups
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups that hit, in `[0, 1]`. Zero when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}% }}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_wire_names() {
        let names: Vec<&str> = CachePrefix::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["search", "chat", "vector", "conv", "settings", "source", "stats", "feedback"]
        );
        assert_eq!(CachePrefix::Conversation.to_string(), "conv");
        assert_eq!(CachePrefix::Chat.pattern(), "chat:*");
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats { hits: 80, misses: 20 };

        assert_eq!(stats.total_requests(), 100);
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_counters() {
        let counters = CacheCounters::default();
        counters.record_hit();
        counters.record_miss();
        counters.record_miss();

        let stats = counters.snapshot();
        assert_eq!(stats, CacheStats { hits: 1, misses: 2 });

        counters.reset();
        assert_eq!(counters.snapshot(), CacheStats::default());
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats { hits: 3, misses: 1 };
        let display = format!("{}", stats);
        assert!(display.contains("hits: 3"));
        assert!(display.contains("hit_rate: 75.00%"));
    }
}
