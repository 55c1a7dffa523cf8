//! Cache invalidation scopes
//!
//! Entries normally leave the store through their TTL. Explicit invalidation
//! is either by key, by glob pattern, or a bulk flush whose reach is set by
//! [`FlushScope`].

use crate::cache::types::CachePrefix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a bulk flush removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushScope {
    /// Only keys under the cache's own prefixes (`search:*`, `chat:*`, ...).
    /// Conversations and foreign keys survive.
    #[default]
    OwnedPrefixes,

    /// The whole selected database (FLUSHDB), conversations included
    Database,
}

impl FlushScope {
    /// Glob patterns covered by this scope. `Database` covers everything and
    /// is flushed in one command, so it has no patterns.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            FlushScope::OwnedPrefixes => CachePrefix::ALL.iter().map(|p| p.pattern()).collect(),
            FlushScope::Database => Vec::new(),
        }
    }
}

impl fmt::Display for FlushScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushScope::OwnedPrefixes => write!(f, "owned prefixes"),
            FlushScope::Database => write!(f, "entire database"),
        }
    }
}

/// Outcome of a bulk invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlushReport {
    /// Keys removed. Not reported for a database flush.
    pub removed: u64,

    /// Patterns that could not be processed
    pub failed_patterns: usize,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed_patterns == 0
    }
}
