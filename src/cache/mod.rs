//! # Namespaced Response Cache
//!
//! JSON values cached in the key-value store under content-addressed keys.
//!
//! ## Features
//!
//! - **Deterministic keys**: `{prefix}:{md5}` over a canonical JSON rendering,
//!   compatible with keys written by earlier services
//! - **TTL-Based Expiration**: every entry is written with its TTL in one call
//! - **Graceful degradation**: store failures become misses and `false`
//! - **Scoped invalidation**: by key, by pattern, or a prefix-scoped flush
//! - **Hit/miss accounting** for the stats reporter
//!
//! ## Example
//!
//! ```no_run
//! use ouroboros_cache::cache::{CacheConfig, CachePrefix, NamespacedCache};
//! use ouroboros_cache::{RedisConfig, RedisStore};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(RedisStore::connect(RedisConfig::default()).await?);
//! let cache = NamespacedCache::new(store, CacheConfig::default());
//!
//! let key = cache.generate_key(CachePrefix::Search.as_str(), &json!({"q": "rust"}));
//! cache.set(&key, &json!(["doc-1", "doc-2"]), Duration::from_secs(1800)).await;
//!
//! if let Some(docs) = cache.get::<Vec<String>>(&key).await {
//!     println!("Cache hit: {:?}", docs);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod integration;
pub mod invalidation;
pub mod key;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use integration::ResponseCache;
pub use invalidation::{FlushReport, FlushScope};
pub use key::{canonical_json, content_digest, generate_key};
pub use store::NamespacedCache;
pub use types::{CacheCounters, CachePrefix, CacheStats};
