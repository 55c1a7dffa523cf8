//! # Ouroboros Cache (ouroboros-cache)
//!
//! Conversation persistence and two-tier caching for LLM workloads, backed by
//! Redis.
//!
//! ## Features
//!
//! - Conversation history per user with a sliding 30-day expiry and a
//!   self-healing per-user index
//! - Namespaced JSON cache with content-addressed keys and per-entry TTLs
//! - In-process embedding memo that batches every miss into one model call
//! - Usage statistics and health checks for the backing store
//! - Graceful degradation: an unreachable store never fails the caller
//!
//! Every component takes its store as an injected `Arc<dyn KeyValueStore>`,
//! so the same code runs against [`RedisStore`] or the [`InMemoryStore`].
//!
//! ## Conversations
//!
//! ```no_run
//! use ouroboros_cache::{ConversationStore, RedisConfig, RedisStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(RedisStore::connect(RedisConfig::from_env()?).await?);
//!     let conversations = ConversationStore::new(store);
//!
//!     conversations
//!         .save("u1", "c1", &[json!({"role": "user", "text": "hi"})])
//!         .await;
//!
//!     for id in conversations.list_conversation_ids("u1").await {
//!         println!("conversation: {}", id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Response Caching
//!
//! ```no_run
//! use ouroboros_cache::{NamespacedCache, RedisConfig, RedisStore, ResponseCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(RedisStore::connect(RedisConfig::default()).await?);
//!     let responses = ResponseCache::new(NamespacedCache::with_defaults(store));
//!
//!     if let Some(answer) = responses.get_cached_llm_response("What is Rust?").await {
//!         println!("cached: {}", answer);
//!     } else {
//!         responses.cache_llm_response("What is Rust?", "A language.").await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Statistics and Health
//!
//! ```no_run
//! use ouroboros_cache::{NamespacedCache, RedisConfig, RedisStore, StatsReporter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(RedisStore::connect(RedisConfig::default()).await?);
//!     let cache = NamespacedCache::with_defaults(store);
//!     let reporter = StatsReporter::new(&cache);
//!
//!     let health = reporter.health_check().await;
//!     println!("Status: {:?} ({}ms)", health.status, health.response_time_ms);
//!
//!     let stats = reporter.get_stats().await?;
//!     println!("{} keys, hit rate {:.2}", stats.total_keys, stats.hit_rate);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod connection;
pub mod embedding;
pub mod error;
pub mod kv;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use cache::{
    generate_key, CacheConfig, CacheConfigBuilder, CachePrefix, CacheStats, FlushScope,
    NamespacedCache, ResponseCache,
};
pub use connection::{RedisConfig, RedisStore};
pub use embedding::{EmbedInput, EmbedOutput, EmbeddingMemoCache, EmbeddingProvider, MemoStats};
pub use error::{CacheError, Result};
pub use kv::{InMemoryStore, KeyValueStore, ServerInfo, StoreOp};
pub use session::{ConversationRecord, ConversationStore};
pub use stats::{CacheReport, HealthCheckResult, HealthStatus, StatsReporter};
