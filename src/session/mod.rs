//! Conversation persistence
//!
//! [`ConversationStore`] keeps the full message history of each
//! (user, conversation) pair in the key-value store, with a per-user index
//! of conversation ids.
//!
//! ```no_run
//! use ouroboros_cache::{ConversationStore, RedisConfig, RedisStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(RedisStore::connect(RedisConfig::default()).await?);
//! let conversations = ConversationStore::new(store);
//!
//! conversations
//!     .save("u1", "c1", &[json!({"role": "user", "text": "hi"})])
//!     .await;
//! if let Some(record) = conversations.load("u1", "c1").await {
//!     println!("{} messages", record.messages.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod record;
pub mod store;

pub use record::ConversationRecord;
pub use store::{index_key, record_key, ConversationStore};
