//! Conversation persistence over a [`KeyValueStore`]

use crate::cache::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::kv::{escape_pattern, KeyValueStore};
use crate::session::record::ConversationRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Characters of a corrupt payload echoed to the log
const PREVIEW_CHARS: usize = 100;

/// Key of one conversation record
pub fn record_key(user_id: &str, conversation_id: &str) -> String {
    format!("conversation:{}:{}", user_id, conversation_id)
}

/// Key of a user's conversation id set
pub fn index_key(user_id: &str) -> String {
    format!("user_conversations:{}", user_id)
}

/// Per-user conversation history with a sliding 30-day expiry.
///
/// Records live at `conversation:{user}:{conversation}`; the ids of a user's
/// conversations are indexed in the set `user_conversations:{user}`. The index
/// is rebuilt from a key scan whenever it is found empty, so a save that wrote
/// the record but not the index heals on the next listing.
///
/// No method fails: an unreachable store turns saves into `false`, loads into
/// `None` and listings into an empty vector.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
    ttl_secs: u64,
}

impl ConversationStore {
    /// Store with the default 30-day TTL
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, CacheConfig::default().conversation_ttl)
    }

    /// Store using the conversation TTL of `config`
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self::with_ttl(store, config.conversation_ttl)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl_secs: ttl.as_secs().max(1),
        }
    }

    /// Liveness of the backing store
    pub async fn is_connected(&self) -> bool {
        self.store.is_connected().await
    }

    /// Persist the full message list of a conversation.
    ///
    /// Returns true iff the record itself was written. The expiry and the
    /// index update are best effort; their failures are only logged.
    pub async fn save<M>(&self, user_id: &str, conversation_id: &str, messages: &[M]) -> bool
    where
        M: Serialize + Sync,
    {
        if !self.store.is_connected().await {
            warn!("Store unreachable, conversation not saved: {}:{}", user_id, conversation_id);
            return false;
        }

        let key = record_key(user_id, conversation_id);
        let payload = match ConversationRecord::new(user_id, conversation_id, messages)
            .and_then(|record| serde_json::to_string(&record).map_err(CacheError::from))
        {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode conversation {}: {}", key, e);
                return false;
            }
        };

        info!("Saving conversation {} ({} messages)", key, messages.len());

        if let Err(e) = self.store.set(&key, &payload).await {
            error!("Failed to save conversation {}: {}", key, e);
            return false;
        }

        match self.store.expire(&key, self.ttl_secs).await {
            Ok(true) => {}
            Ok(false) => warn!("Conversation {} vanished before its expiry was set", key),
            Err(e) => warn!("Conversation {} saved without expiry: {}", key, e),
        }

        self.index(user_id, conversation_id).await;
        true
    }

    async fn index(&self, user_id: &str, conversation_id: &str) {
        let index = index_key(user_id);
        if let Err(e) = self.store.set_add(&index, conversation_id).await {
            warn!("Failed to index conversation {} for {}: {}", conversation_id, user_id, e);
            return;
        }
        if let Err(e) = self.store.expire(&index, self.ttl_secs).await {
            warn!("Failed to refresh expiry of {}: {}", index, e);
        }
    }

    /// Load a conversation and extend its expiry.
    ///
    /// `None` if it does not exist, if the payload is empty or corrupt, or if
    /// the store is unreachable.
    pub async fn load(&self, user_id: &str, conversation_id: &str) -> Option<ConversationRecord> {
        if !self.store.is_connected().await {
            warn!("Store unreachable, conversation not loaded: {}:{}", user_id, conversation_id);
            return None;
        }

        let key = record_key(user_id, conversation_id);
        match self.store.exists(&key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Conversation not found: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to check conversation {}: {}", key, e);
                return None;
            }
        }

        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                warn!("Conversation {} exists but holds no data", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to load conversation {}: {}", key, e);
                return None;
            }
        };

        let record: ConversationRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                error!("Corrupt conversation payload at {}: {}", key, e);
                error!("Payload preview: {}...", preview(&raw));
                return None;
            }
        };

        if let Err(e) = self.store.expire(&key, self.ttl_secs).await {
            warn!("Failed to extend expiry of {}: {}", key, e);
        }

        debug!("Loaded conversation {} ({} messages)", key, record.message_count());
        Some(record)
    }

    /// Ids of all conversations of a user.
    ///
    /// Empty both when the user has none and when the store is unreachable;
    /// use [`try_list_conversation_ids`](Self::try_list_conversation_ids) to
    /// tell the two apart.
    pub async fn list_conversation_ids(&self, user_id: &str) -> Vec<String> {
        match self.try_list_conversation_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list conversations of {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Ids of all conversations of a user, or the store failure.
    ///
    /// Reads the index set. If it is empty, the record keys are scanned, the
    /// index is rebuilt from them and the rebuilt list is returned. Ids are
    /// sorted.
    pub async fn try_list_conversation_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.store.ping().await?;

        let index = index_key(user_id);
        let mut ids = self.store.set_members(&index).await?;
        if !ids.is_empty() {
            ids.sort();
            return Ok(ids);
        }

        debug!("Conversation index of {} is empty, scanning record keys", user_id);
        let prefix = record_key(user_id, "");
        let pattern = format!("{}*", escape_pattern(&prefix));
        let keys = self.store.keys_matching(&pattern).await?;

        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            debug!("No conversations for {}", user_id);
            return Ok(ids);
        }

        for id in &ids {
            if let Err(e) = self.store.set_add(&index, id).await {
                warn!("Failed to restore {} into {}: {}", id, index, e);
            }
        }
        if let Err(e) = self.store.expire(&index, self.ttl_secs).await {
            warn!("Failed to refresh expiry of {}: {}", index, e);
        }
        info!("Rebuilt conversation index of {} with {} ids", user_id, ids.len());

        Ok(ids)
    }

    /// Delete one conversation and drop it from the index.
    ///
    /// True iff the record existed and was deleted.
    pub async fn delete(&self, user_id: &str, conversation_id: &str) -> bool {
        if !self.store.is_connected().await {
            warn!("Store unreachable, conversation not deleted: {}:{}", user_id, conversation_id);
            return false;
        }

        let key = record_key(user_id, conversation_id);
        let deleted = match self.store.delete(&key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete conversation {}: {}", key, e);
                false
            }
        };

        if let Err(e) = self.store.set_remove(&index_key(user_id), conversation_id).await {
            warn!("Failed to unindex conversation {} of {}: {}", conversation_id, user_id, e);
        }

        deleted
    }

    /// Delete every conversation of a user along with the index.
    ///
    /// Individual deletion failures are logged and do not change the result;
    /// false only when the store is unreachable up front.
    pub async fn clear_all(&self, user_id: &str) -> bool {
        if !self.store.is_connected().await {
            warn!("Store unreachable, conversations of {} not cleared", user_id);
            return false;
        }

        let ids = self.list_conversation_ids(user_id).await;
        for id in &ids {
            let key = record_key(user_id, id);
            if let Err(e) = self.store.delete(&key).await {
                warn!("Failed to delete conversation {}: {}", key, e);
            }
        }

        if let Err(e) = self.store.delete(&index_key(user_id)).await {
            warn!("Failed to delete conversation index of {}: {}", user_id, e);
        }

        info!("Cleared {} conversations of {}", ids.len(), user_id);
        true
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use serde_json::json;

    #[test]
    fn test_keys() {
        assert_eq!(record_key("u1", "c1"), "conversation:u1:c1");
        assert_eq!(index_key("u1"), "user_conversations:u1");
    }

    #[test]
    fn test_preview_is_char_bounded() {
        let raw = "가".repeat(150);
        assert_eq!(preview(&raw).chars().count(), 100);
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn test_save_sets_ttls() {
        let store = Arc::new(InMemoryStore::new());
        let conversations = ConversationStore::new(store.clone());

        assert!(conversations.save("u1", "c1", &[json!({"role": "user", "text": "hi"})]).await);

        let month = Duration::from_secs(2_592_000);
        assert_eq!(store.ttl("conversation:u1:c1").await, Some(month));
        assert_eq!(store.ttl("user_conversations:u1").await, Some(month));
    }

    #[tokio::test]
    async fn test_load_refreshes_ttl() {
        let store = Arc::new(InMemoryStore::new());
        let conversations = ConversationStore::new(store.clone());
        conversations.save("u1", "c1", &[json!("hi")]).await;

        store.expire("conversation:u1:c1", 10).await.unwrap();
        assert!(conversations.load("u1", "c1").await.is_some());
        assert_eq!(
            store.ttl("conversation:u1:c1").await,
            Some(Duration::from_secs(2_592_000))
        );
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let store = Arc::new(InMemoryStore::new());
        let config = CacheConfig::builder()
            .conversation_ttl(Duration::from_secs(600))
            .build();
        let conversations = ConversationStore::from_config(store.clone(), &config);

        conversations.save("u1", "c1", &[json!("hi")]).await;
        assert_eq!(
            store.ttl("conversation:u1:c1").await,
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn test_glob_characters_in_user_id() {
        let store = Arc::new(InMemoryStore::new());
        let conversations = ConversationStore::new(store.clone());
        conversations.save("a*", "c1", &[json!("x")]).await;
        conversations.save("ab", "c2", &[json!("y")]).await;

        store.delete("user_conversations:a*").await.unwrap();
        assert_eq!(conversations.list_conversation_ids("a*").await, vec!["c1"]);
    }
}
