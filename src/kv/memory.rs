//! In-process implementation of [`KeyValueStore`]
//!
//! Mirrors the Redis semantics the caches rely on (SET clears expiry, EXPIRE
//! on a missing key is a no-op, set operations on string keys fail) and adds
//! two knobs for exercising degraded paths:
//! - [`InMemoryStore::set_available`] makes every call fail as if the server
//!   were unreachable
//! - [`InMemoryStore::fail_operation`] makes one kind of call fail

use crate::error::{CacheError, Result};
use crate::kv::{human_bytes, KeyValueStore, ServerInfo};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Store operation kinds, used for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Ping,
    Get,
    Set,
    Delete,
    Exists,
    Expire,
    Scan,
    SetAdd,
    SetRemove,
    SetMembers,
    Flush,
    Info,
}

enum StoredValue {
    Text(String),
    Members(BTreeSet<String>),
}

struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }

    fn size_bytes(&self) -> usize {
        match &self.value {
            StoredValue::Text(s) => s.len(),
            StoredValue::Members(m) => m.iter().map(String::len).sum(),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    slots: HashMap<String, Slot>,
    failing: HashSet<StoreOp>,
}

impl MemoryState {
    /// Look up a key, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Slot> {
        let now = Instant::now();
        if self.slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| !slot.is_expired(now));
    }
}

/// Key-value store held in process memory
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    available: AtomicBool,
    started_at: Instant,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
            started_at: Instant::now(),
        }
    }

    /// Simulate the server going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        debug!("In-memory store availability set to {}", available);
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every call of the given kind fail with a connection error.
    pub async fn fail_operation(&self, op: StoreOp) {
        self.state.lock().await.failing.insert(op);
    }

    /// Undo [`fail_operation`](Self::fail_operation).
    pub async fn restore_operation(&self, op: StoreOp) {
        self.state.lock().await.failing.remove(&op);
    }

    /// Remaining time to live of a key rounded to whole seconds, like the
    /// `TTL` command. `None` if the key is missing or has no expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let expires_at = state.live(key)?.expires_at?;
        let remaining = expires_at.saturating_duration_since(Instant::now());
        Some(Duration::from_secs(((remaining.as_millis() + 500) / 1000) as u64))
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        state.purge_expired();
        state.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Acquire the state after checking availability and injected faults.
    async fn enter(&self, op: StoreOp) -> Result<tokio::sync::MutexGuard<'_, MemoryState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError(
                "in-memory store is unavailable".to_string(),
            ));
        }
        let state = self.state.lock().await;
        if state.failing.contains(&op) {
            return Err(CacheError::ConnectionError(format!(
                "injected failure for {:?}",
                op
            )));
        }
        Ok(state)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Other(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.enter(StoreOp::Ping).await.map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.enter(StoreOp::Get).await?;
        match state.live(key) {
            Some(Slot {
                value: StoredValue::Text(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.enter(StoreOp::Set).await?;
        state.slots.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            return Err(CacheError::Other(
                "invalid expire time in 'setex' command".to_string(),
            ));
        }
        let mut state = self.enter(StoreOp::Set).await?;
        state.slots.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Text(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.enter(StoreOp::Delete).await?;
        let existed = state.live(key).is_some();
        state.slots.remove(key);
        Ok(existed)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut state = self.enter(StoreOp::Delete).await?;
        let mut removed = 0;
        for key in keys {
            if state.live(key).is_some() {
                state.slots.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut state = self.enter(StoreOp::Exists).await?;
        Ok(state.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let mut state = self.enter(StoreOp::Expire).await?;
        match state.live(key) {
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut state = self.enter(StoreOp::Scan).await?;
        state.purge_expired();
        let pattern: Vec<char> = pattern.chars().collect();
        let mut keys: Vec<String> = state
            .slots
            .keys()
            .filter(|key| glob_match(&pattern, &key.chars().collect::<Vec<_>>()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.enter(StoreOp::SetAdd).await?;
        match state.live(key) {
            Some(Slot {
                value: StoredValue::Members(members),
                ..
            }) => Ok(members.insert(member.to_string())),
            Some(_) => Err(wrong_type(key)),
            None => {
                let mut members = BTreeSet::new();
                members.insert(member.to_string());
                state.slots.insert(
                    key.to_string(),
                    Slot {
                        value: StoredValue::Members(members),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.enter(StoreOp::SetRemove).await?;
        let (removed, now_empty) = match state.live(key) {
            Some(Slot {
                value: StoredValue::Members(members),
                ..
            }) => (members.remove(member), members.is_empty()),
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(false),
        };
        // Redis deletes a set once its last member is gone
        if now_empty {
            state.slots.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut state = self.enter(StoreOp::SetMembers).await?;
        match state.live(key) {
            Some(Slot {
                value: StoredValue::Members(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn flush_database(&self) -> Result<()> {
        let mut state = self.enter(StoreOp::Flush).await?;
        state.slots.clear();
        Ok(())
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let mut state = self.enter(StoreOp::Info).await?;
        state.purge_expired();
        let used_memory_bytes: u64 = state
            .slots
            .iter()
            .map(|(key, slot)| (key.len() + slot.size_bytes()) as u64)
            .sum();

        Ok(ServerInfo {
            total_keys: state.slots.len() as u64,
            used_memory_bytes,
            used_memory_human: human_bytes(used_memory_bytes),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            total_connections: 1,
            connected_clients: 1,
        })
    }
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[a-z]`, `[^a]` and `\` escapes.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => (0..=text.len()).any(|i| glob_match(&pattern[1..], &text[i..])),
        Some('?') => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        Some('[') => {
            let Some(&c) = text.first() else {
                return false;
            };
            match match_class(&pattern[1..], c) {
                Some((matched, rest)) => matched && glob_match(rest, &text[1..]),
                // Unterminated class: treat '[' literally
                None => c == '[' && glob_match(&pattern[1..], &text[1..]),
            }
        }
        Some('\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && glob_match(&pattern[2..], &text[1..])
        }
        Some(p) => text.first() == Some(p) && glob_match(&pattern[1..], &text[1..]),
    }
}

/// Match `c` against a character class whose opening `[` was already
/// consumed. Returns the outcome and the pattern after the closing `]`.
fn match_class(pattern: &[char], c: char) -> Option<(bool, &[char])> {
    let negate = pattern.first() == Some(&'^');
    let mut i = usize::from(negate);
    let mut matched = false;

    while i < pattern.len() {
        match pattern[i] {
            ']' => return Some((matched != negate, &pattern[i + 1..])),
            '\\' if i + 1 < pattern.len() => {
                matched |= pattern[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' => {
                let hi = pattern[i + 2];
                matched |= lo <= c && c <= hi;
                i += 3;
            }
            other => {
                matched |= other == c;
                i += 1;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        let p: Vec<char> = pattern.chars().collect();
        let t: Vec<char> = text.chars().collect();
        glob_match(&p, &t)
    }

    #[test]
    fn test_glob_match() {
        assert!(matches("conversation:u1:*", "conversation:u1:c1"));
        assert!(matches("conversation:u1:*", "conversation:u1:"));
        assert!(!matches("conversation:u1:*", "conversation:u10"));
        assert!(matches("chat:?", "chat:a"));
        assert!(!matches("chat:?", "chat:ab"));
        assert!(matches("h[ae]llo", "hallo"));
        assert!(!matches("h[^e]llo", "hello"));
        assert!(matches("k[0-9]", "k7"));
        assert!(matches("a\\*b", "a*b"));
        assert!(!matches("a\\*b", "axb"));
    }

    #[tokio::test]
    async fn test_string_roundtrip_and_delete() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.ttl("k").await.is_none());

        assert!(store.expire("k", 60).await.unwrap());
        let ttl = store.ttl("k").await.unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(58));

        // SET drops an existing expiry
        store.set("k", "v2").await.unwrap();
        assert!(store.ttl("k").await.is_none());

        assert!(!store.expire("missing", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = InMemoryStore::new();
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert!(store.set_add("s", "b").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a", "b"]);

        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_remove("s", "a").await.unwrap());
        assert!(store.set_remove("s", "b").await.unwrap());
        assert!(!store.exists("s").await.unwrap());
        assert!(store.set_members("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.set_add("k", "m").await.is_err());

        store.set_add("s", "m").await.unwrap();
        assert!(store.get("s").await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();

        store.set_available(false);
        assert!(!store.is_connected().await);
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_connectivity());

        store.set_available(true);
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryStore::new();
        store.fail_operation(StoreOp::Expire).await;
        store.set("k", "v").await.unwrap();
        assert!(store.expire("k", 10).await.is_err());

        store.restore_operation(StoreOp::Expire).await;
        assert!(store.expire("k", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_matching_and_info() {
        let store = InMemoryStore::new();
        store.set("chat:1", "a").await.unwrap();
        store.set("chat:2", "b").await.unwrap();
        store.set("search:1", "c").await.unwrap();

        let keys = store.keys_matching("chat:*").await.unwrap();
        assert_eq!(keys, vec!["chat:1", "chat:2"]);

        let info = store.server_info().await.unwrap();
        assert_eq!(info.total_keys, 3);
        assert!(info.used_memory_bytes > 0);

        store.flush_database().await.unwrap();
        assert!(store.is_empty().await);
    }
}
