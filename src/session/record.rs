//! Persisted conversation snapshot

use crate::error::{CacheError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// One saved conversation, overwritten wholesale on every save.
///
/// Serialized as
/// `{"userId": .., "conversationId": .., "messages": [..], "timestamp": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub user_id: String,

    pub conversation_id: String,

    /// Messages in conversation order, stored as given by the caller
    #[serde(default)]
    pub messages: Vec<Value>,

    /// ISO-8601 time of the save
    pub timestamp: String,
}

impl ConversationRecord {
    /// Snapshot `messages` now
    pub fn new<M: Serialize>(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        messages: &[M],
    ) -> Result<Self> {
        let messages = messages
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            messages,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    /// Time of the save.
    ///
    /// Accepts RFC 3339 and the offset-less form older writers produced,
    /// which is read as UTC. `None` if the timestamp is unreadable.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Decode the messages into a concrete type
    pub fn messages_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.messages
            .iter()
            .map(|m| serde_json::from_value(m.clone()).map_err(CacheError::from))
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Message {
        role: String,
        text: String,
    }

    #[test]
    fn test_wire_shape() {
        let record = ConversationRecord::new("u1", "c1", &[json!({"role": "user", "text": "hi"})])
            .unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["userId"], "u1");
        assert_eq!(value["conversationId"], "c1");
        assert_eq!(value["messages"], json!([{"role": "user", "text": "hi"}]));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_reads_legacy_payload() {
        let raw = r#"{"userId": "u1", "conversationId": "c1",
                      "messages": [{"role": "assistant", "text": "안녕하세요"}],
                      "timestamp": "2024-03-01T09:15:30.123456"}"#;
        let record: ConversationRecord = serde_json::from_str(raw).unwrap();

        let saved = record.last_saved().unwrap();
        assert_eq!(saved.to_rfc3339(), "2024-03-01T09:15:30.123456+00:00");
        assert_eq!(record.message_count(), 1);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let record = ConversationRecord::new::<Value>("u1", "c1", &[]).unwrap();
        let saved = record.last_saved().unwrap();
        assert!((Utc::now() - saved).num_seconds() < 5);

        let odd = ConversationRecord {
            timestamp: "yesterday".to_string(),
            ..record
        };
        assert!(odd.last_saved().is_none());
    }

    #[test]
    fn test_typed_messages() {
        let messages = vec![
            Message { role: "user".into(), text: "hi".into() },
            Message { role: "assistant".into(), text: "hello".into() },
        ];
        let record = ConversationRecord::new("u1", "c1", &messages).unwrap();

        let decoded: Vec<Message> = record.messages_as().unwrap();
        assert_eq!(decoded, messages);
        assert!(record.messages_as::<u32>().is_err());
    }
}
