//! Integration tests for conversation persistence
//!
//! These tests verify:
//! - Save/load round trips and wholesale overwrites
//! - Index consistency across save and delete
//! - Index reconciliation from the key space
//! - Degradation when the store is unreachable or partially failing

use ouroboros_cache::kv::StoreOp;
use ouroboros_cache::{ConversationStore, InMemoryStore, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn setup() -> (Arc<InMemoryStore>, ConversationStore) {
    let store = Arc::new(InMemoryStore::new());
    let conversations = ConversationStore::new(store.clone());
    (store, conversations)
}

#[tokio::test]
async fn test_save_then_load() {
    let (_store, conversations) = setup();
    let messages = vec![json!({"role": "user", "text": "hi"})];

    assert!(conversations.save("u1", "c1", &messages).await);

    let record = conversations.load("u1", "c1").await.unwrap();
    assert_eq!(record.user_id, "u1");
    assert_eq!(record.conversation_id, "c1");
    assert_eq!(record.messages, messages);
    assert!(record.last_saved().is_some());
}

#[tokio::test]
async fn test_roundtrip_preserves_structure() {
    let (_store, conversations) = setup();
    let messages = vec![
        json!({"role": "user", "text": "오늘 날씨 어때?", "attachments": []}),
        json!({"role": "assistant", "text": "맑아요", "sources": [{"id": 3, "score": 0.82}]}),
        json!({"role": "user", "text": "thanks", "meta": {"edited": false, "n": null}}),
    ];

    conversations.save("u1", "c1", &messages).await;
    let record = conversations.load("u1", "c1").await.unwrap();
    assert_eq!(record.messages, messages);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    text: String,
}

#[tokio::test]
async fn test_typed_messages_roundtrip() {
    let (_store, conversations) = setup();
    let messages = vec![
        ChatMessage { role: "user".into(), text: "hi".into() },
        ChatMessage { role: "assistant".into(), text: "hello".into() },
    ];

    conversations.save("u1", "c1", &messages).await;
    let record = conversations.load("u1", "c1").await.unwrap();
    let decoded: Vec<ChatMessage> = assert_ok!(record.messages_as());
    assert_eq!(decoded, messages);
}

#[tokio::test]
async fn test_save_is_idempotent() {
    let (_store, conversations) = setup();
    let messages = vec![json!({"role": "user", "text": "same"})];

    assert!(conversations.save("u1", "c1", &messages).await);
    assert!(conversations.save("u1", "c1", &messages).await);

    let record = conversations.load("u1", "c1").await.unwrap();
    assert_eq!(record.messages, messages);
    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c1"]);
}

#[tokio::test]
async fn test_save_overwrites_wholesale() {
    let (_store, conversations) = setup();

    conversations
        .save("u1", "c1", &[json!("one"), json!("two"), json!("three")])
        .await;
    conversations.save("u1", "c1", &[json!("only")]).await;

    let record = conversations.load("u1", "c1").await.unwrap();
    assert_eq!(record.messages, vec![json!("only")]);
}

#[tokio::test]
async fn test_record_wire_format() {
    let (store, conversations) = setup();
    conversations.save("u1", "c1", &[json!({"role": "user", "text": "hi"})]).await;

    let raw = store.get("conversation:u1:c1").await.unwrap().unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["userId"], "u1");
    assert_eq!(value["conversationId"], "c1");
    assert_eq!(value["messages"][0]["text"], "hi");
    assert!(value["timestamp"].as_str().is_some());

    let members = store.set_members("user_conversations:u1").await.unwrap();
    assert_eq!(members, vec!["c1"]);
}

#[tokio::test]
async fn test_loads_records_written_by_older_service() {
    let (store, conversations) = setup();
    let legacy = r#"{"userId": "u9", "conversationId": "legacy", "messages": [{"role": "user", "text": "예전 대화"}], "timestamp": "2024-05-02T11:22:33.444555"}"#;
    store.set("conversation:u9:legacy", legacy).await.unwrap();

    let record = conversations.load("u9", "legacy").await.unwrap();
    assert_eq!(record.messages[0]["text"], "예전 대화");
    assert!(record.last_saved().is_some());
}

#[tokio::test]
async fn test_load_missing_is_absent() {
    let (_store, conversations) = setup();
    assert!(conversations.load("u1", "nope").await.is_none());
}

#[tokio::test]
async fn test_corrupt_or_empty_payload_is_absent() {
    let (store, conversations) = setup();

    store.set("conversation:u1:bad", "{\"userId\": ").await.unwrap();
    assert!(conversations.load("u1", "bad").await.is_none());

    store.set("conversation:u1:empty", "").await.unwrap();
    assert!(conversations.load("u1", "empty").await.is_none());

    store.set("conversation:u1:shape", "[1, 2, 3]").await.unwrap();
    assert!(conversations.load("u1", "shape").await.is_none());

    // Corrupt entries are left in place
    assert!(store.exists("conversation:u1:bad").await.unwrap());
}

#[tokio::test]
async fn test_index_consistency() {
    let (_store, conversations) = setup();

    conversations.save("u1", "c1", &[json!("a")]).await;
    conversations.save("u1", "c2", &[json!("b")]).await;
    conversations.save("u2", "c3", &[json!("c")]).await;

    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c1", "c2"]);
    assert_eq!(conversations.list_conversation_ids("u2").await, vec!["c3"]);

    assert!(conversations.delete("u1", "c1").await);
    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c2"]);
    assert!(conversations.load("u1", "c1").await.is_none());
}

#[tokio::test]
async fn test_delete_missing_still_unindexes() {
    let (store, conversations) = setup();

    // Index entry without a record
    store.set_add("user_conversations:u1", "ghost").await.unwrap();
    store.set_add("user_conversations:u1", "real").await.unwrap();

    assert!(!conversations.delete("u1", "ghost").await);
    assert_eq!(
        store.set_members("user_conversations:u1").await.unwrap(),
        vec!["real"]
    );
}

#[tokio::test]
async fn test_reconciliation_rebuilds_index() {
    let (store, conversations) = setup();

    conversations.save("u1", "c1", &[json!("a")]).await;
    conversations.save("u1", "c2", &[json!("b")]).await;
    conversations.save("u10", "other", &[json!("c")]).await;

    // Index lost, records still there
    store.delete("user_conversations:u1").await.unwrap();

    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c1", "c2"]);

    // The index is back, with its expiry
    assert_eq!(
        store.set_members("user_conversations:u1").await.unwrap(),
        vec!["c1", "c2"]
    );
    assert_eq!(
        store.ttl("user_conversations:u1").await,
        Some(Duration::from_secs(2_592_000))
    );
}

#[tokio::test]
async fn test_reconciliation_keeps_ids_containing_colons() {
    let (store, conversations) = setup();
    store.set("conversation:u1:2024:05:chat", "{}").await.unwrap();

    assert_eq!(
        conversations.list_conversation_ids("u1").await,
        vec!["2024:05:chat"]
    );
}

#[tokio::test]
async fn test_index_failure_heals_on_listing() {
    let (store, conversations) = setup();

    store.fail_operation(StoreOp::SetAdd).await;
    // The record write succeeded, so the save reports success
    assert!(conversations.save("u1", "c1", &[json!("a")]).await);
    assert!(store.set_members("user_conversations:u1").await.unwrap().is_empty());
    store.restore_operation(StoreOp::SetAdd).await;

    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c1"]);
}

#[tokio::test]
async fn test_expire_failure_keeps_record() {
    let (store, conversations) = setup();

    store.fail_operation(StoreOp::Expire).await;
    assert!(conversations.save("u1", "c1", &[json!("a")]).await);
    store.restore_operation(StoreOp::Expire).await;

    // Persisted without expiry
    assert_eq!(store.ttl("conversation:u1:c1").await, None);
    assert!(conversations.load("u1", "c1").await.is_some());
}

#[tokio::test]
async fn test_failed_primary_write_reports_false() {
    let (store, conversations) = setup();

    store.fail_operation(StoreOp::Set).await;
    assert!(!conversations.save("u1", "c1", &[json!("a")]).await);
    assert!(store.set_members("user_conversations:u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_store_degrades() {
    let (store, conversations) = setup();
    conversations.save("u1", "c1", &[json!("a")]).await;

    store.set_available(false);

    assert!(!conversations.is_connected().await);
    assert!(!conversations.save("u1", "c2", &[json!("b")]).await);
    assert!(conversations.load("u1", "c1").await.is_none());
    assert!(conversations.list_conversation_ids("u1").await.is_empty());
    assert!(!conversations.delete("u1", "c1").await);
    assert!(!conversations.clear_all("u1").await);

    let err = assert_err!(conversations.try_list_conversation_ids("u1").await);
    assert!(err.is_connectivity());

    // Nothing was lost or written while down
    store.set_available(true);
    assert_eq!(conversations.list_conversation_ids("u1").await, vec!["c1"]);
}

#[tokio::test]
async fn test_try_list_distinguishes_empty_from_unreachable() {
    let (_store, conversations) = setup();
    let ids = assert_ok!(conversations.try_list_conversation_ids("nobody").await);
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_clear_all() {
    let (store, conversations) = setup();

    conversations.save("u1", "c1", &[json!("a")]).await;
    conversations.save("u1", "c2", &[json!("b")]).await;
    conversations.save("u2", "c1", &[json!("c")]).await;

    assert!(conversations.clear_all("u1").await);
    assert!(conversations.list_conversation_ids("u1").await.is_empty());
    assert!(!store.exists("conversation:u1:c1").await.unwrap());
    assert!(!store.exists("user_conversations:u1").await.unwrap());

    // Other users are untouched
    assert!(conversations.load("u2", "c1").await.is_some());
}

#[tokio::test]
async fn test_clear_all_tolerates_delete_failures() {
    let (store, conversations) = setup();
    conversations.save("u1", "c1", &[json!("a")]).await;

    store.fail_operation(StoreOp::Delete).await;
    assert!(conversations.clear_all("u1").await);
}
