//! Session and Cache Demo Application
//!
//! Walks through conversation persistence, response caching and the
//! embedding memo. Falls back to the in-memory store when Redis is not
//! reachable.
//!
//! Usage:
//!   cargo run --example session_cache_demo
//!
//! Environment variables: see health_check_demo.

use async_trait::async_trait;
use ouroboros_cache::{
    CacheConfig, ConversationStore, EmbeddingMemoCache, EmbeddingProvider, InMemoryStore,
    KeyValueStore, NamespacedCache, RedisConfig, RedisStore, ResponseCache, StatsReporter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    text: String,
}

/// Stand-in for a real embedding model
struct LengthEmbedder {
    dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> ouroboros_cache::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dimension];
                v[0] = t.chars().count() as f32;
                v
            })
            .collect())
    }
}

async fn open_store() -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let config = RedisConfig::from_env()?;
    match RedisStore::connect(config).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) => {
            warn!("Redis unavailable ({}), using in-memory store", e);
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Session and Cache Demo ===");

    let store = open_store().await?;
    let config = CacheConfig::builder().embedding_dimension(16).build();

    info!("\n--- Conversations ---");
    let conversations = ConversationStore::from_config(store.clone(), &config);
    let user_id = format!("demo-{}", Uuid::new_v4());
    let conversation_id = Uuid::new_v4().to_string();

    let messages = vec![
        Message { role: "user".into(), text: "What is ownership?".into() },
        Message { role: "assistant".into(), text: "Each value has a single owner.".into() },
    ];
    let saved = conversations.save(&user_id, &conversation_id, &messages).await;
    info!("Saved conversation {}: {}", conversation_id, saved);

    if let Some(record) = conversations.load(&user_id, &conversation_id).await {
        let loaded: Vec<Message> = record.messages_as()?;
        info!("Loaded {} messages, saved at {}", loaded.len(), record.timestamp);
    }
    info!(
        "Conversations of {}: {:?}",
        user_id,
        conversations.list_conversation_ids(&user_id).await
    );

    info!("\n--- Response Cache ---");
    let cache = NamespacedCache::new(store.clone(), config.clone());
    let responses = ResponseCache::new(cache.clone());
    let question = "What is ownership?";
    match responses.get_cached_llm_response(question).await {
        Some(answer) => info!("Cached answer: {}", answer),
        None => {
            info!("Cache miss, storing answer");
            responses
                .cache_llm_response(question, "Each value has a single owner.")
                .await;
        }
    }
    info!("Second lookup: {:?}", responses.get_cached_llm_response(question).await);

    info!("\n--- Embedding Memo ---");
    let memo = Arc::new(EmbeddingMemoCache::new(
        Arc::new(LengthEmbedder { dimension: 16 }),
        &config,
    ));
    memo.embed_batch(&["borrow", "move", "borrow", ""]).await?;
    memo.embed_batch(&["move", "lifetime"]).await?;
    let memo_stats = memo.stats().await;
    info!(
        "Memo: {} entries, {} provider calls, hit rate {:.2}",
        memo_stats.entries,
        memo_stats.provider_calls,
        memo_stats.hit_rate()
    );

    info!("\n--- Statistics ---");
    let reporter = StatsReporter::new(&cache).with_memo(memo);
    let report = reporter.get_stats().await?;
    info!("Report:\n{}", serde_json::to_string_pretty(&report)?);

    // Leave nothing behind on a shared server
    conversations.clear_all(&user_id).await;
    cache
        .delete(&cache.generate_key("chat", &serde_json::json!(question)))
        .await;

    info!("\n=== Demo Complete ===");

    Ok(())
}
