//! Typed caches for LLM responses and retrieval results
//!
//! Thin wrappers over [`NamespacedCache`] that pick the prefix, key payload
//! and TTL for each kind of result:
//! - LLM responses: `chat:` keyed by the prompt text
//! - search results: `search:` keyed by the query text
//! - vector search results: `vector:` keyed by the query text

use crate::cache::{store::NamespacedCache, types::CachePrefix};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

/// Result caches for the chat pipeline
#[derive(Clone)]
pub struct ResponseCache {
    cache: NamespacedCache,
}

impl ResponseCache {
    pub fn new(cache: NamespacedCache) -> Self {
        Self { cache }
    }

    /// The underlying cache
    pub fn inner(&self) -> &NamespacedCache {
        &self.cache
    }

    fn key(&self, prefix: CachePrefix, text: &str) -> String {
        self.cache
            .generate_key(prefix.as_str(), &Value::String(text.to_string()))
    }

    /// Cache an LLM response for `prompt`.
    ///
    /// Empty prompts and empty responses are never cached.
    pub async fn cache_llm_response(&self, prompt: &str, response: &str) -> bool {
        if prompt.is_empty() || response.is_empty() {
            debug!("Skipping LLM response cache for empty prompt or response");
            return false;
        }
        let key = self.key(CachePrefix::Chat, prompt);
        self.cache
            .set(&key, response, self.cache.config().chat_ttl)
            .await
    }

    /// Previously cached LLM response for `prompt`
    pub async fn get_cached_llm_response(&self, prompt: &str) -> Option<String> {
        if prompt.is_empty() {
            return None;
        }
        let key = self.key(CachePrefix::Chat, prompt);
        self.cache.get(&key).await
    }

    /// Cache search results for `query`
    pub async fn cache_search_results<T>(&self, query: &str, results: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        if query.is_empty() {
            return false;
        }
        let key = self.key(CachePrefix::Search, query);
        self.cache
            .set(&key, results, self.cache.config().search_ttl)
            .await
    }

    pub async fn get_cached_search_results<T: DeserializeOwned>(&self, query: &str) -> Option<T> {
        if query.is_empty() {
            return None;
        }
        let key = self.key(CachePrefix::Search, query);
        self.cache.get(&key).await
    }

    /// Cache vector search results for `query`. These are reused often and
    /// get the long TTL.
    pub async fn cache_vector_results<T>(&self, query: &str, results: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        if query.is_empty() {
            return false;
        }
        let key = self.key(CachePrefix::Vector, query);
        self.cache
            .set(&key, results, self.cache.config().frequent_ttl)
            .await
    }

    pub async fn get_cached_vector_results<T: DeserializeOwned>(&self, query: &str) -> Option<T> {
        if query.is_empty() {
            return None;
        }
        let key = self.key(CachePrefix::Vector, query);
        self.cache.get(&key).await
    }
}
