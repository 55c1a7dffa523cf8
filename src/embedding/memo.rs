//! Bounded in-process memo for embedding vectors

use crate::cache::config::CacheConfig;
use crate::cache::key::content_digest;
use crate::embedding::{EmbedInput, EmbedOutput, EmbeddingProvider};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A memoised vector
#[derive(Debug, Clone)]
struct MemoEntry {
    embedding: Vec<f32>,
    computed_at: Instant,
}

impl MemoEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.computed_at) < ttl
    }
}

/// Memo counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoStats {
    /// Vectors currently held, stale ones included
    pub entries: usize,

    /// Inputs answered from the memo
    pub hits: u64,

    /// Inputs that needed the provider
    pub misses: u64,

    /// Entries dropped to respect the size bound
    pub evictions: u64,

    /// Calls made to the provider
    pub provider_calls: u64,
}

impl MemoStats {
    /// Fraction of non-empty inputs answered from the memo
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct MemoSettings {
    max_entries: usize,
    ttl: Duration,
    eviction_fraction: f64,
    dimension: usize,
}

impl From<&CacheConfig> for MemoSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.memo_max_entries.max(1),
            ttl: config.memo_ttl,
            eviction_fraction: config.memo_eviction_fraction,
            dimension: config.embedding_dimension,
        }
    }
}

/// Texts that missed the memo, deduplicated, in first-seen order
#[derive(Default)]
struct Pending {
    texts: Vec<String>,
    hashes: Vec<String>,
    positions: Vec<Vec<usize>>,
    slot_of: HashMap<String, usize>,
}

impl Pending {
    fn push(&mut self, hash: String, text: &str, position: usize) {
        match self.slot_of.get(&hash) {
            Some(&slot) => self.positions[slot].push(position),
            None => {
                self.slot_of.insert(hash.clone(), self.texts.len());
                self.texts.push(text.to_string());
                self.hashes.push(hash);
                self.positions.push(vec![position]);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Memoising wrapper around an [`EmbeddingProvider`].
///
/// - Inputs are trimmed; an empty input yields a zero vector of the
///   configured dimension without touching the memo or the provider.
/// - Vectors are keyed by the MD5 of the trimmed text and reused while
///   younger than the memo TTL.
/// - Everything the memo cannot answer goes to the provider in one call,
///   each distinct text once.
/// - The memo never holds more than `memo_max_entries` vectors. When an
///   insert would overflow it, stale entries are purged and then the oldest
///   entries are evicted in one batch.
///
/// Provider errors are returned unchanged and leave the memo untouched.
pub struct EmbeddingMemoCache {
    provider: Arc<dyn EmbeddingProvider>,
    settings: MemoSettings,
    entries: Mutex<HashMap<String, MemoEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    provider_calls: AtomicU64,
}

impl EmbeddingMemoCache {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &CacheConfig) -> Self {
        let settings = MemoSettings::from(config);
        info!(
            "Initializing embedding memo: max {} entries, ttl {:?}, dimension {}",
            settings.max_entries, settings.ttl, settings.dimension
        );
        Self {
            provider,
            settings,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
        }
    }

    /// Memo with the default bounds (2000 entries, 1 hour, 768 dimensions)
    pub fn with_defaults(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(provider, &CacheConfig::default())
    }

    /// Embed one text or many, answering in the same shape.
    pub async fn embed(&self, input: impl Into<EmbedInput>) -> Result<EmbedOutput> {
        match input.into() {
            EmbedInput::Single(text) => self.embed_one(&text).await.map(EmbedOutput::Single),
            EmbedInput::Batch(texts) => self.embed_batch(&texts).await.map(EmbedOutput::Batch),
        }
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CacheError::ComputeError("no vector for single input".to_string()))
    }

    /// Embed many texts, one vector per input in input order.
    pub async fn embed_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        let mut outputs: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending = Pending::default();

        {
            let entries = self.entries.lock().await;
            let now = Instant::now();
            for (position, text) in texts.iter().enumerate() {
                let normalized = text.as_ref().trim();
                if normalized.is_empty() {
                    outputs[position] = Some(self.zero_vector());
                    continue;
                }

                let hash = content_digest(normalized);
                match entries.get(&hash) {
                    Some(entry) if entry.is_fresh(now, self.settings.ttl) => {
                        outputs[position] = Some(entry.embedding.clone());
                        self.hits.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {
                        pending.push(hash, normalized, position);
                        self.misses.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        if !pending.is_empty() {
            debug!(
                "Embedding memo: {} of {} inputs need the provider ({} distinct)",
                pending.positions.iter().map(Vec::len).sum::<usize>(),
                texts.len(),
                pending.texts.len()
            );
            self.compute(pending, &mut outputs).await?;
        }

        outputs
            .into_iter()
            .enumerate()
            .map(|(position, vector)| {
                vector.ok_or_else(|| {
                    CacheError::ComputeError(format!("no vector for input {}", position))
                })
            })
            .collect()
    }

    async fn compute(&self, pending: Pending, outputs: &mut [Option<Vec<f32>>]) -> Result<()> {
        // The lock is not held while the provider runs
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        let vectors = self.provider.embed_batch(&pending.texts).await?;
        if vectors.len() != pending.texts.len() {
            return Err(CacheError::ComputeError(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                pending.texts.len()
            )));
        }

        // A batch larger than the memo only keeps its most recent vectors
        let skip = vectors.len().saturating_sub(self.settings.max_entries);

        let mut entries = self.entries.lock().await;
        for hash in &pending.hashes[skip..] {
            entries.remove(hash);
        }
        self.make_room(&mut entries, pending.hashes.len() - skip);

        let now = Instant::now();
        let items = pending
            .hashes
            .into_iter()
            .zip(pending.positions)
            .zip(vectors)
            .enumerate();
        for (index, ((hash, positions), vector)) in items {
            for &position in &positions {
                outputs[position] = Some(vector.clone());
            }
            if index >= skip {
                entries.insert(
                    hash,
                    MemoEntry {
                        embedding: vector,
                        computed_at: now,
                    },
                );
            }
        }

        Ok(())
    }

    /// Evict until `incoming` new entries fit under the size bound.
    fn make_room(&self, entries: &mut HashMap<String, MemoEntry>, incoming: usize) {
        let max = self.settings.max_entries;
        if entries.len() + incoming <= max {
            return;
        }

        let before = entries.len();
        let now = Instant::now();
        let ttl = self.settings.ttl;
        entries.retain(|_, entry| entry.is_fresh(now, ttl));
        let mut evicted = before - entries.len();

        if entries.len() + incoming > max {
            let batch = (max as f64 * self.settings.eviction_fraction).ceil() as usize;
            let overflow = entries.len() + incoming - max;
            let count = batch.max(overflow).min(entries.len());

            let mut by_age: Vec<(Instant, String)> = entries
                .iter()
                .map(|(hash, entry)| (entry.computed_at, hash.clone()))
                .collect();
            by_age.sort();
            for (_, hash) in by_age.into_iter().take(count) {
                entries.remove(&hash);
            }
            evicted += count;
        }

        if evicted > 0 {
            debug!("Embedding memo evicted {} entries", evicted);
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.settings.dimension]
    }

    pub async fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.entries.lock().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
        }
    }

    /// Number of memoised vectors
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every memoised vector. Counters are kept.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        info!("Cleared {} entries from embedding memo", count);
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingMemoCache {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        EmbeddingMemoCache::embed_batch(self, texts).await
    }
}
