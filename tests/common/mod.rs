//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ouroboros_cache::{CacheError, EmbeddingProvider, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Deterministic provider that records every batch it receives.
///
/// The vector of a text is `[len, sum of bytes, 1.0, ...]` padded to the
/// dimension, so equal texts always get equal vectors.
pub struct RecordingProvider {
    dimension: usize,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![1.0; self.dimension];
        v[0] = text.len() as f32;
        v[1] = text.bytes().map(|b| b as f32).sum();
        v
    }
}

#[async_trait]
impl EmbeddingProvider for RecordingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Provider that fails every call
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::ComputeError("model unavailable".to_string()))
    }
}

/// Provider that drops the last vector of every batch
pub struct ShortProvider;

#[async_trait]
impl EmbeddingProvider for ShortProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![0.1; 4]).collect())
    }
}
