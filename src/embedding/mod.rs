//! # Embedding memoisation
//!
//! [`EmbeddingMemoCache`] sits in front of an [`EmbeddingProvider`] and keeps
//! recently computed vectors in process memory, keyed by the MD5 of the
//! trimmed input text. A call over many texts reaches the provider at most
//! once, with only the texts the memo could not answer.
//!
//! ```no_run
//! use async_trait::async_trait;
//! use ouroboros_cache::embedding::{EmbeddingMemoCache, EmbeddingProvider};
//! use ouroboros_cache::Result;
//! use std::sync::Arc;
//!
//! struct Model;
//!
//! #[async_trait]
//! impl EmbeddingProvider for Model {
//!     async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
//!         Ok(texts.iter().map(|t| vec![t.len() as f32; 768]).collect())
//!     }
//! }
//!
//! # async fn example() -> ouroboros_cache::Result<()> {
//! let memo = EmbeddingMemoCache::with_defaults(Arc::new(Model));
//! let vectors = memo.embed_batch(&["hello", "", "hello"]).await?;
//! assert_eq!(vectors.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod memo;

use crate::error::Result;
use async_trait::async_trait;

pub use memo::{EmbeddingMemoCache, MemoStats};

/// Batch embedding model.
///
/// Implementations return exactly one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One text or many
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedInput {
    Single(String),
    Batch(Vec<String>),
}

impl From<&str> for EmbedInput {
    fn from(text: &str) -> Self {
        EmbedInput::Single(text.to_string())
    }
}

impl From<String> for EmbedInput {
    fn from(text: String) -> Self {
        EmbedInput::Single(text)
    }
}

impl From<Vec<String>> for EmbedInput {
    fn from(texts: Vec<String>) -> Self {
        EmbedInput::Batch(texts)
    }
}

impl From<Vec<&str>> for EmbedInput {
    fn from(texts: Vec<&str>) -> Self {
        EmbedInput::Batch(texts.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for EmbedInput {
    fn from(texts: &[&str]) -> Self {
        EmbedInput::Batch(texts.iter().map(|t| t.to_string()).collect())
    }
}

/// Result shaped like the [`EmbedInput`] it answers
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutput {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl EmbedOutput {
    /// The vector of a single input
    pub fn into_single(self) -> Option<Vec<f32>> {
        match self {
            EmbedOutput::Single(v) => Some(v),
            EmbedOutput::Batch(_) => None,
        }
    }

    /// All vectors; a single result becomes a one-element batch
    pub fn into_batch(self) -> Vec<Vec<f32>> {
        match self {
            EmbedOutput::Single(v) => vec![v],
            EmbedOutput::Batch(vs) => vs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EmbedOutput::Single(_) => 1,
            EmbedOutput::Batch(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
