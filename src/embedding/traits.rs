//! Embedding capability trait definitions
//!
//! The retrieval core only needs a function from text to a fixed-length
//! vector. Model loading and serving live with the caller.

use crate::types::Embedding;
use std::fmt::Debug;

/// Errors that can occur during embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The embedding service is unreachable or not loaded
    #[error("Embedder unavailable: {0}")]
    Unavailable(String),

    /// Embedding generation failed
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Dense text embedder with a fixed output dimension.
///
/// Object-safe so the retriever can hold `Arc<dyn Embedder>`.
pub trait Embedder: Send + Sync + Debug {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> EmbeddingResult<Embedding>;

    /// Generate embeddings for a batch of texts
    ///
    /// The default implementation calls `embed` for each text.
    fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimension
    fn dimensions(&self) -> usize;

    /// Backend name (e.g. "hashing")
    fn name(&self) -> &str;
}
