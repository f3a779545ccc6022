//! Error taxonomy for the retrieval core

use thiserror::Error;

/// Errors surfaced by index builds and searches.
///
/// A scorer failure during reranking is not an error: it is reported as
/// [`crate::types::RerankFailure`] data on an otherwise successful response.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Bad request shape; the caller should fix the input, not retry
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding length disagrees with the index dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A collaborator (embedder, lexical stage) failed with no fallback path
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Chunk and vector inputs are inconsistent (duplicates, dangling ids)
    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetrievalError {
    /// Whether the same request may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetrievalUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
