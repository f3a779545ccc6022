//! Core types for the retrieval engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RetrievalError;

/// Unique identifier for a chunk
pub type ChunkId = String;

/// Unique identifier for a document
pub type DocumentId = String;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Immutable unit of retrievable text, owned by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub doc_id: DocumentId,
    /// Position within the owning document
    #[serde(default)]
    pub ord: u32,
    #[serde(default)]
    pub section: Option<String>,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, doc_id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            doc_id: doc_id.into(),
            ord: 0,
            section: None,
        }
    }

    pub fn with_ord(mut self, ord: u32) -> Self {
        self.ord = ord;
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

/// Precomputed embedding for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: ChunkId,
    pub embedding: Embedding,
}

impl VectorRecord {
    pub fn new(chunk_id: impl Into<ChunkId>, embedding: Embedding) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            embedding,
        }
    }

    pub fn dim(&self) -> usize {
        self.embedding.len()
    }
}

/// A single entry of a ranked list.
///
/// `score` is only comparable with other scores produced by the same
/// ranking method (raw BM25, raw similarity, fused RRF or reranker score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    /// 1-indexed
    pub rank: usize,
}

/// Retrieval mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Bm25,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Bm25 => "bm25",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "bm25" => Ok(Self::Bm25),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(RetrievalError::InvalidArgument(format!(
                "unknown search mode '{}', expected one of: vector, bm25, hybrid",
                other
            ))),
        }
    }
}

/// A search request as accepted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub top_k: usize,
    pub rerank: bool,
    pub rerank_k: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode, top_k: usize) -> Self {
        Self {
            query: query.into(),
            mode,
            top_k,
            rerank: false,
            rerank_k: top_k,
        }
    }

    /// Enable reranking over the top `rerank_k` candidates
    pub fn with_rerank(mut self, rerank_k: usize) -> Self {
        self.rerank = true;
        self.rerank_k = rerank_k;
        self
    }

    /// Check the request shape before any work is done
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.top_k < 1 {
            return Err(RetrievalError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.rerank && self.rerank_k < self.top_k {
            return Err(RetrievalError::InvalidArgument(format!(
                "rerank_k ({}) must be >= top_k ({})",
                self.rerank_k, self.top_k
            )));
        }
        Ok(())
    }

    /// Cap `top_k` at `max_top_k`; larger requests are served, not rejected
    pub fn clamp_top_k(mut self, max_top_k: usize) -> Self {
        self.top_k = self.top_k.min(max_top_k);
        self
    }

    /// Number of candidates each ranking stage must produce
    pub fn candidate_count(&self) -> usize {
        if self.rerank {
            self.rerank_k.max(self.top_k)
        } else {
            self.top_k
        }
    }
}

/// Final, hydrated search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub rank: usize,
    pub text: String,
    pub doc_id: DocumentId,
    pub section: Option<String>,
}

/// Why a response is less than a full answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The vector side failed in hybrid mode; only lexical results were used
    LexicalOnly { reason: String },
    /// The lexical side failed in hybrid mode; only vector results were used
    VectorOnly { reason: String },
    /// The request deadline expired during reranking
    DeadlineExceeded { stage: String },
}

/// A candidate the reranker could not score; it kept its prior position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankFailure {
    pub chunk_id: ChunkId,
    pub reason: String,
}

/// Search output with the flags a caller needs to judge completeness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub hits: Vec<SearchHit>,
    pub degraded: Option<Degradation>,
    pub rerank_failures: Vec<RerankFailure>,
    /// Generation of the index snapshot that served the request
    pub generation: u64,
}

impl SearchResponse {
    pub fn empty(mode: SearchMode, generation: u64) -> Self {
        Self {
            mode,
            hits: Vec::new(),
            degraded: None,
            rerank_failures: Vec::new(),
            generation,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.degraded.is_some() || !self.rerank_failures.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk_id.as_str()).collect()
    }
}
