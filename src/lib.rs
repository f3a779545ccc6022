//! hybrid-rag: hybrid retrieval engine for retrieval-augmented generation
//!
//! Turns a natural-language query into a ranked set of text chunks by
//! combining:
//! - BM25 lexical search with a language-aware tokenizer and regex fallback
//! - Dense vector search (exact scan or USearch HNSW)
//! - Reciprocal Rank Fusion of the two ranked lists
//! - Optional reranking of the fused top candidates
//!
//! Indexes are immutable snapshots rebuilt wholesale from a [`storage::ChunkSource`]
//! and published atomically to the [`retrieval::HybridRetriever`].

pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod index;
pub mod retrieval;
pub mod storage;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::RetrievalError;
pub use retrieval::{HybridRetriever, IndexSnapshot};
pub use types::*;
