//! Hybrid retrieval system
//!
//! Combines:
//! - BM25 lexical search over a two-tier tokenizer
//! - Dense vector search (exact or HNSW)
//! - Reciprocal Rank Fusion (RRF) for score aggregation
//! - Optional reranking of the fused top candidates

mod bm25;
mod fusion;
mod hybrid;
mod reranker;
mod tokenizer;

pub use bm25::*;
pub use fusion::*;
pub use hybrid::*;
pub use reranker::*;
pub use tokenizer::*;
