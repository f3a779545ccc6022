//! Index, lexical, retrieval and rerank configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity function used by the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cosine,
    InnerProduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::InnerProduct => f.write_str("inner_product"),
        }
    }
}

/// Vector index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Brute-force scan, exact results
    Exact,
    /// USearch HNSW graph, approximate results
    Hnsw,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimension every record must have
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_metric")]
    pub metric: Metric,
    #[serde(default = "default_backend")]
    pub backend: IndexBackend,
    /// HNSW M parameter (connections per layer)
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    #[serde(default = "default_hnsw_ef_search")]
    pub hnsw_ef_search: usize,
}

fn default_dimensions() -> usize {
    384
}

fn default_metric() -> Metric {
    Metric::Cosine
}

fn default_backend() -> IndexBackend {
    IndexBackend::Exact
}

fn default_hnsw_m() -> usize {
    16
}

fn default_hnsw_ef_construction() -> usize {
    200
}

fn default_hnsw_ef_search() -> usize {
    100
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            metric: default_metric(),
            backend: default_backend(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
            hnsw_ef_search: default_hnsw_ef_search(),
        }
    }
}

/// Which tokenizer the lexical index should try first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Language-aware analyzer, falling back to regex when unavailable
    Preferred,
    /// Always use the regex tokenizer
    Regex,
}

/// BM25 and tokenization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// Term frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Length normalization
    #[serde(default = "default_b")]
    pub b: f32,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: TokenizerKind,
    /// Stop-word and stemmer language for the preferred tokenizer
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

fn default_tokenizer() -> TokenizerKind {
    TokenizerKind::Preferred
}

fn default_language() -> String {
    "english".to_string()
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            tokenizer: default_tokenizer(),
            language: default_language(),
        }
    }
}

/// How lexical and vector lists are merged in hybrid mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Reciprocal Rank Fusion
    Rrf,
    /// Min-max normalized weighted sum
    Linear,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// RRF k parameter
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    /// Candidate multiplier for each list in hybrid mode
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_weight")]
    pub lexical_weight: f32,
    #[serde(default = "default_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_fusion")]
    pub fusion: FusionMethod,
    /// Overall per-request deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Serve lexical-only results when the embedder fails in hybrid mode
    #[serde(default = "default_hybrid_fallback")]
    pub hybrid_fallback: bool,
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    50
}

fn default_rrf_k() -> usize {
    60
}

fn default_overfetch_factor() -> usize {
    4
}

fn default_weight() -> f32 {
    1.0
}

fn default_fusion() -> FusionMethod {
    FusionMethod::Rrf
}

fn default_deadline_ms() -> u64 {
    2000
}

fn default_hybrid_fallback() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            rrf_k: default_rrf_k(),
            overfetch_factor: default_overfetch_factor(),
            lexical_weight: default_weight(),
            vector_weight: default_weight(),
            fusion: default_fusion(),
            deadline_ms: default_deadline_ms(),
            hybrid_fallback: default_hybrid_fallback(),
        }
    }
}

/// Cross-encoder reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Rerank by default when a request does not say otherwise
    #[serde(default)]
    pub enabled: bool,
    /// Number of fused candidates handed to the scorer
    #[serde(default = "default_rerank_k")]
    pub rerank_k: usize,
    /// Passage length cap (characters) before scoring
    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,
    /// Maximum scoring calls in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_rerank_k() -> usize {
    20
}

fn default_max_passage_chars() -> usize {
    1200
}

fn default_concurrency() -> usize {
    4
}

fn default_call_timeout_ms() -> u64 {
    500
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rerank_k: default_rerank_k(),
            max_passage_chars: default_max_passage_chars(),
            concurrency: default_concurrency(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}
