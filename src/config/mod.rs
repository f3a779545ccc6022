//! Configuration for the hybrid retrieval engine

mod index;
mod logging;

pub use index::{
    FusionMethod, IndexBackend, IndexConfig, LexicalConfig, Metric, RerankConfig,
    RetrievalConfig, TokenizerKind,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on candidates handed to the reranker
pub const MAX_RERANK_K: usize = 200;

/// Largest embedding dimension accepted by the vector index
pub const MAX_DIMENSIONS: usize = 4096;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// BM25 and tokenizer configuration
    #[serde(default)]
    pub lexical: LexicalConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reranking configuration
    #[serde(default)]
    pub rerank: RerankConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects every error and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Index validation
        if self.index.dimensions == 0 {
            errors.push("index dimensions must be positive".to_string());
        }
        if self.index.dimensions > MAX_DIMENSIONS {
            errors.push(format!("index dimensions must be <= {}", MAX_DIMENSIONS));
        }
        if self.index.hnsw_ef_construction == 0 {
            errors.push("ef_construction must be positive".to_string());
        }
        if self.index.hnsw_ef_search == 0 {
            errors.push("ef_search must be positive".to_string());
        }
        if self.index.hnsw_m == 0 {
            errors.push("HNSW M parameter must be positive".to_string());
        }

        // Lexical validation
        if !self.lexical.k1.is_finite() || self.lexical.k1 < 0.0 {
            errors.push("k1 must be a non-negative number".to_string());
        }
        if !(0.0..=1.0).contains(&self.lexical.b) {
            errors.push("b must be between 0.0 and 1.0".to_string());
        }
        if self.lexical.language.trim().is_empty() {
            errors.push("lexical language must not be empty".to_string());
        }

        // Retrieval validation
        let r = &self.retrieval;
        if r.rrf_k == 0 {
            errors.push("rrf_k must be positive".to_string());
        }
        if r.overfetch_factor == 0 {
            errors.push("overfetch_factor must be at least 1".to_string());
        }
        if r.lexical_weight < 0.0 || r.vector_weight < 0.0 {
            errors.push("fusion weights must be non-negative".to_string());
        } else if r.lexical_weight == 0.0 && r.vector_weight == 0.0 {
            errors.push("lexical_weight and vector_weight must not both be zero".to_string());
        }
        if r.max_top_k == 0 {
            errors.push("max_top_k must be positive".to_string());
        }
        if r.default_top_k == 0 || r.default_top_k > r.max_top_k {
            errors.push(format!(
                "default_top_k must be between 1 and max_top_k ({}), got {}",
                r.max_top_k, r.default_top_k
            ));
        }
        if r.deadline_ms == 0 {
            errors.push("deadline_ms must be positive".to_string());
        }

        // Rerank validation
        let rr = &self.rerank;
        if rr.rerank_k == 0 || rr.rerank_k > MAX_RERANK_K {
            errors.push(format!(
                "rerank_k must be between 1 and {}, got {}",
                MAX_RERANK_K, rr.rerank_k
            ));
        } else if rr.rerank_k < r.default_top_k {
            errors.push(format!(
                "rerank_k ({}) must be >= default_top_k ({})",
                rr.rerank_k, r.default_top_k
            ));
        }
        if rr.max_passage_chars == 0 {
            errors.push("max_passage_chars must be positive".to_string());
        }
        if rr.concurrency == 0 {
            errors.push("rerank concurrency must be at least 1".to_string());
        }
        if rr.call_timeout_ms == 0 {
            errors.push("call_timeout_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
