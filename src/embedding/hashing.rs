//! Deterministic feature-hashing embedder

use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::traits::{Embedder, EmbeddingError, EmbeddingResult};
use crate::retrieval::{FallbackRegexTokenizer, Tokenizer};
use crate::types::Embedding;

const DEFAULT_SEED: u64 = 0x5eed;

/// Hashes each word into one of `dimensions` signed buckets, then
/// L2-normalizes. Texts sharing words get positive cosine similarity, which
/// is enough for development corpora and tests. Blank text embeds to zeros.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    seed: u64,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> EmbeddingResult<Self> {
        if dimensions == 0 {
            return Err(EmbeddingError::Config(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            seed: DEFAULT_SEED,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> EmbeddingResult<Embedding> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in FallbackRegexTokenizer.tokenize(text) {
            let hash = xxh3_64_with_seed(token.as_bytes(), self.seed);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
