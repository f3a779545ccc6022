//! Dense vector indexes
//!
//! Two implementations sit behind [`VectorScorer`]:
//! - [`ExactIndex`]: brute-force scan, O(n·dim) per query, exact
//! - [`HnswIndex`]: USearch HNSW graph (feature `hnsw`), approximate
//!
//! [`VectorIndex`] validates records and queries, then dispatches to the
//! configured backend.

mod exact;
#[cfg(feature = "hnsw")]
mod hnsw;

pub use exact::ExactIndex;
#[cfg(feature = "hnsw")]
pub use hnsw::HnswIndex;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{IndexBackend, IndexConfig, Metric};
use crate::error::{Result, RetrievalError};
use crate::types::{ChunkId, RankedResult, VectorRecord};

/// Nearest-neighbour search over fixed-dimension embeddings
pub trait VectorScorer: Send + Sync {
    /// Up to `top_n` chunks ordered by descending similarity
    fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<RankedResult>>;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize;

    fn metric(&self) -> Metric;

    fn backend_name(&self) -> &'static str;
}

/// Vector index with the backend chosen from configuration
pub struct VectorIndex {
    inner: Box<dyn VectorScorer>,
}

impl VectorIndex {
    /// Build an index over `records`.
    ///
    /// Fails with `DimensionMismatch` on the first record whose length
    /// differs from `config.dimensions`, and with `IndexBuild` on duplicate
    /// chunk ids.
    pub fn build(records: &[VectorRecord], config: &IndexConfig) -> Result<Self> {
        let start = Instant::now();
        validate_records(records, config.dimensions)?;

        let inner: Box<dyn VectorScorer> = match config.backend {
            IndexBackend::Exact => Box::new(ExactIndex::build(records, config)),
            IndexBackend::Hnsw => build_hnsw(records, config)?,
        };

        info!(
            "Built vector index: {} vectors, {} dimensions, metric={}, backend={} in {:?}",
            inner.len(),
            inner.dimensions(),
            inner.metric(),
            inner.backend_name(),
            start.elapsed()
        );

        Ok(Self { inner })
    }
}

impl VectorScorer for VectorIndex {
    fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<RankedResult>> {
        check_dimensions(self.inner.dimensions(), query.len())?;
        if top_n == 0 || self.inner.is_empty() {
            return Ok(Vec::new());
        }
        self.inner.search(query, top_n)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn metric(&self) -> Metric {
        self.inner.metric()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(feature = "hnsw")]
fn build_hnsw(records: &[VectorRecord], config: &IndexConfig) -> Result<Box<dyn VectorScorer>> {
    Ok(Box::new(HnswIndex::build(records, config)?))
}

#[cfg(not(feature = "hnsw"))]
fn build_hnsw(records: &[VectorRecord], config: &IndexConfig) -> Result<Box<dyn VectorScorer>> {
    warn!("HNSW backend requested but the `hnsw` feature is disabled, using exact search");
    Ok(Box::new(ExactIndex::build(records, config)))
}

fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RetrievalError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn validate_records(records: &[VectorRecord], dimensions: usize) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
    for record in records {
        if record.dim() != dimensions {
            warn!(
                "Vector for chunk {} has {} dimensions, index expects {}",
                record.chunk_id,
                record.dim(),
                dimensions
            );
            return Err(RetrievalError::DimensionMismatch {
                expected: dimensions,
                actual: record.dim(),
            });
        }
        if !seen.insert(record.chunk_id.as_str()) {
            return Err(RetrievalError::IndexBuild(format!(
                "duplicate vector record for chunk {}",
                record.chunk_id
            )));
        }
    }
    Ok(())
}

/// Sort `(chunk_id, similarity)` pairs best first, ties by ascending chunk id,
/// and assign 1-indexed ranks.
pub(crate) fn rank_by_similarity(mut scored: Vec<(ChunkId, f32)>, top_n: usize) -> Vec<RankedResult> {
    scored.sort_by(|(a_id, a), (b_id, b)| {
        b.partial_cmp(a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a_id.cmp(b_id))
    });
    scored.truncate(top_n);
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (chunk_id, score))| RankedResult {
            chunk_id,
            score,
            rank: i + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dimensions: usize) -> IndexConfig {
        IndexConfig {
            dimensions,
            ..IndexConfig::default()
        }
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let records = vec![
            VectorRecord::new("a", vec![0.1; 384]),
            VectorRecord::new("b", vec![0.1; 768]),
        ];
        match VectorIndex::build(&records, &config(384)) {
            Err(RetrievalError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 384);
                assert_eq!(actual, 768);
            }
            other => panic!("expected DimensionMismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let records = vec![
            VectorRecord::new("a", vec![1.0, 0.0]),
            VectorRecord::new("a", vec![0.0, 1.0]),
        ];
        let err = VectorIndex::build(&records, &config(2)).err().unwrap();
        assert!(matches!(err, RetrievalError::IndexBuild(_)));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let records = vec![VectorRecord::new("a", vec![1.0, 0.0, 0.0])];
        let index = VectorIndex::build(&records, &config(3)).unwrap();
        let err = index.search(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::build(&[], &config(4)).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0, 0.0, 0.0, 1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_rank_by_similarity_tie_break() {
        let ranked = rank_by_similarity(
            vec![
                ("c".to_string(), 0.5),
                ("a".to_string(), 0.5),
                ("b".to_string(), 0.9),
            ],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(ranked[2].rank, 3);
    }
}
