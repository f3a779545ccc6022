//! HNSW index implementation using USearch
//!
//! Approximate: recall grows with `hnsw_ef_search` and `hnsw_m`, query
//! latency grows sub-linearly with corpus size. Results from the graph are
//! re-sorted so equal similarities still break by chunk id.

use anyhow::Context;
use tracing::debug;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::config::{IndexConfig, Metric};
use crate::error::Result;
use crate::types::{ChunkId, RankedResult, VectorRecord};

use super::{rank_by_similarity, VectorScorer};

/// USearch-backed approximate index. Keys are positions in `chunk_ids`.
pub struct HnswIndex {
    index: Index,
    chunk_ids: Vec<ChunkId>,
    dimensions: usize,
    metric: Metric,
}

impl HnswIndex {
    /// Records must already be validated against `config.dimensions`.
    pub fn build(records: &[VectorRecord], config: &IndexConfig) -> Result<Self> {
        debug!(
            "Creating HNSW index: {} dimensions, M={}, ef_construction={}, ef_search={}",
            config.dimensions, config.hnsw_m, config.hnsw_ef_construction, config.hnsw_ef_search
        );

        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: match config.metric {
                Metric::Cosine => MetricKind::Cos,
                Metric::InnerProduct => MetricKind::IP,
            },
            quantization: ScalarKind::F32,
            connectivity: config.hnsw_m,
            expansion_add: config.hnsw_ef_construction,
            expansion_search: config.hnsw_ef_search,
            multi: false,
        };

        let index = Index::new(&options).context("Failed to create USearch index")?;
        index
            .reserve(records.len().max(1))
            .context("Failed to reserve index capacity")?;

        let mut chunk_ids = Vec::with_capacity(records.len());
        for (key, record) in records.iter().enumerate() {
            index
                .add(key as u64, record.embedding.as_slice())
                .with_context(|| format!("Failed to add vector for chunk {}", record.chunk_id))?;
            chunk_ids.push(record.chunk_id.clone());
        }

        Ok(Self {
            index,
            chunk_ids,
            dimensions: config.dimensions,
            metric: config.metric,
        })
    }
}

impl VectorScorer for HnswIndex {
    fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<RankedResult>> {
        if self.chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.index.search(query, top_n).context("Search failed")?;

        let scored: Vec<(ChunkId, f32)> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(&key, &distance)| {
                self.chunk_ids.get(key as usize).map(|id| {
                    // cos and ip distances are both 1 - similarity
                    let similarity = 1.0 - distance;
                    let similarity = if similarity.is_finite() { similarity } else { 0.0 };
                    (id.clone(), similarity)
                })
            })
            .collect();

        Ok(rank_by_similarity(scored, top_n))
    }

    fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn backend_name(&self) -> &'static str {
        "hnsw"
    }
}
