//! Brute-force vector search

use crate::config::{IndexConfig, Metric};
use crate::error::Result;
use crate::types::{ChunkId, RankedResult, VectorRecord};

use super::{rank_by_similarity, VectorScorer};

/// Exact nearest-neighbour scan.
///
/// For cosine, rows are L2-normalized at build time so a query costs one dot
/// product per row. Zero vectors normalize to zero and score 0.
pub struct ExactIndex {
    chunk_ids: Vec<ChunkId>,
    /// Row-major, `chunk_ids.len() * dimensions`
    data: Vec<f32>,
    dimensions: usize,
    metric: Metric,
}

impl ExactIndex {
    /// Records must already be validated against `config.dimensions`.
    pub fn build(records: &[VectorRecord], config: &IndexConfig) -> Self {
        let mut chunk_ids = Vec::with_capacity(records.len());
        let mut data = Vec::with_capacity(records.len() * config.dimensions);
        for record in records {
            chunk_ids.push(record.chunk_id.clone());
            match config.metric {
                Metric::Cosine => data.extend(normalized(&record.embedding)),
                Metric::InnerProduct => data.extend_from_slice(&record.embedding),
            }
        }
        Self {
            chunk_ids,
            data,
            dimensions: config.dimensions,
            metric: config.metric,
        }
    }
}

impl VectorScorer for ExactIndex {
    fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<RankedResult>> {
        if self.chunk_ids.is_empty() || self.dimensions == 0 {
            return Ok(Vec::new());
        }
        let query: Vec<f32> = match self.metric {
            Metric::Cosine => normalized(query),
            Metric::InnerProduct => query.to_vec(),
        };

        let scored: Vec<(ChunkId, f32)> = self
            .data
            .chunks_exact(self.dimensions)
            .zip(self.chunk_ids.iter())
            .map(|(row, id)| (id.clone(), dot(row, &query)))
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
        "exact"
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(metric: Metric, records: &[VectorRecord]) -> ExactIndex {
        let config = IndexConfig {
            dimensions: 3,
            metric,
            ..IndexConfig::default()
        };
        ExactIndex::build(records, &config)
    }

    fn records() -> Vec<VectorRecord> {
        vec![
            VectorRecord::new("x", vec![1.0, 0.0, 0.0]),
            VectorRecord::new("y", vec![0.0, 2.0, 0.0]),
            VectorRecord::new("xy", vec![1.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn test_cosine_ordering() {
        let index = build(Metric::Cosine, &records());
        let results = index.search(&[0.0, 5.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["y", "xy", "x"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[2].score.abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_uses_magnitude() {
        let index = build(Metric::InnerProduct, &records());
        let results = index.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].chunk_id, "y");
        assert!((results[0].score - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let mut recs = records();
        recs.push(VectorRecord::new("zero", vec![0.0, 0.0, 0.0]));
        let index = build(Metric::Cosine, &recs);
        let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
        let zero = results.iter().find(|r| r.chunk_id == "zero").unwrap();
        assert_eq!(zero.score, 0.0);
    }

    #[test]
    fn test_identical_vectors_tie_by_chunk_id() {
        let recs = vec![
            VectorRecord::new("C", vec![0.5, 0.5, 0.0]),
            VectorRecord::new("A", vec![0.5, 0.5, 0.0]),
            VectorRecord::new("B", vec![0.0, 0.0, 1.0]),
        ];
        let index = build(Metric::Cosine, &recs);
        let results = index.search(&[1.0, 1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C", "B"]);
    }
}
