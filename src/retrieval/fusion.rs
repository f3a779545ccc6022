//! Result fusion strategies
//!
//! Implements Reciprocal Rank Fusion (RRF) for combining results
//! from multiple retrieval methods, plus a min-max normalized linear
//! combination as an alternative.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::config::FusionMethod;
use crate::types::{ChunkId, RankedResult};

/// Reciprocal Rank Fusion (RRF) parameters
#[derive(Debug, Clone)]
pub struct RrfConfig {
    /// K parameter for RRF (default: 60)
    pub k: usize,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

/// One retrieval method's ranked output with its fusion weight
#[derive(Debug, Clone)]
pub struct RankedList {
    pub method: String,
    pub weight: f32,
    pub results: Vec<RankedResult>,
}

impl RankedList {
    pub fn new(method: impl Into<String>, results: Vec<RankedResult>) -> Self {
        Self {
            method: method.into(),
            weight: 1.0,
            results,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

/// Fused result after combining multiple ranking sources
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub chunk_id: ChunkId,
    /// RRF sum, or weighted normalized score for linear fusion
    pub score: f32,
    /// Lowest rank this chunk held in any input list
    pub best_rank: usize,
    pub rank_per_method: BTreeMap<String, usize>,
}

#[derive(Default)]
struct Accumulator {
    contributions: Vec<f32>,
    best_rank: usize,
    rank_per_method: BTreeMap<String, usize>,
}

/// Fuse with the configured method
pub fn fuse(lists: &[RankedList], method: FusionMethod, config: &RrfConfig) -> Vec<FusedResult> {
    match method {
        FusionMethod::Rrf => reciprocal_rank_fusion(lists, config),
        FusionMethod::Linear => linear_combination(lists),
    }
}

/// Compute Reciprocal Rank Fusion score for multiple ranking lists
///
/// RRF score = Σ w_r/(k + rank_r(d)) for all rankers r
///
/// Works on ranks rather than scores, so BM25 and cosine lists need no
/// calibration against each other. A chunk absent from a list gets nothing
/// from it. A chunk repeated within one list counts once, at its best rank.
pub fn reciprocal_rank_fusion(lists: &[RankedList], config: &RrfConfig) -> Vec<FusedResult> {
    let k = config.k as f32;
    let mut acc: HashMap<ChunkId, Accumulator> = HashMap::new();

    for list in lists {
        for (chunk_id, rank) in best_ranks(&list.results) {
            let entry = accumulator(&mut acc, chunk_id, rank, &list.method);
            entry.contributions.push(list.weight / (k + rank as f32));
        }
    }

    finish(acc)
}

/// Weighted sum of min-max normalized scores (alternative to RRF)
///
/// A list whose scores are all equal normalizes every entry to 1.0.
pub fn linear_combination(lists: &[RankedList]) -> Vec<FusedResult> {
    let mut acc: HashMap<ChunkId, Accumulator> = HashMap::new();

    for list in lists {
        let max_score = list.results.iter().map(|r| r.score).fold(f32::MIN, f32::max);
        let min_score = list.results.iter().map(|r| r.score).fold(f32::MAX, f32::min);
        let range = max_score - min_score;

        let mut best: HashMap<&str, (usize, f32)> = HashMap::new();
        for result in &list.results {
            let normalized = if range > 0.0 {
                (result.score - min_score) / range
            } else {
                1.0
            };
            best.entry(result.chunk_id.as_str())
                .and_modify(|(rank, score)| {
                    if result.rank < *rank {
                        *rank = result.rank;
                    }
                    *score = score.max(normalized);
                })
                .or_insert((result.rank, normalized));
        }

        for (chunk_id, (rank, normalized)) in best {
            let entry = accumulator(&mut acc, chunk_id, rank, &list.method);
            entry.contributions.push(list.weight * normalized);
        }
    }

    finish(acc)
}

/// Convert fused results into a ranked list carrying the fused score
pub fn to_ranked_results(fused: &[FusedResult]) -> Vec<RankedResult> {
    fused
        .iter()
        .enumerate()
        .map(|(i, f)| RankedResult {
            chunk_id: f.chunk_id.clone(),
            score: f.score,
            rank: i + 1, // 1-indexed ranks
        })
        .collect()
}

fn best_ranks(results: &[RankedResult]) -> HashMap<&str, usize> {
    let mut best: HashMap<&str, usize> = HashMap::with_capacity(results.len());
    for result in results {
        best.entry(result.chunk_id.as_str())
            .and_modify(|rank| *rank = (*rank).min(result.rank))
            .or_insert(result.rank);
    }
    best
}

fn accumulator<'a>(
    acc: &'a mut HashMap<ChunkId, Accumulator>,
    chunk_id: &str,
    rank: usize,
    method: &str,
) -> &'a mut Accumulator {
    let entry = acc.entry(chunk_id.to_string()).or_insert_with(|| Accumulator {
        best_rank: usize::MAX,
        ..Accumulator::default()
    });
    entry.best_rank = entry.best_rank.min(rank);
    entry
        .rank_per_method
        .entry(method.to_string())
        .and_modify(|r| *r = (*r).min(rank))
        .or_insert(rank);
    entry
}

fn finish(acc: HashMap<ChunkId, Accumulator>) -> Vec<FusedResult> {
    let mut results: Vec<FusedResult> = acc
        .into_iter()
        .map(|(chunk_id, mut a)| {
            // Sum in a fixed order so the input list order cannot change the bits
            a.contributions.sort_by(|x, y| x.total_cmp(y));
            FusedResult {
                chunk_id,
                score: a.contributions.iter().sum(),
                best_rank: a.best_rank,
                rank_per_method: a.rank_per_method,
            }
        })
        .collect();

    results.sort_by(compare_fused);
    results
}

/// Score descending, then best rank ascending, then chunk id ascending
fn compare_fused(a: &FusedResult, b: &FusedResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.best_rank.cmp(&b.best_rank))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(method: &str, ids: &[&str]) -> RankedList {
        let results = ids
            .iter()
            .enumerate()
            .map(|(i, id)| RankedResult {
                chunk_id: id.to_string(),
                score: 1.0 / (i + 1) as f32,
                rank: i + 1,
            })
            .collect();
        RankedList::new(method, results)
    }

    fn ids(fused: &[FusedResult]) -> Vec<&str> {
        fused.iter().map(|f| f.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_rrf_fusion() {
        let dense = list("dense", &["chunk1", "chunk2", "chunk3"]);
        let bm25 = list("bm25", &["chunk2", "chunk1", "chunk4"]);

        let fused = reciprocal_rank_fusion(&[dense, bm25], &RrfConfig::default());

        // chunk1 and chunk2 appear in both lists and tie; chunk1 wins on id
        assert_eq!(ids(&fused), vec!["chunk1", "chunk2", "chunk3", "chunk4"]);
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].score - expected).abs() < 1e-7);
        assert_eq!(fused[0].rank_per_method.len(), 2);
        assert_eq!(fused[0].rank_per_method["dense"], 1);
        assert_eq!(fused[0].rank_per_method["bm25"], 2);
    }

    #[test]
    fn test_rrf_tie_breaks_on_best_rank() {
        // x at rank 1 in one list and y at rank 1 in the other have equal
        // scores; both best ranks are 1 so the id decides
        let a = list("a", &["y", "z"]);
        let b = list("b", &["x"]);
        let fused = reciprocal_rank_fusion(&[a, b], &RrfConfig::default());
        assert_eq!(ids(&fused), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_rrf_equal_scores_prefer_better_best_rank() {
        // With k = 1, rank 1 in one list (1/2) equals rank 3 in both (1/4 + 1/4)
        let a = list("a", &["zeta", "m1", "alpha"]);
        let b = list("b", &["n1", "n2", "alpha"]);
        let fused = reciprocal_rank_fusion(&[a, b], &RrfConfig { k: 1 });

        let by_id: HashMap<&str, &FusedResult> =
            fused.iter().map(|f| (f.chunk_id.as_str(), f)).collect();
        assert_eq!(by_id["zeta"].score, by_id["alpha"].score);
        assert_eq!(by_id["zeta"].best_rank, 1);
        assert_eq!(by_id["alpha"].best_rank, 3);

        // zeta outranks alpha despite the larger id
        assert_eq!(ids(&fused), vec!["n1", "zeta", "alpha", "m1", "n2"]);
    }

    #[test]
    fn test_rrf_is_commutative() {
        let a = list("bm25", &["a", "b", "c", "d"]);
        let b = list("vector", &["d", "c", "e"]);
        let ab = reciprocal_rank_fusion(&[a.clone(), b.clone()], &RrfConfig::default());
        let ba = reciprocal_rank_fusion(&[b, a], &RrfConfig::default());
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_rrf_duplicate_in_list_counts_once() {
        let dup = list("bm25", &["a", "a", "b"]);
        let fused = reciprocal_rank_fusion(&[dup], &RrfConfig::default());
        let a = fused.iter().find(|f| f.chunk_id == "a").unwrap();
        assert!((a.score - 1.0 / 61.0).abs() < 1e-7);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_rrf_weights() {
        let a = list("bm25", &["a"]).with_weight(2.0);
        let b = list("vector", &["b"]);
        let fused = reciprocal_rank_fusion(&[a, b], &RrfConfig::default());
        assert_eq!(fused[0].chunk_id, "a");
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_zero_weight_keeps_candidates() {
        let a = list("bm25", &["a", "b"]).with_weight(0.0);
        let b = list("vector", &["c"]);
        let fused = reciprocal_rank_fusion(&[a, b], &RrfConfig::default());
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk_id, "c");
    }

    #[test]
    fn test_rrf_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], &RrfConfig::default()).is_empty());
        let empty = list("bm25", &[]);
        assert!(reciprocal_rank_fusion(&[empty], &RrfConfig::default()).is_empty());
    }

    #[test]
    fn test_linear_combination() {
        let a = RankedList::new(
            "bm25",
            vec![
                RankedResult { chunk_id: "a".into(), score: 10.0, rank: 1 },
                RankedResult { chunk_id: "b".into(), score: 5.0, rank: 2 },
            ],
        );
        let b = RankedList::new(
            "vector",
            vec![
                RankedResult { chunk_id: "b".into(), score: 0.9, rank: 1 },
                RankedResult { chunk_id: "c".into(), score: 0.1, rank: 2 },
            ],
        );
        let fused = linear_combination(&[a, b]);
        // a: 1.0, b: 0.0 + 1.0, c: 0.0; a and b tie at 1.0 and rank 1, id decides
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
        assert!((fused[0].score - 1.0).abs() < 1e-6);
        assert_eq!(fused[2].score, 0.0);
    }

    #[test]
    fn test_linear_constant_scores_normalize_to_one() {
        let a = RankedList::new(
            "bm25",
            vec![
                RankedResult { chunk_id: "x".into(), score: 3.0, rank: 1 },
                RankedResult { chunk_id: "y".into(), score: 3.0, rank: 2 },
            ],
        );
        let fused = linear_combination(&[a]);
        assert!(fused.iter().all(|f| f.score == 1.0));
        assert_eq!(ids(&fused), vec!["x", "y"]);
    }

    #[test]
    fn test_to_ranked_results() {
        let fused = reciprocal_rank_fusion(&[list("bm25", &["a", "b"])], &RrfConfig::default());
        let ranked = to_ranked_results(&fused);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[1].chunk_id, "b");
    }
}
