//! Cross-encoder style reranking of an already ranked candidate list
//!
//! The relevance model is injected through [`RelevanceScorer`]. Scoring calls
//! run on the blocking pool with bounded concurrency, a per-call timeout and
//! the request deadline. A candidate whose call fails or times out keeps its
//! prior position; the rest are reordered by score around it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::tokenizer::{FallbackRegexTokenizer, Tokenizer};
use crate::config::RerankConfig;
use crate::types::{ChunkId, RankedResult, RerankFailure};
use crate::util::truncate_chars;

/// Scores a (query, passage) pair; higher is more relevant
pub trait RelevanceScorer: Send + Sync + 'static {
    fn score(&self, query: &str, passage: &str) -> anyhow::Result<f32>;

    fn name(&self) -> &'static str;
}

/// Query-term overlap heuristic, usable without a model.
///
/// Score is the fraction of distinct query terms that occur as whole words
/// in the passage, plus a small bonus for term density.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapScorer;

impl RelevanceScorer for TermOverlapScorer {
    fn score(&self, query: &str, passage: &str) -> anyhow::Result<f32> {
        let tokenizer = FallbackRegexTokenizer;
        let query_terms: HashSet<String> = tokenizer.tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let passage_tokens = tokenizer.tokenize(passage);
        if passage_tokens.is_empty() {
            return Ok(0.0);
        }

        let present: HashSet<&str> = passage_tokens.iter().map(String::as_str).collect();
        let matched = query_terms
            .iter()
            .filter(|t| present.contains(t.as_str()))
            .count();
        let hits = passage_tokens
            .iter()
            .filter(|t| query_terms.contains(t.as_str()))
            .count();

        let coverage = matched as f32 / query_terms.len() as f32;
        let density = hits as f32 / passage_tokens.len() as f32;
        Ok(coverage * 0.9 + density * 0.1)
    }

    fn name(&self) -> &'static str {
        "term-overlap"
    }
}

/// A candidate handed to the reranker, in its pre-rerank order
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub chunk_id: ChunkId,
    pub text: String,
    pub prior_score: f32,
}

/// Reranked list plus the candidates that could not be scored
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub results: Vec<RankedResult>,
    pub failures: Vec<RerankFailure>,
    /// The request deadline expired before every call returned
    pub deadline_exceeded: bool,
}

/// Runs scoring calls and merges them back into a ranking
pub struct Reranker {
    config: RerankConfig,
}

impl Reranker {
    pub fn new(config: RerankConfig) -> Self {
        Self { config }
    }

    /// Rerank `candidates` (already truncated to the rerank depth).
    ///
    /// Output length equals the input length; the caller trims to `top_k`.
    /// Without a scorer every candidate keeps its place and is reported as
    /// a failure.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        scorer: Option<Arc<dyn RelevanceScorer>>,
        deadline: Instant,
    ) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome::default();
        }

        let Some(scorer) = scorer else {
            warn!("Rerank requested but no scorer is configured, keeping prior order");
            let failures = candidates
                .iter()
                .map(|c| RerankFailure {
                    chunk_id: c.chunk_id.clone(),
                    reason: "no relevance scorer available".to_string(),
                })
                .collect();
            return RerankOutcome {
                results: prior_order(candidates),
                failures,
                deadline_exceeded: false,
            };
        };

        let (scores, deadline_exceeded) = self.score_all(query, candidates, scorer, deadline).await;

        let mut failures = Vec::new();
        let mut scored: Vec<(usize, f32)> = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            match scores.get(&idx) {
                Some(Ok(score)) => scored.push((idx, *score)),
                Some(Err(reason)) => failures.push(RerankFailure {
                    chunk_id: candidate.chunk_id.clone(),
                    reason: reason.clone(),
                }),
                None => failures.push(RerankFailure {
                    chunk_id: candidate.chunk_id.clone(),
                    reason: if deadline_exceeded {
                        "request deadline exceeded".to_string()
                    } else {
                        "scoring task aborted".to_string()
                    },
                }),
            }
        }

        if !failures.is_empty() {
            warn!(
                "Reranker could not score {} of {} candidates",
                failures.len(),
                candidates.len()
            );
        }

        RerankOutcome {
            results: merge(candidates, scored),
            failures,
            deadline_exceeded,
        }
    }

    async fn score_all(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        scorer: Arc<dyn RelevanceScorer>,
        deadline: Instant,
    ) -> (HashMap<usize, Result<f32, String>>, bool) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let call_timeout = Duration::from_millis(self.config.call_timeout_ms);
        let query: Arc<str> = Arc::from(query);
        let mut set = JoinSet::new();

        for (idx, candidate) in candidates.iter().enumerate() {
            let passage = truncate_chars(&candidate.text, self.config.max_passage_chars).to_string();
            let scorer = Arc::clone(&scorer);
            let query = Arc::clone(&query);
            let semaphore = Arc::clone(&semaphore);

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, Err("scoring pool closed".to_string()));
                };
                let call = tokio::task::spawn_blocking(move || scorer.score(&query, &passage));
                let result = match tokio::time::timeout(call_timeout, call).await {
                    Ok(Ok(Ok(score))) if score.is_finite() => Ok(score),
                    Ok(Ok(Ok(score))) => Err(format!("non-finite score {}", score)),
                    Ok(Ok(Err(e))) => Err(format!("scorer error: {}", e)),
                    Ok(Err(e)) => Err(format!("scorer task failed: {}", e)),
                    Err(_) => Err(format!("scorer call timed out after {:?}", call_timeout)),
                };
                (idx, result)
            });
        }

        let mut scores = HashMap::with_capacity(candidates.len());
        let mut deadline_exceeded = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, result)))) => {
                    scores.insert(idx, result);
                }
                Ok(Some(Err(e))) => warn!("Rerank task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    set.abort_all();
                    warn!(
                        "Request deadline hit during rerank with {} of {} scores in",
                        scores.len(),
                        candidates.len()
                    );
                    break;
                }
            }
        }

        debug!("Reranker collected {} scores", scores.len());
        (scores, deadline_exceeded)
    }
}

fn prior_order(candidates: &[RerankCandidate]) -> Vec<RankedResult> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| RankedResult {
            chunk_id: c.chunk_id.clone(),
            score: c.prior_score,
            rank: i + 1,
        })
        .collect()
}

/// Failed candidates stay at their index; scored candidates, sorted by score
/// (ties by prior position), fill the remaining slots in order.
fn merge(candidates: &[RerankCandidate], mut scored: Vec<(usize, f32)>) -> Vec<RankedResult> {
    scored.sort_by(|(a_idx, a), (b_idx, b)| b.total_cmp(a).then_with(|| a_idx.cmp(b_idx)));
    let scored_slots: HashSet<usize> = scored.iter().map(|(idx, _)| *idx).collect();
    let mut ranked_iter = scored.into_iter();

    let mut results = Vec::with_capacity(candidates.len());
    for (slot, candidate) in candidates.iter().enumerate() {
        let (chunk_id, score) = if scored_slots.contains(&slot) {
            match ranked_iter.next() {
                Some((idx, score)) => (candidates[idx].chunk_id.clone(), score),
                None => (candidate.chunk_id.clone(), candidate.prior_score),
            }
        } else {
            (candidate.chunk_id.clone(), candidate.prior_score)
        };
        results.push(RankedResult {
            chunk_id,
            score,
            rank: slot + 1,
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[(&str, &str)]) -> Vec<RerankCandidate> {
        items
            .iter()
            .enumerate()
            .map(|(i, (id, text))| RerankCandidate {
                chunk_id: id.to_string(),
                text: text.to_string(),
                prior_score: 1.0 / (i + 1) as f32,
            })
            .collect()
    }

    fn reranker() -> Reranker {
        Reranker::new(RerankConfig {
            call_timeout_ms: 100,
            ..RerankConfig::default()
        })
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn ids(outcome: &RerankOutcome) -> Vec<&str> {
        outcome.results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    /// Fails for any passage containing "broken"
    struct FlakyScorer;

    impl RelevanceScorer for FlakyScorer {
        fn score(&self, query: &str, passage: &str) -> anyhow::Result<f32> {
            if passage.contains("broken") {
                anyhow::bail!("model error");
            }
            TermOverlapScorer.score(query, passage)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Sleeps past the call timeout for passages containing "slow"
    struct SlowScorer;

    impl RelevanceScorer for SlowScorer {
        fn score(&self, query: &str, passage: &str) -> anyhow::Result<f32> {
            if passage.contains("slow") {
                std::thread::sleep(Duration::from_millis(400));
            }
            TermOverlapScorer.score(query, passage)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    /// Records the longest passage it was given
    struct LengthScorer(parking_lot::Mutex<usize>);

    impl RelevanceScorer for LengthScorer {
        fn score(&self, _query: &str, passage: &str) -> anyhow::Result<f32> {
            let mut max = self.0.lock();
            *max = (*max).max(passage.chars().count());
            Ok(0.0)
        }

        fn name(&self) -> &'static str {
            "length"
        }
    }

    #[test]
    fn test_term_overlap_scorer() {
        let s = TermOverlapScorer;
        let full = s.score("machine learning", "Machine learning and neural networks").unwrap();
        let half = s.score("machine learning", "only machine here").unwrap();
        let none = s.score("machine learning", "the cat sat on the mat").unwrap();
        assert!(full > half);
        assert!(half > none);
        assert_eq!(none, 0.0);
        assert_eq!(s.score("", "anything").unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_rerank_reorders_by_score() {
        let cands = candidates(&[
            ("c1", "The cat sat on the mat"),
            ("c2", "Machine learning and neural networks"),
            ("c3", "only machine here"),
        ]);
        let outcome = reranker()
            .rerank("machine learning", &cands, Some(Arc::new(TermOverlapScorer)), far_deadline())
            .await;

        assert_eq!(ids(&outcome), vec!["c2", "c3", "c1"]);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.deadline_exceeded);
        assert_eq!(outcome.results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_rerank_empty() {
        let outcome = reranker()
            .rerank("q", &[], Some(Arc::new(TermOverlapScorer)), far_deadline())
            .await;
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_failed_item_keeps_prior_position() {
        let cands = candidates(&[
            ("a", "nothing relevant"),
            ("b", "broken passage about refunds"),
            ("c", "refund policy"),
        ]);
        let outcome = reranker()
            .rerank("refund policy", &cands, Some(Arc::new(FlakyScorer)), far_deadline())
            .await;

        // b failed and stays in slot 2; c outranks a in the remaining slots
        assert_eq!(ids(&outcome), vec!["c", "b", "a"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].chunk_id, "b");
        assert!(outcome.failures[0].reason.contains("model error"));
        // failed item keeps its prior score
        assert_eq!(outcome.results[1].score, 0.5);
    }

    #[tokio::test]
    async fn test_call_timeout_is_partial_failure() {
        let cands = candidates(&[("a", "slow refund"), ("b", "refund")]);
        let outcome = reranker()
            .rerank("refund", &cands, Some(Arc::new(SlowScorer)), far_deadline())
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].chunk_id, "a");
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_deadline_keeps_prior_order() {
        let cands = candidates(&[("a", "slow one"), ("b", "slow two")]);
        let rr = Reranker::new(RerankConfig {
            call_timeout_ms: 5_000,
            ..RerankConfig::default()
        });
        let deadline = Instant::now() + Duration::from_millis(50);
        let outcome = rr
            .rerank("one two", &cands, Some(Arc::new(SlowScorer)), deadline)
            .await;

        assert!(outcome.deadline_exceeded);
        assert_eq!(ids(&outcome), vec!["a", "b"]);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_no_scorer_keeps_order() {
        let cands = candidates(&[("a", "x"), ("b", "y")]);
        let outcome = reranker().rerank("x", &cands, None, far_deadline()).await;
        assert_eq!(ids(&outcome), vec!["a", "b"]);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_passages_truncated() {
        let long = "word ".repeat(1000);
        let cands = candidates(&[("a", long.as_str())]);
        let scorer = Arc::new(LengthScorer(parking_lot::Mutex::new(0)));
        let rr = Reranker::new(RerankConfig {
            max_passage_chars: 100,
            ..RerankConfig::default()
        });
        let dyn_scorer: Arc<dyn RelevanceScorer> = scorer.clone();
        rr.rerank("word", &cands, Some(dyn_scorer), far_deadline()).await;
        assert_eq!(*scorer.0.lock(), 100);
    }

    #[test]
    fn test_merge_ties_use_prior_position() {
        let cands = candidates(&[("a", ""), ("b", ""), ("c", "")]);
        let merged = merge(&cands, vec![(2, 0.5), (1, 0.5), (0, 0.1)]);
        let ids: Vec<&str> = merged.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
