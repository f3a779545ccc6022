//! Retrieval quality metrics over binary relevance labels
//!
//! Labels come from weak gold rules: a hit is relevant when any rule
//! matches its chunk id, document, section or text.

use serde::{Deserialize, Serialize};

use crate::types::SearchHit;

/// One weak relevance rule. Every populated field is an alternative;
/// substring checks are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldRule {
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub doc_contains: Option<String>,
    #[serde(default)]
    pub section_contains: Option<String>,
    #[serde(default)]
    pub text_contains: Option<String>,
}

impl GoldRule {
    pub fn chunk(id: impl Into<String>) -> Self {
        Self {
            chunk_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Self {
            text_contains: Some(needle.into()),
            ..Self::default()
        }
    }

    pub fn section(needle: impl Into<String>) -> Self {
        Self {
            section_contains: Some(needle.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, hit: &SearchHit) -> bool {
        if self.chunk_id.as_deref() == Some(hit.chunk_id.as_str()) {
            return true;
        }
        let contains = |needle: &Option<String>, haystack: &str| {
            needle
                .as_deref()
                .is_some_and(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
        };
        contains(&self.doc_contains, &hit.doc_id)
            || contains(&self.section_contains, hit.section.as_deref().unwrap_or(""))
            || contains(&self.text_contains, &hit.text)
    }
}

/// Binary relevance per hit, in hit order
pub fn label_hits(hits: &[SearchHit], gold: &[GoldRule]) -> Vec<bool> {
    hits.iter()
        .map(|h| gold.iter().any(|rule| rule.matches(h)))
        .collect()
}

/// 1.0 if any of the first `k` hits is relevant
pub fn recall_at_k(labels: &[bool], k: usize) -> f64 {
    if labels.iter().take(k).any(|l| *l) {
        1.0
    } else {
        0.0
    }
}

/// Reciprocal rank of the first relevant hit within `k`
pub fn mrr(labels: &[bool], k: usize) -> f64 {
    labels
        .iter()
        .take(k)
        .position(|l| *l)
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Normalized DCG at `k` with binary gains and a log2 discount.
///
/// The ideal ordering puts every relevant label of the list first.
pub fn ndcg(labels: &[bool], k: usize) -> f64 {
    let dcg: f64 = labels
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, l)| **l)
        .map(|(i, _)| discount(i))
        .sum();
    let relevant = labels.iter().filter(|l| **l).count().min(k);
    let idcg: f64 = (0..relevant).map(discount).sum();
    if idcg > 0.0 {
        dcg / idcg
    } else {
        0.0
    }
}

/// Fraction of cited chunk ids that were actually retrieved
pub fn citation_alignment(cited: &[String], retrieved: &[String]) -> f64 {
    if cited.is_empty() {
        return 0.0;
    }
    let hits = cited.iter().filter(|c| retrieved.contains(c)).count();
    hits as f64 / cited.len() as f64
}

fn discount(position: usize) -> f64 {
    1.0 / ((position + 2) as f64).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, text: &str, section: Option<&str>) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            score: 0.0,
            rank: 0,
            text: text.to_string(),
            doc_id: "handbook.md".to_string(),
            section: section.map(str::to_string),
        }
    }

    #[test]
    fn test_label_hits() {
        let hits = vec![
            hit("a", "Shipping takes 5 days", None),
            hit("b", "Refunds are issued within 30 days", Some("Returns")),
            hit("c", "unrelated", Some("Warranty")),
        ];
        let gold = vec![GoldRule::text("REFUND"), GoldRule::chunk("c")];
        assert_eq!(label_hits(&hits, &gold), vec![false, true, true]);

        let by_section = vec![GoldRule::section("warr")];
        assert_eq!(label_hits(&hits, &by_section), vec![false, false, true]);
    }

    #[test]
    fn test_recall_and_mrr() {
        let labels = [false, false, true, false];
        assert_eq!(recall_at_k(&labels, 2), 0.0);
        assert_eq!(recall_at_k(&labels, 3), 1.0);
        assert!((mrr(&labels, 10) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(mrr(&labels, 2), 0.0);
        assert_eq!(mrr(&[], 10), 0.0);
    }

    #[test]
    fn test_ndcg() {
        assert_eq!(ndcg(&[true, false, false], 10), 1.0);
        assert_eq!(ndcg(&[false, false], 10), 0.0);

        // one relevant at rank 2: (1/log2(3)) / 1
        let expected = 1.0 / 3f64.log2();
        assert!((ndcg(&[false, true], 10) - expected).abs() < 1e-12);

        // perfect ordering of two relevant hits
        assert!((ndcg(&[true, true, false], 10) - 1.0).abs() < 1e-12);
        assert!(ndcg(&[false, true, true], 10) < 1.0);
    }

    #[test]
    fn test_citation_alignment() {
        let retrieved = vec!["a".to_string(), "b".to_string()];
        assert_eq!(citation_alignment(&[], &retrieved), 0.0);
        assert_eq!(
            citation_alignment(&["a".to_string(), "z".to_string()], &retrieved),
            0.5
        );
    }
}
