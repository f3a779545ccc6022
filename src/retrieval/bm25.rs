//! BM25 lexical search over an in-memory inverted index

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

use super::tokenizer::{Tokenizer, TokenizerStrategy};
use crate::config::LexicalConfig;
use crate::types::{Chunk, ChunkId, RankedResult};

/// Ranks chunks by lexical relevance to a query
pub trait LexicalScorer: Send + Sync {
    /// Up to `top_n` chunks, best first.
    ///
    /// Chunks sharing no term with the query follow the matches with a
    /// score of zero, in ascending chunk id order. A blank query ranks
    /// nothing.
    fn search(&self, query: &str, top_n: usize) -> Vec<RankedResult>;

    /// Number of indexed chunks
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u32,
    tf: u32,
}

/// Immutable BM25 index built from a chunk set.
///
/// Holds postings, per-document lengths and corpus statistics. It is a pure
/// cache over chunk text and is rebuilt wholesale, never patched.
pub struct Bm25Index {
    tokenizer: TokenizerStrategy,
    chunk_ids: Vec<ChunkId>,
    doc_lens: Vec<u32>,
    postings: HashMap<String, Vec<Posting>>,
    avg_doc_len: f32,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    /// Build the index; the tokenizer is selected here, once.
    pub fn build(chunks: &[Chunk], config: &LexicalConfig) -> Self {
        Self::build_with_tokenizer(chunks, config, TokenizerStrategy::select(config))
    }

    pub fn build_with_tokenizer(
        chunks: &[Chunk],
        config: &LexicalConfig,
        tokenizer: TokenizerStrategy,
    ) -> Self {
        let start = Instant::now();
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut total_len: u64 = 0;

        for (doc, chunk) in chunks.iter().enumerate() {
            let tokens = tokenizer.tokenize(&chunk.text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens.iter() {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push(Posting {
                    doc: doc as u32,
                    tf: count,
                });
            }
            chunk_ids.push(chunk.id.clone());
            doc_lens.push(tokens.len() as u32);
            total_len += tokens.len() as u64;
        }

        let avg_doc_len = if chunks.is_empty() {
            0.0
        } else {
            total_len as f32 / chunks.len() as f32
        };

        info!(
            "Built BM25 index: {} chunks, {} terms, avgdl {:.1}, tokenizer={} in {:?}",
            chunk_ids.len(),
            postings.len(),
            avg_doc_len,
            tokenizer.name(),
            start.elapsed()
        );

        Self {
            tokenizer,
            chunk_ids,
            doc_lens,
            postings,
            avg_doc_len,
            k1: config.k1,
            b: config.b,
        }
    }

    /// Number of distinct terms
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    pub fn avg_doc_len(&self) -> f32 {
        self.avg_doc_len
    }

    pub fn tokenizer_name(&self) -> &'static str {
        self.tokenizer.name()
    }

    /// Non-negative IDF: ln(1 + (N - n + 0.5) / (n + 0.5))
    fn idf(&self, doc_freq: usize) -> f32 {
        let n_docs = self.chunk_ids.len() as f32;
        let df = doc_freq as f32;
        (1.0 + (n_docs - df + 0.5) / (df + 0.5)).ln()
    }

    fn length_norm(&self, doc: usize) -> f32 {
        if self.avg_doc_len <= 0.0 {
            return 1.0;
        }
        1.0 - self.b + self.b * self.doc_lens[doc] as f32 / self.avg_doc_len
    }

    /// Score every chunk containing at least one query term.
    ///
    /// Each occurrence of a term in the query adds its contribution, so
    /// repeated query terms weigh more.
    fn score_all(&self, query: &str) -> Vec<(usize, f32)> {
        let mut scores: HashMap<usize, f32> = HashMap::new();
        for term in self.tokenizer.tokenize(query) {
            let Some(list) = self.postings.get(&term) else {
                continue;
            };
            let idf = self.idf(list.len());
            for posting in list {
                let doc = posting.doc as usize;
                let tf = posting.tf as f32;
                let denom = tf + self.k1 * self.length_norm(doc);
                *scores.entry(doc).or_insert(0.0) += idf * tf * (self.k1 + 1.0) / denom;
            }
        }
        scores.into_iter().collect()
    }
}

impl LexicalScorer for Bm25Index {
    fn search(&self, query: &str, top_n: usize) -> Vec<RankedResult> {
        if top_n == 0 || self.chunk_ids.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }

        let mut scored = self.score_all(query);
        scored.sort_by(|(a_doc, a), (b_doc, b)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.chunk_ids[*a_doc].cmp(&self.chunk_ids[*b_doc]))
        });
        scored.truncate(top_n);
        let matched = scored.len();

        if scored.len() < top_n {
            let seen: HashSet<usize> = scored.iter().map(|(doc, _)| *doc).collect();
            let mut rest: Vec<usize> = (0..self.chunk_ids.len())
                .filter(|doc| !seen.contains(doc))
                .collect();
            rest.sort_by(|a, b| self.chunk_ids[*a].cmp(&self.chunk_ids[*b]));
            let room = top_n - scored.len();
            scored.extend(rest.into_iter().take(room).map(|doc| (doc, 0.0)));
        }

        debug!(
            "BM25 query matched {} chunks, returning {}",
            matched,
            scored.len()
        );

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (doc, score))| RankedResult {
                chunk_id: self.chunk_ids[doc].clone(),
                score,
                rank: i + 1,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.chunk_ids.len()
    }
}
