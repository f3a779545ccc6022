//! Hybrid retrieval combining dense and sparse search
//!
//! A request runs against exactly one [`IndexSnapshot`]. Rebuilds construct a
//! new snapshot off to the side and publish it with a pointer swap, so
//! readers never observe a half-built index.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::bm25::{Bm25Index, LexicalScorer};
use super::fusion::{fuse, to_ranked_results, RankedList, RrfConfig};
use super::reranker::{RelevanceScorer, RerankCandidate, Reranker};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Result, RetrievalError};
use crate::index::{VectorIndex, VectorScorer};
use crate::storage::ChunkSource;
use crate::types::{
    Chunk, ChunkId, Degradation, Embedding, RankedResult, SearchHit, SearchMode, SearchRequest,
    SearchResponse, VectorRecord,
};

/// Outcome of embedding the query; the error is the reason it failed
type QueryVector = std::result::Result<Embedding, String>;

/// Immutable pair of indexes plus the chunks they were built from
pub struct IndexSnapshot {
    generation: u64,
    chunks: HashMap<ChunkId, Chunk>,
    lexical: Bm25Index,
    vector: VectorIndex,
}

impl IndexSnapshot {
    /// Build both indexes.
    ///
    /// Rejects duplicate chunk ids and vector records whose chunk is not in
    /// `chunks`. Chunks without a vector are allowed and only match lexically.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<VectorRecord>, config: &Config) -> Result<Self> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            if !seen.insert(chunk.id.as_str()) {
                return Err(RetrievalError::IndexBuild(format!(
                    "duplicate chunk id {}",
                    chunk.id
                )));
            }
        }
        if let Some(dangling) = vectors.iter().find(|v| !seen.contains(v.chunk_id.as_str())) {
            return Err(RetrievalError::IndexBuild(format!(
                "vector record references unknown chunk {}",
                dangling.chunk_id
            )));
        }

        let vector = VectorIndex::build(&vectors, &config.index)?;
        let lexical = Bm25Index::build(&chunks, &config.lexical);
        let chunks = chunks.into_iter().map(|c| (c.id.clone(), c)).collect();

        Ok(Self {
            generation: 0,
            chunks,
            lexical,
            vector,
        })
    }

    /// Snapshot over an empty corpus
    pub fn empty(config: &Config) -> Result<Self> {
        Self::build(Vec::new(), Vec::new(), config)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn vector_count(&self) -> usize {
        self.vector.len()
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }

    pub fn vector(&self) -> &VectorIndex {
        &self.vector
    }
}

/// Index statistics for the published snapshot
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub chunks: usize,
    pub vectors: usize,
    pub vocabulary: usize,
    pub avg_doc_len: f32,
    pub tokenizer: &'static str,
    pub vector_backend: &'static str,
    pub dimensions: usize,
}

/// Hybrid retrieval engine combining multiple search methods
pub struct HybridRetriever {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Held for the whole of a rebuild so rebuilds never interleave
    rebuild_lock: Mutex<()>,
    next_generation: AtomicU64,
    embedder: Option<Arc<dyn Embedder>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    reranker: Reranker,
    config: Config,
}

impl HybridRetriever {
    /// Create a retriever serving an empty corpus
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RetrievalError::InvalidArgument(e.to_string()))?;
        let empty = IndexSnapshot::empty(&config)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(empty)),
            rebuild_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            embedder: None,
            scorer: None,
            reranker: Reranker::new(config.rerank.clone()),
            config,
        })
    }

    /// Query embedder for `vector` and `hybrid` modes
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Relevance scorer used when a request asks for reranking
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A request carrying the configured defaults for `top_k` and reranking
    pub fn request(&self, query: impl Into<String>, mode: SearchMode) -> SearchRequest {
        let req = SearchRequest::new(query, mode, self.config.retrieval.default_top_k);
        if self.config.rerank.enabled {
            req.with_rerank(self.config.rerank.rerank_k)
        } else {
            req
        }
    }

    /// The currently published snapshot
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    /// Rebuild both indexes from `source` and publish them.
    ///
    /// Blocks the calling thread for the duration of the build; async
    /// callers should run it on the blocking pool. Readers keep using the
    /// previous snapshot until the swap. On error nothing is published.
    pub fn rebuild(&self, source: &dyn ChunkSource) -> Result<u64> {
        let _guard = self.rebuild_lock.lock();
        let chunks = source.list_chunks()?;
        let vectors = source.list_vectors()?;
        let snapshot = IndexSnapshot::build(chunks, vectors, &self.config)?;
        Ok(self.publish(snapshot))
    }

    /// Publish a snapshot built elsewhere; returns its generation
    pub fn install(&self, snapshot: IndexSnapshot) -> u64 {
        let _guard = self.rebuild_lock.lock();
        self.publish(snapshot)
    }

    fn publish(&self, mut snapshot: IndexSnapshot) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        snapshot.generation = generation;
        info!(
            "Publishing index generation {}: {} chunks, {} vectors",
            generation,
            snapshot.chunk_count(),
            snapshot.vector_count()
        );
        *self.snapshot.write() = Arc::new(snapshot);
        generation
    }

    pub fn stats(&self) -> IndexStats {
        let snap = self.current();
        IndexStats {
            generation: snap.generation,
            chunks: snap.chunk_count(),
            vectors: snap.vector_count(),
            vocabulary: snap.lexical.vocabulary_size(),
            avg_doc_len: snap.lexical.avg_doc_len(),
            tokenizer: snap.lexical.tokenizer_name(),
            vector_backend: snap.vector.backend_name(),
            dimensions: snap.vector.dimensions(),
        }
    }

    /// Search, embedding the query through the configured embedder
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let request = self.admit(request)?;
        let snapshot = self.current();
        let deadline = self.deadline();
        if request.query.trim().is_empty() || snapshot.chunk_count() == 0 {
            return Ok(SearchResponse::empty(request.mode, snapshot.generation));
        }

        let query_vector = match request.mode {
            SearchMode::Bm25 => None,
            SearchMode::Vector | SearchMode::Hybrid => {
                Some(self.embed_query(&request.query, deadline).await)
            }
        };
        self.execute(&request, snapshot, query_vector, deadline).await
    }

    /// Search with a caller-supplied query vector, skipping the embedder.
    ///
    /// The vector stands in for the query text, so a blank query still
    /// ranks by similarity; the lexical side of a hybrid search then
    /// contributes nothing.
    pub async fn search_with_vector(
        &self,
        request: SearchRequest,
        query_vector: Embedding,
    ) -> Result<SearchResponse> {
        let request = self.admit(request)?;
        let snapshot = self.current();
        let deadline = self.deadline();
        if snapshot.chunk_count() == 0 {
            return Ok(SearchResponse::empty(request.mode, snapshot.generation));
        }
        self.execute(&request, snapshot, Some(Ok(query_vector)), deadline)
            .await
    }

    /// Validate a request and cap its page size at `max_top_k`
    fn admit(&self, request: SearchRequest) -> Result<SearchRequest> {
        request.validate()?;
        let max_top_k = self.config.retrieval.max_top_k;
        if request.top_k > max_top_k {
            debug!("Clamping top_k {} to {}", request.top_k, max_top_k);
        }
        Ok(request.clamp_top_k(max_top_k))
    }

    fn deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.config.retrieval.deadline_ms)
    }

    async fn embed_query(&self, query: &str, deadline: Instant) -> QueryVector {
        let Some(embedder) = self.embedder.clone() else {
            return Err("no query embedder configured".to_string());
        };
        let text = query.to_string();
        let task = tokio::task::spawn_blocking(move || embedder.embed(&text));
        let result = match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(Ok(vector))) => Ok(vector),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(format!("embedding task failed: {}", e)),
            Err(_) => Err("embedding exceeded the request deadline".to_string()),
        };
        if let Err(reason) = &result {
            warn!("Query embedding failed: {}", reason);
        }
        result
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        snapshot: Arc<IndexSnapshot>,
        query_vector: Option<QueryVector>,
        deadline: Instant,
    ) -> Result<SearchResponse> {
        let wanted = request.candidate_count();

        let (ranked, degraded) = match request.mode {
            SearchMode::Bm25 => {
                lexical_stage(Arc::clone(&snapshot), &request.query, wanted, deadline)
                    .await?
                    .or_partial("lexical")
            }
            SearchMode::Vector => {
                let vector = match query_vector {
                    Some(Ok(vector)) => vector,
                    Some(Err(reason)) => return Err(RetrievalError::RetrievalUnavailable(reason)),
                    None => {
                        return Err(RetrievalError::RetrievalUnavailable(
                            "no query vector".to_string(),
                        ))
                    }
                };
                vector_stage(Arc::clone(&snapshot), vector, wanted, deadline)
                    .await?
                    .or_partial("vector")
            }
            SearchMode::Hybrid => {
                let query_vector = query_vector
                    .unwrap_or_else(|| Err("no query vector".to_string()));
                self.hybrid_stage(request, &snapshot, query_vector, deadline)
                    .await?
            }
        };

        self.finish(request, &snapshot, ranked, degraded, deadline)
            .await
    }

    /// Run both stages concurrently over an overfetched depth, then fuse
    async fn hybrid_stage(
        &self,
        request: &SearchRequest,
        snapshot: &Arc<IndexSnapshot>,
        query_vector: QueryVector,
        deadline: Instant,
    ) -> Result<(Vec<RankedResult>, Option<Degradation>)> {
        let wanted = request.candidate_count();
        let fetch = wanted.saturating_mul(self.config.retrieval.overfetch_factor);

        let vector = match query_vector {
            Ok(vector) => vector,
            Err(reason) => {
                return match lexical_stage(Arc::clone(snapshot), &request.query, wanted, deadline)
                    .await?
                {
                    Stage::Ranked(lexical) => self.lexical_fallback(lexical, reason),
                    Stage::TimedOut => {
                        warn!("Vector side unavailable ({}) and lexical stage timed out", reason);
                        Ok(Stage::TimedOut.or_partial("lexical"))
                    }
                };
            }
        };

        let (lexical, dense) = tokio::join!(
            lexical_stage(Arc::clone(snapshot), &request.query, fetch, deadline),
            vector_stage(Arc::clone(snapshot), vector, fetch, deadline),
        );

        let (lexical, dense) = match (lexical, dense) {
            (Ok(Stage::Ranked(lexical)), Ok(Stage::Ranked(dense))) => (lexical, dense),
            // A dimension mismatch is a deployment inconsistency, not an outage
            (_, Err(e @ RetrievalError::DimensionMismatch { .. })) => return Err(e),
            (Ok(Stage::Ranked(mut lexical)), Ok(Stage::TimedOut)) => {
                warn!("Vector stage hit the deadline, serving lexical results");
                lexical.truncate(wanted);
                return Ok(Stage::Ranked(lexical).flagged("vector"));
            }
            (Ok(Stage::TimedOut), Ok(Stage::Ranked(mut dense))) => {
                warn!("Lexical stage hit the deadline, serving vector results");
                dense.truncate(wanted);
                return Ok(Stage::Ranked(dense).flagged("lexical"));
            }
            (Ok(Stage::TimedOut), Ok(Stage::TimedOut)) => {
                warn!("Both stages hit the deadline");
                return Ok(Stage::TimedOut.or_partial("hybrid"));
            }
            (Ok(Stage::Ranked(mut lexical)), Err(e)) => {
                lexical.truncate(wanted);
                return self.lexical_fallback(lexical, e.to_string());
            }
            (Err(e), Ok(Stage::Ranked(mut dense))) => {
                warn!("Lexical stage failed in hybrid mode, serving vector results: {}", e);
                dense.truncate(wanted);
                return Ok((
                    dense,
                    Some(Degradation::VectorOnly {
                        reason: e.to_string(),
                    }),
                ));
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        debug!(
            "Hybrid stages returned {} lexical and {} vector candidates",
            lexical.len(),
            dense.len()
        );

        let lists = [
            RankedList::new("bm25", lexical).with_weight(self.config.retrieval.lexical_weight),
            RankedList::new("vector", dense).with_weight(self.config.retrieval.vector_weight),
        ];
        let rrf = RrfConfig {
            k: self.config.retrieval.rrf_k,
        };
        let fused = fuse(&lists, self.config.retrieval.fusion, &rrf);
        let mut ranked = to_ranked_results(&fused);
        ranked.truncate(wanted);
        Ok((ranked, None))
    }

    fn lexical_fallback(
        &self,
        lexical: Vec<RankedResult>,
        reason: String,
    ) -> Result<(Vec<RankedResult>, Option<Degradation>)> {
        if !self.config.retrieval.hybrid_fallback {
            return Err(RetrievalError::RetrievalUnavailable(reason));
        }
        warn!("Vector side unavailable, serving lexical-only results: {}", reason);
        Ok((lexical, Some(Degradation::LexicalOnly { reason })))
    }

    /// Optional rerank, truncate to `top_k`, attach chunk text
    async fn finish(
        &self,
        request: &SearchRequest,
        snapshot: &IndexSnapshot,
        mut ranked: Vec<RankedResult>,
        mut degraded: Option<Degradation>,
        deadline: Instant,
    ) -> Result<SearchResponse> {
        let mut rerank_failures = Vec::new();

        if request.rerank && !ranked.is_empty() {
            let candidates: Vec<RerankCandidate> = ranked
                .iter()
                .take(request.rerank_k)
                .filter_map(|r| {
                    snapshot.chunk(&r.chunk_id).map(|c| RerankCandidate {
                        chunk_id: r.chunk_id.clone(),
                        text: c.text.clone(),
                        prior_score: r.score,
                    })
                })
                .collect();

            let outcome = self
                .reranker
                .rerank(&request.query, &candidates, self.scorer.clone(), deadline)
                .await;
            ranked = outcome.results;
            rerank_failures = outcome.failures;
            if outcome.deadline_exceeded && degraded.is_none() {
                degraded = Some(Degradation::DeadlineExceeded {
                    stage: "rerank".to_string(),
                });
            }
        }

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .filter_map(|r| snapshot.chunk(&r.chunk_id).map(|c| (r.score, c)))
            .take(request.top_k)
            .enumerate()
            .map(|(i, (score, chunk))| SearchHit {
                chunk_id: chunk.id.clone(),
                score,
                rank: i + 1,
                text: chunk.text.clone(),
                doc_id: chunk.doc_id.clone(),
                section: chunk.section.clone(),
            })
            .collect();

        debug!(
            "Search mode={} returned {} hits from generation {}",
            request.mode,
            hits.len(),
            snapshot.generation
        );

        Ok(SearchResponse {
            mode: request.mode,
            hits,
            degraded,
            rerank_failures,
            generation: snapshot.generation,
        })
    }
}

/// What a ranking stage produced before the request deadline
#[derive(Debug)]
enum Stage {
    Ranked(Vec<RankedResult>),
    /// The deadline passed first; nothing from this stage is usable
    TimedOut,
}

impl Stage {
    /// The ranking, or an empty one flagged as cut short in `stage`
    fn or_partial(self, stage: &str) -> (Vec<RankedResult>, Option<Degradation>) {
        match self {
            Stage::Ranked(results) => (results, None),
            Stage::TimedOut => (Vec::new(), Some(deadline_exceeded(stage))),
        }
    }

    /// The ranking, flagged because the `missing` stage timed out
    fn flagged(self, missing: &str) -> (Vec<RankedResult>, Option<Degradation>) {
        let results = match self {
            Stage::Ranked(results) => results,
            Stage::TimedOut => Vec::new(),
        };
        (results, Some(deadline_exceeded(missing)))
    }
}

fn deadline_exceeded(stage: &str) -> Degradation {
    Degradation::DeadlineExceeded {
        stage: stage.to_string(),
    }
}

async fn lexical_stage(
    snapshot: Arc<IndexSnapshot>,
    query: &str,
    top_n: usize,
    deadline: Instant,
) -> Result<Stage> {
    if Instant::now() >= deadline {
        return Ok(Stage::TimedOut);
    }
    let query = query.to_string();
    let task = tokio::task::spawn_blocking(move || snapshot.lexical.search(&query, top_n));
    match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(results)) => {
            debug!("BM25 stage: {} results", results.len());
            Ok(Stage::Ranked(results))
        }
        Ok(Err(e)) => Err(RetrievalError::RetrievalUnavailable(format!(
            "lexical search failed: {}",
            e
        ))),
        Err(_) => {
            warn!("Lexical stage exceeded the request deadline");
            Ok(Stage::TimedOut)
        }
    }
}

async fn vector_stage(
    snapshot: Arc<IndexSnapshot>,
    query_vector: Embedding,
    top_n: usize,
    deadline: Instant,
) -> Result<Stage> {
    // Checked up front so a bad vector is reported even past the deadline
    let expected = snapshot.vector.dimensions();
    if query_vector.len() != expected {
        return Err(RetrievalError::DimensionMismatch {
            expected,
            actual: query_vector.len(),
        });
    }
    if Instant::now() >= deadline {
        return Ok(Stage::TimedOut);
    }
    let task = tokio::task::spawn_blocking(move || snapshot.vector.search(&query_vector, top_n));
    match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(results)) => {
            let results = results?;
            debug!("Vector stage: {} results", results.len());
            Ok(Stage::Ranked(results))
        }
        Ok(Err(e)) => Err(RetrievalError::RetrievalUnavailable(format!(
            "vector search failed: {}",
            e
        ))),
        Err(_) => {
            warn!("Vector stage exceeded the request deadline");
            Ok(Stage::TimedOut)
        }
    }
}
