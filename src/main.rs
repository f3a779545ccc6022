//! hybrid-rag: development harness for the hybrid retrieval engine
//!
//! Loads a JSON-lines corpus, builds both indexes and runs one query.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybrid_rag::{
    config::Config,
    embedding::HashingEmbedder,
    retrieval::{HybridRetriever, TermOverlapScorer},
    storage::JsonlStore,
    types::{SearchMode, SearchRequest, SearchResponse},
    util::truncate_str,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "hybrid-rag")]
#[command(about = "Hybrid BM25 + vector retrieval with rank fusion and reranking")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a corpus
    Search {
        /// Search query
        query: String,

        /// Directory holding chunks.jsonl and vectors.jsonl
        #[arg(short, long)]
        data: PathBuf,

        /// Retrieval mode (vector, bm25, hybrid)
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Rerank the fused candidates
        #[arg(long)]
        rerank: bool,

        /// Candidates passed to the reranker
        #[arg(long)]
        rerank_k: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show index statistics for a corpus
    Stats {
        /// Directory holding chunks.jsonl and vectors.jsonl
        #[arg(short, long)]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.logging.init(cli.verbose)?;

    match cli.command {
        Commands::Search {
            query,
            data,
            mode,
            top_k,
            rerank,
            rerank_k,
            format,
        } => {
            let mode: SearchMode = mode.parse()?;
            let retriever = open_retriever(config, &data).await?;

            let request = apply_overrides(
                retriever.request(query, mode),
                top_k,
                rerank,
                rerank_k,
                retriever.config().rerank.rerank_k,
            );

            let response = retriever.search(request).await?;
            print_response(&response, &format)?;
        }

        Commands::Stats { data } => {
            let retriever = open_retriever(config, &data).await?;
            let stats = retriever.stats();

            println!("\nIndex Statistics:");
            println!("=================");
            println!("Data directory:   {}", data.display());
            println!("Generation:       {}", stats.generation);
            println!("Chunks:           {}", stats.chunks);
            println!("Vectors:          {}", stats.vectors);
            println!("Vocabulary:       {}", stats.vocabulary);
            println!("Avg chunk length: {:.1} tokens", stats.avg_doc_len);
            println!("Tokenizer:        {}", stats.tokenizer);
            println!(
                "Vector backend:   {} ({} dimensions)",
                stats.vector_backend, stats.dimensions
            );
        }
    }

    Ok(())
}

/// Apply command-line overrides to a request built from the config.
///
/// Values are passed through as given; an inconsistent pair such as a
/// `--rerank-k` below `--top-k` is left for the retriever to reject.
fn apply_overrides(
    mut request: SearchRequest,
    top_k: Option<usize>,
    rerank: bool,
    rerank_k: Option<usize>,
    configured_rerank_k: usize,
) -> SearchRequest {
    if let Some(top_k) = top_k {
        request.top_k = top_k;
    }
    if rerank || rerank_k.is_some() {
        let k = rerank_k.unwrap_or(if request.rerank {
            request.rerank_k
        } else {
            configured_rerank_k
        });
        request = request.with_rerank(k);
    }
    request
}

/// Build a retriever over the corpus in `data`
async fn open_retriever(config: Config, data: &Path) -> Result<Arc<HybridRetriever>> {
    let embedder = HashingEmbedder::new(config.index.dimensions)
        .context("Failed to initialize query embedder")?;
    let retriever = Arc::new(
        HybridRetriever::new(config)?
            .with_embedder(Arc::new(embedder))
            .with_scorer(Arc::new(TermOverlapScorer)),
    );

    let store = JsonlStore::open(data)?;
    info!("Building indexes from {}", store.dir().display());
    let builder = Arc::clone(&retriever);
    let generation = tokio::task::spawn_blocking(move || builder.rebuild(&store))
        .await
        .context("Index build task failed")??;
    info!("Serving index generation {}", generation);

    Ok(retriever)
}

fn print_response(response: &SearchResponse, format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        _ => {
            println!(
                "\nSearch Results ({} hits, mode {}):\n",
                response.hits.len(),
                response.mode
            );
            for hit in &response.hits {
                println!(
                    "{}. [Score: {:.4}] {} ({})",
                    hit.rank,
                    hit.score,
                    hit.chunk_id,
                    hit.section.as_deref().unwrap_or(&hit.doc_id),
                );
                println!("   {}", truncate_str(&hit.text, 200));
            }
            if let Some(degraded) = &response.degraded {
                println!("\nPartial result: {:?}", degraded);
            }
            for failure in &response.rerank_failures {
                println!("Rerank skipped {}: {}", failure.chunk_id, failure.reason);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(rerank: bool) -> SearchRequest {
        let req = SearchRequest::new("refund", SearchMode::Hybrid, 5);
        if rerank {
            req.with_rerank(20)
        } else {
            req
        }
    }

    #[test]
    fn test_overrides_pass_values_through() {
        let req = apply_overrides(base(false), Some(8), true, Some(12), 20);
        assert_eq!(req.top_k, 8);
        assert!(req.rerank);
        assert_eq!(req.rerank_k, 12);

        let req = apply_overrides(base(false), None, true, None, 20);
        assert_eq!(req.rerank_k, 20);

        let req = apply_overrides(base(false), Some(3), false, None, 20);
        assert_eq!(req.top_k, 3);
        assert!(!req.rerank);
    }

    #[test]
    fn test_rerank_k_below_top_k_is_rejected_on_every_path() {
        // Explicit flags
        let req = apply_overrides(base(false), Some(30), true, Some(10), 20);
        assert_eq!(req.rerank_k, 10);
        assert!(req.validate().is_err());

        // Configured rerank depth with a larger --top-k
        let req = apply_overrides(base(false), Some(30), true, None, 20);
        assert_eq!(req.rerank_k, 20);
        assert!(req.validate().is_err());

        // Reranking switched on in the config
        let req = apply_overrides(base(true), Some(30), false, None, 20);
        assert_eq!(req.rerank_k, 20);
        assert!(req.validate().is_err());
    }
}
