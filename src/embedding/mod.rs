//! Query embedding capability
//!
//! The retriever embeds query text through [`Embedder`]; chunk vectors are
//! precomputed and arrive through storage. [`HashingEmbedder`] is a
//! deterministic stand-in for development and tests.

mod hashing;
mod traits;

pub use hashing::HashingEmbedder;
pub use traits::{Embedder, EmbeddingError, EmbeddingResult};
