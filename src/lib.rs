//! Hybrid retrieval core: BM25 lexical scoring, exact dense vector search,
//! adaptive score fusion, MMR diversification, and a persistent embedding
//! cache, over a static corpus built once at process start.
//!
//! The embedding model, text extraction/chunking, HTTP surface, reranker,
//! and any LLM consumer are external collaborators — this crate only
//! implements the retrieval core and the black-box [`embedder::Embedder`]
//! contract they must satisfy.

pub mod bm25;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod dense;
pub mod embedder;
pub mod error;
pub mod loader;
pub mod mmr;
pub mod retriever;
pub mod simd;
pub mod tokenizer;

/// Common imports for building and querying a retriever.
pub mod prelude {
    pub use crate::bm25::Bm25Index;
    pub use crate::cache::EmbeddingCache;
    pub use crate::chunk::{Chunk, ChunkStore};
    pub use crate::config::Config;
    pub use crate::dense::VectorIndex;
    pub use crate::embedder::{CachedEmbedder, Embedder};
    pub use crate::error::RetrieveError;
    pub use crate::loader::load_corpus;
    pub use crate::retriever::{Hit, HitMode, HybridConfig, Retriever, SearchMode};
}
