//! Error types for hybrid-retrieve.

use std::fmt;

/// Errors that can occur while loading, configuring, or querying the retrieval core.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrieveError {
    /// Query text tokenized to nothing, or a bm25/vector mode was asked to score
    /// an empty token/query vector where the contract requires at least one.
    EmptyQuery,
    /// No chunks are loaded; every mode returns an empty result rather than this
    /// error, but loaders use it when a required structure has zero rows.
    EmptyIndex,
    /// A request parameter failed validation (top_k <= 0, alpha outside [0,1], ...).
    InvalidParameter(String),
    /// Query and document vectors disagree in dimensionality.
    DimensionMismatch { query_dim: usize, doc_dim: usize },
    /// Startup failed to load the chunk file or the vector index: malformed
    /// records, a chunk/vector count mismatch, or an unreadable path.
    LoadFailure(String),
    /// The black-box embedder returned an error; propagated verbatim, never retried.
    EmbedderFailure(String),
    /// Catch-all for conditions with no dedicated variant.
    Other(String),
}

impl fmt::Display for RetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveError::EmptyQuery => write!(f, "query is empty"),
            RetrieveError::EmptyIndex => write!(f, "index is empty"),
            RetrieveError::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            RetrieveError::DimensionMismatch { query_dim, doc_dim } => write!(
                f,
                "dimension mismatch: query has {query_dim} dimensions, document has {doc_dim}"
            ),
            RetrieveError::LoadFailure(msg) => write!(f, "failed to load corpus: {msg}"),
            RetrieveError::EmbedderFailure(msg) => write!(f, "embedder failed: {msg}"),
            RetrieveError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RetrieveError {}

impl From<std::io::Error> for RetrieveError {
    fn from(err: std::io::Error) -> Self {
        RetrieveError::LoadFailure(err.to_string())
    }
}

impl From<serde_json::Error> for RetrieveError {
    fn from(err: serde_json::Error) -> Self {
        RetrieveError::LoadFailure(err.to_string())
    }
}

impl From<rusqlite::Error> for RetrieveError {
    fn from(err: rusqlite::Error) -> Self {
        RetrieveError::Other(format!("cache backend error: {err}"))
    }
}
