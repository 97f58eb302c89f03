//! Environment-derived configuration. Loaded once at startup; everything
//! downstream treats it as immutable.

use crate::error::RetrieveError;
use crate::retriever::{HybridConfig, SearchMode};

/// Process-wide settings assembled from the environment, with a `.env` file
/// loaded first (non-fatal if absent) the way short-lived CLI tools in this
/// ecosystem do it.
#[derive(Debug, Clone)]
pub struct Config {
    pub embed_model: String,
    pub index_path: String,
    pub chunks_path: String,
    pub emb_cache: bool,
    pub emb_cache_path: String,
    pub default_mode: SearchMode,
    pub hybrid_alpha: f32,
    pub fetch_k: usize,
    pub lexical_fallback: bool,
}

fn env_bool(key: &str, default: bool) -> Result<bool, RetrieveError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(RetrieveError::InvalidParameter(format!(
                "{key}={other} is not a recognized boolean"
            ))),
        },
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, RetrieveError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| RetrieveError::InvalidParameter(format!("{key}={raw} failed to parse"))),
    }
}

impl Config {
    /// Read configuration from the process environment, loading a `.env`
    /// file first if one is present. Never fails on a missing `.env`; only
    /// fails when a present variable cannot be parsed into its expected type.
    pub fn from_env() -> Result<Self, RetrieveError> {
        let _ = dotenvy::dotenv();

        let embed_model =
            std::env::var("EMBED_MODEL").unwrap_or_else(|_| "default".to_string());
        let index_path =
            std::env::var("INDEX_PATH").unwrap_or_else(|_| "index.bin".to_string());
        let chunks_path =
            std::env::var("CHUNKS_PATH").unwrap_or_else(|_| "chunks.ndjson".to_string());
        let emb_cache = env_bool("EMB_CACHE", true)?;
        let emb_cache_path =
            std::env::var("EMB_CACHE_PATH").unwrap_or_else(|_| "embedding_cache.sqlite".to_string());

        let hybrid_alpha: f32 = env_parse("HYBRID_ALPHA", 0.65)?;
        if !(0.0..=1.0).contains(&hybrid_alpha) {
            return Err(RetrieveError::InvalidParameter(
                "HYBRID_ALPHA must be in [0, 1]".to_string(),
            ));
        }
        let fetch_k: usize = env_parse("FETCH_K", 64)?;
        let lexical_fallback = env_bool("LEXICAL_FALLBACK", true)?;

        let default_mode = match std::env::var("SEARCH_MODE")
            .unwrap_or_else(|_| "hybrid".to_string())
            .to_lowercase()
            .as_str()
        {
            "vector" => SearchMode::Vector,
            "bm25" => SearchMode::Bm25,
            "hybrid" => SearchMode::Hybrid(HybridConfig {
                alpha: hybrid_alpha,
                fetch_k,
                lexical_fallback,
                fallback_check_k: 12,
                mmr: None,
            }),
            other => {
                return Err(RetrieveError::InvalidParameter(format!(
                    "SEARCH_MODE={other} is not one of vector, bm25, hybrid"
                )))
            }
        };

        Ok(Self {
            embed_model,
            index_path,
            chunks_path,
            emb_cache,
            emb_cache_path,
            default_mode,
            hybrid_alpha,
            fetch_k,
            lexical_fallback,
        })
    }

    /// Initialize the `tracing` subscriber from `RUST_LOG` (or `info` if
    /// unset). Safe to call more than once; later calls are no-ops.
    pub fn init_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_spellings() {
        assert_eq!(env_bool("__HR_TEST_UNSET_BOOL__", true).unwrap(), true);
    }

    #[test]
    fn env_bool_rejects_garbage() {
        std::env::set_var("__HR_TEST_BOOL__", "maybe");
        let err = env_bool("__HR_TEST_BOOL__", true).unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidParameter(_)));
        std::env::remove_var("__HR_TEST_BOOL__");
    }

    #[test]
    fn alpha_out_of_range_is_rejected() {
        std::env::set_var("HYBRID_ALPHA", "1.5");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidParameter(_)));
        std::env::remove_var("HYBRID_ALPHA");
    }
}
