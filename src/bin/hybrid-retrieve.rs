use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybrid_retrieve::prelude::*;
use hybrid_retrieve::embedder::HashingEmbedder;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query against the configured corpus.
    Search {
        query: String,
        #[arg(long, default_value_t = hybrid_retrieve::retriever::DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long, default_value = "hybrid")]
        mode: String,
        #[arg(long)]
        mmr: Option<f32>,
    },
    /// Print corpus and cache statistics.
    Stats,
}

/// The embedder contract is deliberately an external collaborator — this
/// crate owns the retrieval core, not a model. The CLI wires up a
/// deterministic stand-in over the loaded corpus's vocabulary so `search`
/// works end to end without a real model configured; swap in a production
/// `Embedder` impl for real deployments.
fn vocabulary(chunks: &ChunkStore) -> Vec<String> {
    let mut vocab = std::collections::BTreeSet::new();
    for chunk in chunks.iter() {
        for token in hybrid_retrieve::tokenizer::tokenize(&chunk.text) {
            vocab.insert(token);
        }
    }
    vocab.into_iter().collect()
}

fn parse_mode(raw: &str, top_k: usize, mmr: Option<f32>, config: &Config) -> Result<SearchMode> {
    match raw {
        "vector" => Ok(SearchMode::Vector),
        "bm25" => Ok(SearchMode::Bm25),
        "hybrid" => Ok(SearchMode::Hybrid(HybridConfig {
            fetch_k: config.fetch_k,
            alpha: config.hybrid_alpha,
            lexical_fallback: config.lexical_fallback,
            fallback_check_k: 12,
            mmr,
        })),
        other => anyhow::bail!("unknown mode: {other} (expected vector, bm25, or hybrid); top_k={top_k}"),
    }
}

fn main() -> Result<()> {
    Config::init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    let (chunks, vector_index) = load_corpus(&config.chunks_path, &config.index_path)
        .context("loading chunk store and vector index")?;

    let cache = if config.emb_cache {
        Some(EmbeddingCache::open(&config.emb_cache_path).context("opening embedding cache")?)
    } else {
        None
    };
    let embedder = CachedEmbedder::new(
        HashingEmbedder::new(vocabulary(&chunks)),
        cache,
        config.embed_model.clone(),
    );
    let retriever = Retriever::new(chunks, &vector_index, &embedder);

    match cli.command {
        Commands::Search { query, top_k, mode, mmr } => {
            let mode = parse_mode(&mode, top_k, mmr, &config)?;
            let hits = retriever.search(&query, top_k, &mode)?;
            for hit in hits {
                println!("{:.4}\t[{}]\t{}\t{}", hit.score, hit.mode, hit.chunk_id, hit.text);
            }
        }
        Commands::Stats => {
            println!("chunks: {}", retriever.len());
            println!("vector dim: {}", vector_index.dim());
        }
    }

    Ok(())
}
