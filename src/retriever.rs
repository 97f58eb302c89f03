//! Orchestrates the three retrieval modes, the adaptive-α hybrid fusion, and
//! optional MMR diversification. This is the single dispatch point the
//! modes below are designed around — see [`SearchMode`].

use crate::bm25::Bm25Index;
use crate::chunk::ChunkStore;
use crate::dense::VectorIndex;
use crate::embedder::{CachedEmbedder, Embedder};
use crate::error::RetrieveError;
use crate::mmr;
use crate::tokenizer::tokenize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Per-request defaults, mirrored from the configuration surface.
pub const DEFAULT_TOP_K: usize = 8;

/// Configuration for hybrid mode. Defaults match the documented request
/// defaults: `fetch_k=64, alpha=0.65, lexical_fallback=true,
/// fallback_check_k=12, mmr=None`.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub fetch_k: usize,
    pub alpha: f32,
    pub lexical_fallback: bool,
    pub fallback_check_k: usize,
    /// `Some(lambda)` enables MMR diversification with that λ.
    pub mmr: Option<f32>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            fetch_k: 64,
            alpha: 0.65,
            lexical_fallback: true,
            fallback_check_k: 12,
            mmr: None,
        }
    }
}

/// A closed variant over the three retrieval modes; fusion and
/// adaptive-α logic depend on knowing every branch, so this is deliberately
/// not open to extension.
#[derive(Debug, Clone)]
pub enum SearchMode {
    Vector,
    Bm25,
    Hybrid(HybridConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitMode {
    Vector,
    Bm25,
    Hybrid,
    HybridFallback,
}

impl fmt::Display for HitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HitMode::Vector => "vector",
            HitMode::Bm25 => "bm25",
            HitMode::Hybrid => "hybrid",
            HitMode::HybridFallback => "hybrid-fallback",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub score: f32,
    pub text: String,
    pub chunk_id: String,
    pub doc_path: String,
    pub mode: HitMode,
}

/// Owns the BM25 tables and the loaded chunk store exclusively; shares the
/// vector index and cached embedder by reference since both are immutable
/// after load and may be reused by other callers.
pub struct Retriever<'a, E: Embedder> {
    bm25: Bm25Index,
    chunks: ChunkStore,
    vector_index: &'a VectorIndex,
    embedder: &'a CachedEmbedder<E>,
}

impl<'a, E: Embedder> Retriever<'a, E> {
    pub fn new(
        chunks: ChunkStore,
        vector_index: &'a VectorIndex,
        embedder: &'a CachedEmbedder<E>,
    ) -> Self {
        let bm25 = Bm25Index::from_texts(&chunks.texts());
        Self {
            bm25,
            chunks,
            vector_index,
            embedder,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    fn hit_for(&self, idx: u32, score: f32, mode: HitMode) -> Hit {
        let chunk = self.chunks.get(idx as usize).expect("candidate index is in range");
        Hit {
            score,
            text: chunk.text.clone(),
            chunk_id: chunk.chunk_id.clone(),
            doc_path: chunk.doc_path.clone(),
            mode,
        }
    }

    /// Single dispatch point for all three modes.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        mode: &SearchMode,
    ) -> Result<Vec<Hit>, RetrieveError> {
        let mode_name = match mode {
            SearchMode::Vector => "vector",
            SearchMode::Bm25 => "bm25",
            SearchMode::Hybrid(_) => "hybrid",
        };
        let span = tracing::debug_span!("retriever.search", mode = mode_name, top_k, query_len = query.len());
        let _enter = span.enter();

        if top_k == 0 {
            return Err(RetrieveError::InvalidParameter(
                "top_k must be >= 1".to_string(),
            ));
        }
        if self.chunks.is_empty() {
            tracing::debug!("empty corpus; returning no hits");
            return Ok(Vec::new());
        }

        let result = match mode {
            SearchMode::Vector => self.search_vector(query, top_k),
            SearchMode::Bm25 => self.search_bm25(query, top_k),
            SearchMode::Hybrid(cfg) => self.search_hybrid(query, top_k, cfg),
        };
        if let Ok(hits) = &result {
            tracing::debug!(hit_count = hits.len(), "search complete");
        }
        result
    }

    fn search_vector(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, RetrieveError> {
        let query_vec = self.embed_query(query)?;
        let results = self.vector_index.search(&query_vec, top_k)?;
        Ok(results
            .into_iter()
            .map(|(idx, score)| self.hit_for(idx, score, HitMode::Vector))
            .collect())
    }

    fn search_bm25(&self, query: &str, top_k: usize) -> Result<Vec<Hit>, RetrieveError> {
        let tokens = tokenize(query);
        let scores = self.bm25.get_scores(&tokens);
        let mut ranked: Vec<(u32, f32)> = scores
            .into_iter()
            .enumerate()
            .map(|(idx, score)| (idx as u32, score))
            .collect();
        sort_by_score_desc_index_asc(&mut ranked);
        ranked.truncate(top_k);
        Ok(ranked
            .into_iter()
            .map(|(idx, score)| self.hit_for(idx, score, HitMode::Bm25))
            .collect())
    }

    fn search_hybrid(
        &self,
        query: &str,
        top_k: usize,
        cfg: &HybridConfig,
    ) -> Result<Vec<Hit>, RetrieveError> {
        if !(0.0..=1.0).contains(&cfg.alpha) {
            return Err(RetrieveError::InvalidParameter(
                "alpha must be in [0, 1]".to_string(),
            ));
        }
        let fetch_k = cfg.fetch_k.min(self.chunks.len()).max(1);

        // Step 1: vector candidates.
        let query_vec = self.embed_query(query)?;
        let vector_hits = self.vector_index.search(&query_vec, fetch_k)?;
        let vector_scores: HashMap<u32, f32> = vector_hits.iter().cloned().collect();

        // Step 2: bm25 candidates.
        let tokens = tokenize(query);
        let bm25_scores_dense = self.bm25.get_scores(&tokens);
        let mut bm25_ranked: Vec<(u32, f32)> = bm25_scores_dense
            .iter()
            .enumerate()
            .map(|(idx, &score)| (idx as u32, score))
            .collect();
        sort_by_score_desc_index_asc(&mut bm25_ranked);
        bm25_ranked.truncate(fetch_k);
        let bm25_scores: HashMap<u32, f32> = bm25_ranked.into_iter().collect();

        // Step 3: adaptive alpha via lexical overlap of the query against the
        // top `fallback_check_k` vector candidates.
        let query_token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let alpha_used = if cfg.lexical_fallback && !query_token_set.is_empty() {
            let overlap = lexical_overlap_ratio(
                self,
                &vector_hits,
                cfg.fallback_check_k,
                &query_token_set,
            );
            if overlap < 0.15 {
                tracing::debug!(overlap, "lexical overlap below threshold; reducing alpha");
                cfg.alpha.min(0.3)
            } else {
                cfg.alpha
            }
        } else {
            cfg.alpha
        };

        // Step 4: independent min-max normalization over the union candidates.
        let candidate_ids: HashSet<u32> = vector_scores
            .keys()
            .chain(bm25_scores.keys())
            .copied()
            .collect();
        let normalized_vector = normalize_scores(&vector_scores);
        let normalized_bm25 = normalize_scores(&bm25_scores);

        // Step 5: fuse.
        let mut fused: Vec<(u32, f32)> = candidate_ids
            .into_iter()
            .map(|idx| {
                let v_hat = normalized_vector.get(&idx).copied().unwrap_or(0.0);
                let b_hat = normalized_bm25.get(&idx).copied().unwrap_or(0.0);
                (idx, alpha_used * v_hat + (1.0 - alpha_used) * b_hat)
            })
            .collect();

        // Step 6: sort and retain max(top_k, 2).
        sort_by_score_desc_index_asc(&mut fused);
        fused.truncate(top_k.max(2));

        let mode = if cfg.lexical_fallback && alpha_used != cfg.alpha {
            HitMode::HybridFallback
        } else {
            HitMode::Hybrid
        };

        // Step 7: optional MMR, else plain truncation.
        let ordered_ids: Vec<u32> = if let Some(lambda) = cfg.mmr {
            let passage_vectors = self.embed_passages_for(&fused.iter().map(|(i, _)| *i).collect::<Vec<_>>())?;
            let candidates: Vec<(u32, Vec<f32>)> = fused
                .iter()
                .map(|(idx, _)| *idx)
                .zip(passage_vectors)
                .collect();
            mmr::select(&query_vec, &candidates, top_k, lambda)
        } else {
            fused.iter().take(top_k).map(|(idx, _)| *idx).collect()
        };

        let fused_score: HashMap<u32, f32> = fused.into_iter().collect();
        Ok(ordered_ids
            .into_iter()
            .map(|idx| {
                let score = fused_score.get(&idx).copied().unwrap_or(0.0);
                self.hit_for(idx, score, mode)
            })
            .collect())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrieveError> {
        let mut rows = self.embedder.embed_queries(&[query.to_string()])?;
        rows.pop()
            .ok_or_else(|| RetrieveError::Other("embedder returned no rows".to_string()))
    }

    fn embed_passages_for(&self, ids: &[u32]) -> Result<Vec<Vec<f32>>, RetrieveError> {
        let texts: Vec<String> = ids
            .iter()
            .map(|&idx| self.chunks.get(idx as usize).expect("candidate in range").text.clone())
            .collect();
        self.embedder.embed_passages(&texts)
    }
}

fn sort_by_score_desc_index_asc(items: &mut [(u32, f32)]) {
    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

/// Min-max normalize a score map to [0, 1]; a degenerate spread (max - min <
/// 1e-9) maps every present value to 1.0 rather than dividing by ~zero.
fn normalize_scores(values: &HashMap<u32, f32>) -> HashMap<u32, f32> {
    if values.is_empty() {
        return HashMap::new();
    }
    let min = values.values().copied().fold(f32::INFINITY, f32::min);
    let max = values.values().copied().fold(f32::NEG_INFINITY, f32::max);
    if max - min < 1e-9 {
        values.keys().map(|&k| (k, 1.0)).collect()
    } else {
        values
            .iter()
            .map(|(&k, &v)| (k, (v - min) / (max - min)))
            .collect()
    }
}

fn lexical_overlap_ratio<E: Embedder>(
    retriever: &Retriever<'_, E>,
    vector_hits: &[(u32, f32)],
    fallback_check_k: usize,
    query_tokens: &HashSet<&str>,
) -> f32 {
    let check_k = fallback_check_k.min(vector_hits.len());
    let mut overlap_count = 0usize;
    for &(idx, _) in vector_hits.iter().take(check_k) {
        let chunk = retriever.chunks.get(idx as usize).expect("candidate in range");
        let chunk_tokens: HashSet<String> = tokenize(&chunk.text).into_iter().collect();
        overlap_count += query_tokens
            .iter()
            .filter(|t| chunk_tokens.contains(**t))
            .count();
    }
    let denominator = (fallback_check_k * query_tokens.len()).max(1) as f32;
    overlap_count as f32 / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::embedder::HashingEmbedder;

    fn corpus_texts() -> Vec<&'static str> {
        vec![
            "the quick brown fox",
            "quick foxes leap high",
            "lazy dogs sleep",
            "brown bears roam",
        ]
    }

    fn build_retriever(
        vocab: Vec<&str>,
    ) -> (ChunkStore, VectorIndex, CachedEmbedder<HashingEmbedder>) {
        let texts = corpus_texts();
        let chunks = ChunkStore::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Chunk {
                    chunk_id: format!("c{i}"),
                    doc_path: format!("doc{i}.md"),
                    text: t.to_string(),
                })
                .collect(),
        );
        let vocab: Vec<String> = vocab.into_iter().map(String::from).collect();
        let embedder = HashingEmbedder::new(vocab.clone());
        let mut index = VectorIndex::new(vocab.len());
        for text in &texts {
            let v = embedder.embed_passages(&[text.to_string()]).unwrap().remove(0);
            index.add(&[v]).unwrap();
        }
        let cached = CachedEmbedder::new(embedder, None, "test-model");
        (chunks, index, cached)
    }

    fn vocab() -> Vec<&'static str> {
        vec![
            "the", "quick", "brown", "fox", "foxes", "leap", "high", "lazy", "dogs", "sleep",
            "bears", "roam",
        ]
    }

    #[test]
    fn bm25_mode_ranks_shorter_exact_match_first() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let hits = retriever.search("quick fox", 2, &SearchMode::Bm25).unwrap();
        assert_eq!(hits[0].chunk_id, "c0");
        assert!(hits.iter().all(|h| h.mode == HitMode::Bm25));
    }

    #[test]
    fn vector_mode_ties_break_by_ascending_chunk_index() {
        let (chunks, index, embedder) = build_retriever(vec!["fox"]);
        let retriever = Retriever::new(chunks, &index, &embedder);
        let hits = retriever.search("fox", 2, &SearchMode::Vector).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c0");
        assert_eq!(hits[1].chunk_id, "c1");
    }

    #[test]
    fn top_k_exceeding_corpus_size_returns_every_chunk_once() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let hits = retriever.search("fox", 10, &SearchMode::Vector).unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn hybrid_alpha_one_matches_vector_ordering_over_union_candidates() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let cfg = HybridConfig {
            fetch_k: 4,
            alpha: 1.0,
            lexical_fallback: false,
            fallback_check_k: 12,
            mmr: None,
        };
        let hybrid_hits = retriever
            .search("quick brown", 4, &SearchMode::Hybrid(cfg))
            .unwrap();
        let vector_hits = retriever.search("quick brown", 4, &SearchMode::Vector).unwrap();
        let hybrid_order: Vec<&str> = hybrid_hits.iter().map(|h| h.chunk_id.as_str()).collect();
        let vector_order: Vec<&str> = vector_hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(hybrid_order, vector_order);
    }

    #[test]
    fn hybrid_scores_are_bounded_to_unit_interval() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let hits = retriever
            .search("quick brown", 4, &SearchMode::Hybrid(HybridConfig::default()))
            .unwrap();
        for hit in &hits {
            assert!(hit.score >= 0.0 && hit.score <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn lambda_one_mmr_matches_plain_hybrid_truncation() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let mut cfg = HybridConfig {
            alpha: 1.0,
            lexical_fallback: false,
            ..HybridConfig::default()
        };
        let without_mmr = retriever
            .search("quick brown", 4, &SearchMode::Hybrid(cfg.clone()))
            .unwrap();
        cfg.mmr = Some(1.0);
        let with_mmr = retriever
            .search("quick brown", 4, &SearchMode::Hybrid(cfg))
            .unwrap();
        let ids_without: Vec<&str> = without_mmr.iter().map(|h| h.chunk_id.as_str()).collect();
        let ids_with: Vec<&str> = with_mmr.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids_without, ids_with);
    }

    #[test]
    fn top_k_zero_is_rejected() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let err = retriever.search("fox", 0, &SearchMode::Vector).unwrap_err();
        assert!(matches!(err, RetrieveError::InvalidParameter(_)));
    }

    #[test]
    fn empty_corpus_returns_empty_for_every_mode() {
        let chunks = ChunkStore::new(vec![]);
        let index = VectorIndex::new(4);
        let embedder = CachedEmbedder::new(HashingEmbedder::new(vec!["fox".into()]), None, "m");
        let retriever = Retriever::new(chunks, &index, &embedder);
        for mode in [
            SearchMode::Vector,
            SearchMode::Bm25,
            SearchMode::Hybrid(HybridConfig::default()),
        ] {
            assert_eq!(retriever.search("fox", 3, &mode).unwrap().len(), 0);
        }
    }

    #[test]
    fn no_duplicate_hits_when_top_k_exceeds_n() {
        let (chunks, index, embedder) = build_retriever(vocab());
        let retriever = Retriever::new(chunks, &index, &embedder);
        let hits = retriever
            .search("quick brown", 10, &SearchMode::Hybrid(HybridConfig::default()))
            .unwrap();
        assert_eq!(hits.len(), 4);
        let mut ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
