//! Okapi BM25 scoring over an in-memory inverted index.
//!
//! Fixed `k1 = 1.5, b = 0.75` per the scoring contract; unlike the teacher
//! lineage this index does not expose BM25L/BM25+ variants — the fusion and
//! adaptive-alpha rules downstream assume exactly this formula, so the extra
//! generality has no caller and is dropped.

use crate::tokenizer::tokenize;
use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// Per-chunk term frequencies plus the corpus-wide statistics needed for
/// Okapi BM25 scoring. Built once at load time and never mutated afterward —
/// every field, including `idf`, is computed during `build()` so the
/// structure is `Sync` and `search` can be called concurrently from multiple
/// threads over a shared `&Bm25Index`.
pub struct Bm25Index {
    /// term -> (chunk_index -> term frequency in that chunk)
    postings: HashMap<String, HashMap<u32, u32>>,
    doc_lengths: Vec<u32>,
    doc_frequencies: HashMap<String, u32>,
    num_docs: u32,
    avg_doc_length: f32,
    idf: HashMap<String, f32>,
}

impl Bm25Index {
    /// Build an index from already-tokenized chunks, one token list per chunk,
    /// in chunk-index order.
    pub fn build(tokenized_chunks: &[Vec<String>]) -> Self {
        let num_docs = tokenized_chunks.len() as u32;
        let mut postings: HashMap<String, HashMap<u32, u32>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(tokenized_chunks.len());
        let mut doc_frequencies: HashMap<String, u32> = HashMap::new();

        for (idx, tokens) in tokenized_chunks.iter().enumerate() {
            let doc_id = idx as u32;
            doc_lengths.push(tokens.len() as u32);

            let mut seen_in_doc: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *seen_in_doc.entry(token.as_str()).or_insert(0) += 1;
            }
            for (term, tf) in seen_in_doc {
                postings
                    .entry(term.to_string())
                    .or_default()
                    .insert(doc_id, tf);
                *doc_frequencies.entry(term.to_string()).or_insert(0) += 1;
            }
        }

        let total_length: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = if num_docs == 0 {
            0.0
        } else {
            total_length as f32 / num_docs as f32
        };

        let n = num_docs as f32;
        let idf = doc_frequencies
            .iter()
            .map(|(term, &df)| {
                let df = df as f32;
                (term.clone(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        Self {
            postings,
            doc_lengths,
            doc_frequencies,
            num_docs,
            avg_doc_length,
            idf,
        }
    }

    /// Build from raw chunk text, tokenizing each chunk with [`tokenize`].
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        let tokenized: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t.as_ref())).collect();
        Self::build(&tokenized)
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs as usize
    }

    fn idf(&self, term: &str) -> f32 {
        self.idf.get(term).copied().unwrap_or(0.0)
    }

    /// Score already-tokenized query terms against every chunk, returning a
    /// dense array of length `num_docs()` aligned with chunk index.
    pub fn get_scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.num_docs as usize];
        if self.num_docs == 0 || query_tokens.is_empty() {
            return scores;
        }

        let avgdl = if self.avg_doc_length == 0.0 {
            1.0
        } else {
            self.avg_doc_length
        };

        for term in query_tokens {
            let Some(doc_tfs) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term);
            for (&doc_id, &tf) in doc_tfs {
                let dl = self.doc_lengths[doc_id as usize];
                let dl = if dl == 0 { 1 } else { dl } as f32;
                let tf = tf as f32;
                let numerator = idf * tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * dl / avgdl);
                scores[doc_id as usize] += numerator / denominator;
            }
        }
        scores
    }

    /// Convenience wrapper: tokenize `query` then score it.
    pub fn score_query(&self, query: &str) -> Vec<f32> {
        self.get_scores(&tokenize(query))
    }
}
