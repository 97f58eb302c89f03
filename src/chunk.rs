//! Read-only access to the loaded corpus. The integer position of a chunk in
//! this store is the shared index used by the BM25 index and the vector
//! index; all three are built once at startup and never mutated.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_path: String,
    pub text: String,
}

/// Immutable, zero-indexed view over the corpus.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }
}
