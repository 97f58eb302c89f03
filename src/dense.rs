//! In-memory vector index: holds N unit vectors of dimension d and answers
//! top-k queries by inner product. Since every stored and query vector is
//! L2-normalized, inner product and cosine similarity coincide.

use crate::error::RetrieveError;
use crate::simd::dot;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

const MAGIC: [u8; 4] = *b"RVEC";
const FORMAT_VERSION: u32 = 1;

/// Row-major store of N vectors of dimension `dim`. Built once, read many
/// times; there is no remove or update operation.
pub struct VectorIndex {
    dim: usize,
    rows: Vec<f32>, // len == count * dim
    count: usize,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            rows: Vec::new(),
            count: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append `vectors` in order, assigning contiguous indices starting at
    /// the current length.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), RetrieveError> {
        for v in vectors {
            if v.len() != self.dim {
                return Err(RetrieveError::DimensionMismatch {
                    query_dim: self.dim,
                    doc_dim: v.len(),
                });
            }
            self.rows.extend_from_slice(v);
            self.count += 1;
        }
        Ok(())
    }

    fn row(&self, idx: usize) -> &[f32] {
        &self.rows[idx * self.dim..(idx + 1) * self.dim]
    }

    /// Top-k chunk indices by inner product against `query`, descending by
    /// score with `(score, index)` tie-breaking for determinism. `k` is
    /// clipped to `len()`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, RetrieveError> {
        if query.len() != self.dim {
            return Err(RetrieveError::DimensionMismatch {
                query_dim: query.len(),
                doc_dim: self.dim,
            });
        }
        if self.count == 0 {
            return Ok(Vec::new());
        }
        let k = k.min(self.count);
        if k == 0 {
            return Ok(Vec::new());
        }

        // Reverse-ordered heap of the worst-so-far top-k, keyed on
        // (score, -index) so a lower score (or, on tie, a larger index)
        // sits at the top and gets evicted first.
        #[derive(PartialEq)]
        struct Candidate(f32, u32);
        impl Eq for Candidate {}
        impl PartialOrd for Candidate {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }
        impl Ord for Candidate {
            fn cmp(&self, other: &Self) -> Ordering {
                match self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => other.1.cmp(&self.1),
                    ord => ord,
                }
            }
        }

        let mut heap: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        for idx in 0..self.count {
            let score = dot(query, self.row(idx));
            let candidate = Candidate(score, idx as u32);
            if heap.len() < k {
                heap.push(std::cmp::Reverse(candidate));
            } else if let Some(std::cmp::Reverse(worst)) = heap.peek() {
                if candidate.cmp(worst) == Ordering::Greater {
                    heap.pop();
                    heap.push(std::cmp::Reverse(candidate));
                }
            }
        }

        let mut results: Vec<(u32, f32)> = heap
            .into_iter()
            .map(|std::cmp::Reverse(Candidate(score, idx))| (idx, score))
            .collect();
        results.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.0.cmp(&b.0),
            ord => ord,
        });
        Ok(results)
    }

    /// Score for a single stored row against `query`, used by MMR to compute
    /// `⟨q, p_j⟩` without a full top-k scan.
    pub fn score_row(&self, idx: usize, query: &[f32]) -> f32 {
        dot(query, self.row(idx))
    }

    /// Serialize as `magic | format_version | dim | count | rows...` with all
    /// integers little-endian and rows stored as raw f32 bytes.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), RetrieveError> {
        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(self.dim as u32)?;
        writer.write_u32::<LittleEndian>(self.count as u32)?;
        for &value in &self.rows {
            writer.write_f32::<LittleEndian>(value)?;
        }
        Ok(())
    }

    /// Parse the format written by [`VectorIndex::write`].
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, RetrieveError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(RetrieveError::LoadFailure(
                "vector index file has an invalid magic header".to_string(),
            ));
        }
        let format_version = reader.read_u32::<LittleEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(RetrieveError::LoadFailure(format!(
                "unsupported vector index format version {format_version}"
            )));
        }
        let dim = reader.read_u32::<LittleEndian>()? as usize;
        let count = reader.read_u32::<LittleEndian>()? as usize;
        let mut rows = Vec::with_capacity(dim * count);
        for _ in 0..(dim * count) {
            rows.push(reader.read_f32::<LittleEndian>()?);
        }
        Ok(Self { dim, rows, count })
    }
}
