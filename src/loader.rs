//! Startup loading of the two persisted, read-only structures: the
//! newline-delimited chunk file and the binary vector-index file. Fails fast
//! on a malformed record or a chunk/vector count mismatch so a broken corpus
//! never serves partial results silently.

use crate::chunk::{Chunk, ChunkStore};
use crate::dense::VectorIndex;
use crate::error::RetrieveError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Parse one JSON object per line; unknown fields are ignored by `serde`'s
/// default behavior. Blank lines are skipped.
pub fn load_chunks<P: AsRef<Path>>(path: P) -> Result<ChunkStore, RetrieveError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut chunks = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line).map_err(|err| {
            RetrieveError::LoadFailure(format!("chunk file line {}: {err}", line_no + 1))
        })?;
        chunks.push(chunk);
    }
    Ok(ChunkStore::new(chunks))
}

/// Read the binary vector-index format produced by [`VectorIndex::write`].
pub fn load_vector_index<P: AsRef<Path>>(path: P) -> Result<VectorIndex, RetrieveError> {
    let mut file = BufReader::new(File::open(path)?);
    VectorIndex::read(&mut file)
}

/// Load both structures and verify they describe the same corpus.
pub fn load_corpus<P: AsRef<Path>>(
    chunks_path: P,
    index_path: P,
) -> Result<(ChunkStore, VectorIndex), RetrieveError> {
    let chunks = load_chunks(chunks_path)?;
    let index = load_vector_index(index_path)?;
    if chunks.len() != index.len() {
        return Err(RetrieveError::LoadFailure(format!(
            "chunk count ({}) does not match vector count ({})",
            chunks.len(),
            index.len()
        )));
    }
    Ok((chunks, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_ndjson_chunk_records_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"chunk_id":"c0","doc_path":"a.md","text":"alpha"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"chunk_id":"c1","doc_path":"b.md","text":"beta","extra":1}}"#).unwrap();
        let store = load_chunks(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().chunk_id, "c0");
        assert_eq!(store.get(1).unwrap().text, "beta");
    }

    #[test]
    fn malformed_line_is_a_load_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = load_chunks(file.path()).unwrap_err();
        assert!(matches!(err, RetrieveError::LoadFailure(_)));
    }

    #[test]
    fn mismatched_counts_fail_fast() {
        let mut chunk_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(chunk_file, r#"{{"chunk_id":"c0","doc_path":"a.md","text":"alpha"}}"#).unwrap();
        writeln!(chunk_file, r#"{{"chunk_id":"c1","doc_path":"b.md","text":"beta"}}"#).unwrap();

        let mut index = VectorIndex::new(2);
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let mut index_file = tempfile::NamedTempFile::new().unwrap();
        index.write(&mut index_file).unwrap();

        let err = load_corpus(chunk_file.path(), index_file.path()).unwrap_err();
        assert!(matches!(err, RetrieveError::LoadFailure(_)));
    }
}
