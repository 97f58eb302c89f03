//! Persistent, content-addressed embedding cache backed by SQLite.
//!
//! Keys are `SHA-256(model_id + '\n' + text)`; values are the raw float32
//! bytes of the embedding, zstd-compressed. The cache stores and returns
//! exactly what was written — it never assumes callers pass normalized
//! vectors — and corrupt rows surface as misses rather than errors, per the
//! cache-failure policy: reads degrade to `None`, writes degrade to no-ops.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Mutex;

/// A persistent (model_id, text) -> vector store.
///
/// `rusqlite::Connection` is `!Sync`, and the contract requires writes to be
/// serialized while reads may proceed concurrently from many callers; a
/// single connection behind a mutex satisfies both (SQLite itself serializes
/// statement execution per connection) without pulling in a connection pool
/// this crate has no other use for.
pub struct EmbeddingCache {
    conn: Mutex<Connection>,
}

fn cache_key(model_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn encode_vector(vec: &[f32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(vec.len() * 4);
    for &value in vec {
        raw.write_f32::<LittleEndian>(value).expect("write to Vec never fails");
    }
    zstd::encode_all(Cursor::new(raw), 0).unwrap_or_default()
}

fn decode_vector(blob: &[u8], dims: usize) -> Option<Vec<f32>> {
    let raw = zstd::decode_all(blob).ok()?;
    if raw.len() != dims * 4 {
        return None;
    }
    let mut cursor = Cursor::new(raw);
    let mut out = Vec::with_capacity(dims);
    for _ in 0..dims {
        out.push(cursor.read_f32::<LittleEndian>().ok()?);
    }
    Some(out)
}

impl EmbeddingCache {
    /// Open (creating if needed) the SQLite store at `path`.
    pub fn open(path: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                vec BLOB NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_cache_model ON cache(model);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory cache, useful for tests and for `EMB_CACHE=false` callers
    /// that still want the interface without a file on disk.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::open(":memory:")
    }

    /// One entry per input text, in order; `None` where absent or corrupt.
    /// A cache-backend error degrades to an all-`None` result rather than
    /// propagating, since cache failures must never be fatal to a query.
    pub fn get_many(&self, model_id: &str, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let conn = match self.conn.lock() {
            Ok(guard) => guard,
            Err(_) => return vec![None; texts.len()],
        };
        texts
            .iter()
            .map(|text| {
                let key = cache_key(model_id, text);
                let row: rusqlite::Result<(i64, Vec<u8>)> = conn.query_row(
                    "SELECT dims, vec FROM cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                );
                match row {
                    Ok((dims, blob)) => decode_vector(&blob, dims as usize),
                    Err(_) => {
                        tracing::debug!(%key, "embedding cache miss");
                        None
                    }
                }
            })
            .collect()
    }

    /// Idempotent upsert; a failure is logged and swallowed rather than
    /// propagated, since a cache write is never allowed to fail a query.
    pub fn put_many(&self, model_id: &str, texts: &[String], vectors: &[Vec<f32>]) {
        debug_assert_eq!(texts.len(), vectors.len());
        let conn = match self.conn.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("embedding cache mutex poisoned; dropping write batch");
                return;
            }
        };
        for (text, vec) in texts.iter().zip(vectors) {
            let key = cache_key(model_id, text);
            let blob = encode_vector(vec);
            if let Err(err) = conn.execute(
                "INSERT OR REPLACE INTO cache (key, model, dims, vec) VALUES (?1, ?2, ?3, ?4)",
                params![key, model_id, vec.len() as i64, blob],
            ) {
                tracing::warn!(%key, error = %err, "embedding cache write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips_bit_exactly() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        let texts = vec!["fox".to_string(), "dog".to_string()];
        let vecs = vec![vec![0.1, 0.2, 0.3], vec![0.4, -0.5, 0.6]];
        cache.put_many("model-a", &texts, &vecs);
        let got = cache.get_many("model-a", &texts);
        assert_eq!(got, vec![Some(vecs[0].clone()), Some(vecs[1].clone())]);
    }

    #[test]
    fn miss_returns_none_per_entry() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        let got = cache.get_many("model-a", &["unseen".to_string()]);
        assert_eq!(got, vec![None]);
    }

    #[test]
    fn keys_are_scoped_by_model_id() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        let texts = vec!["fox".to_string()];
        cache.put_many("model-a", &texts, &[vec![1.0, 2.0]]);
        let got = cache.get_many("model-b", &texts);
        assert_eq!(got, vec![None]);
    }

    #[test]
    fn put_many_is_idempotent_upsert() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        let texts = vec!["fox".to_string()];
        cache.put_many("model-a", &texts, &[vec![1.0, 2.0]]);
        cache.put_many("model-a", &texts, &[vec![1.0, 2.0]]);
        let got = cache.get_many("model-a", &texts);
        assert_eq!(got, vec![Some(vec![1.0, 2.0])]);
    }

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(cache_key("m", "t"), cache_key("m", "t"));
        assert_ne!(cache_key("m", "t"), cache_key("m2", "t"));
    }
}
