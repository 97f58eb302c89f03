//! Black-box embedder contract and the cache-interposing wrapper around it.

use crate::cache::EmbeddingCache;
use crate::error::RetrieveError;
use crate::simd::norm;

/// Stateless capability implemented by the actual embedding model. Kept as a
/// single trait with no dynamic dispatch on the hot path: `CachedEmbedder` is
/// generic over `E`, so the common case never pays a vtable hop; callers that
/// need runtime polymorphism can still use `Box<dyn Embedder>` against the
/// same bound.
pub trait Embedder {
    fn embed_queries(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError>;
    fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError>;
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let n = norm(&v);
    if n > 1e-12 {
        for x in &mut v {
            *x /= n;
        }
    }
    v
}

/// Wraps a black-box [`Embedder`], interposing the embedding cache: cached
/// texts are never sent to the black box, freshly computed rows are
/// L2-normalized before being returned or cached, and the result is
/// reassembled in the caller's original order.
pub struct CachedEmbedder<E: Embedder> {
    inner: E,
    cache: Option<EmbeddingCache>,
    model_id: String,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, cache: Option<EmbeddingCache>, model_id: impl Into<String>) -> Self {
        Self {
            inner,
            cache,
            model_id: model_id.into(),
        }
    }

    pub fn embed_queries(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError> {
        self.embed_with(texts, |inner, to_compute| inner.embed_queries(to_compute))
    }

    pub fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError> {
        self.embed_with(texts, |inner, to_compute| inner.embed_passages(to_compute))
    }

    fn embed_with(
        &self,
        texts: &[String],
        call: impl FnOnce(&E, &[String]) -> Result<Vec<Vec<f32>>, RetrieveError>,
    ) -> Result<Vec<Vec<f32>>, RetrieveError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cached = match &self.cache {
            Some(cache) => cache.get_many(&self.model_id, texts),
            None => vec![None; texts.len()],
        };

        let to_compute: Vec<String> = texts
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(text, _)| text.clone())
            .collect();

        let computed = if to_compute.is_empty() {
            Vec::new()
        } else {
            call(&self.inner, &to_compute)?
                .into_iter()
                .map(l2_normalize)
                .collect::<Vec<_>>()
        };

        if let Some(cache) = &self.cache {
            if !to_compute.is_empty() {
                cache.put_many(&self.model_id, &to_compute, &computed);
            }
        }

        let mut computed_iter = computed.into_iter();
        let mut result = Vec::with_capacity(texts.len());
        for hit in cached {
            match hit {
                Some(vec) => result.push(vec),
                None => result.push(
                    computed_iter
                        .next()
                        .expect("one computed row per uncached text"),
                ),
            }
        }
        Ok(result)
    }
}

/// Deterministic test double: one-hot-per-token embeddings, dimensioned by a
/// fixed vocabulary. Useful for exercising the retriever's fusion and MMR
/// logic without a real model, matching the stub embedder assumed by the
/// end-to-end scenarios this crate's integration tests cover.
#[cfg(any(test, feature = "testing"))]
pub struct HashingEmbedder {
    vocab: Vec<String>,
}

#[cfg(any(test, feature = "testing"))]
impl HashingEmbedder {
    pub fn new(vocab: Vec<String>) -> Self {
        Self { vocab }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = crate::tokenizer::tokenize(text);
        let mut v = vec![0.0f32; self.vocab.len().max(1)];
        for token in &tokens {
            if let Some(pos) = self.vocab.iter().position(|w| w == token) {
                v[pos] += 1.0;
            }
        }
        l2_normalize(v)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Embedder for HashingEmbedder {
    fn embed_queries(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrieveError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
