use crate::embeddings::{EmbedError, Embedder};
use crate::text::tokenize;
use async_trait::async_trait;

/// Deterministic offline embedder: each token is hashed to a signed bucket,
/// the result L2-normalized. Useful for tests and for running without a
/// model server.
pub struct HashEmbedder {
    dim: usize,
    context_limit: Option<usize>,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(8),
            context_limit: None,
        }
    }

    /// Rejects any batch whose combined character count exceeds `chars`
    /// with a context-length error, like a model with a bounded window.
    pub fn with_context_limit(mut self, chars: usize) -> Self {
        self.context_limit = Some(chars);
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let h = fnv1a_64(token.as_bytes());
            let idx = (h as usize) % self.dim;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize_l2(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if let Some(limit) = self.context_limit {
            let total: usize = texts.iter().map(|t| t.chars().count()).sum();
            if total > limit {
                return Err(EmbedError::ContextLength(format!(
                    "batch of {} chars exceeds limit {}",
                    total, limit
                )));
            }
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn normalize_l2(v: &mut [f32]) {
    let mut sum = 0.0f32;
    for x in v.iter() {
        sum += x * x;
    }
    let norm = sum.sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x00000100000001b3;
    let mut hash = OFFSET;
    for b in data {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn vectors_are_unit_length_and_deterministic() {
        let e = HashEmbedder::new(64);
        let out = e
            .embed(&["verify jwt token".to_string(), "verify jwt token".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], out[1]);
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_tokens_raise_similarity() {
        let e = HashEmbedder::new(256);
        let v = e
            .embed(&[
                "validate jwt token".to_string(),
                "jwt token validation".to_string(),
                "stripe billing webhook".to_string(),
            ])
            .await
            .unwrap();
        assert!(cosine_similarity(&v[0], &v[1]) > cosine_similarity(&v[0], &v[2]));
    }

    #[tokio::test]
    async fn context_limit_rejects_oversized_batches() {
        let e = HashEmbedder::new(16).with_context_limit(10);
        let err = e
            .embed(&["0123456789ab".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_context_length());
        assert!(e.embed(&["short".to_string()]).await.is_ok());
    }

    #[test]
    fn fnv_matches_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbedder::new(8);
        assert!(e.embed_one("").iter().all(|x| *x == 0.0));
    }
}
