use crate::config::clamp_batch_size;
use crate::embeddings::{EmbedError, Embedder};
use crate::text::truncate_chars;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ShrinkPolicy {
    /// Each retry keeps `factor` of the previous character length.
    pub factor: f32,
    pub max_retries: usize,
}

impl Default for ShrinkPolicy {
    fn default() -> Self {
        Self {
            factor: 0.75,
            max_retries: 4,
        }
    }
}

/// Wraps a provider with bounded batching and context-length recovery.
///
/// A batch rejected for context length is bisected and each half retried;
/// a single rejected input is shrunk by the policy factor until it fits.
/// Output is always positionally aligned with input.
#[derive(Clone)]
pub struct BatchingEmbedder {
    inner: Arc<dyn Embedder>,
    batch_size: usize,
    policy: ShrinkPolicy,
}

impl BatchingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, batch_size: usize, policy: ShrinkPolicy) -> Self {
        Self {
            inner,
            batch_size: clamp_batch_size(batch_size),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embeds every text or fails. An input that still exceeds the model
    /// context after all shrink retries is a hard error.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let lenient = self.embed_lenient(texts).await?;
        lenient
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| {
                    EmbedError::ContextLength(format!(
                        "input {} still too long after {} shrink retries",
                        i, self.policy.max_retries
                    ))
                })
            })
            .collect()
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| EmbedError::Provider("provider returned no vector".into()))
    }

    /// Like [`embed`](Self::embed), but an input whose retry budget is
    /// exhausted yields `None` in its slot instead of failing the call.
    /// Non-context errors still propagate.
    pub async fn embed_lenient(
        &self,
        texts: &[String],
    ) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk).await?);
        }
        Ok(out)
    }

    fn embed_chunk<'a>(
        &'a self,
        chunk: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Option<Vec<f32>>>, EmbedError>> {
        async move {
            match self.inner.embed(chunk).await {
                Ok(vectors) => {
                    if vectors.len() != chunk.len() {
                        return Err(EmbedError::Provider(format!(
                            "provider returned {} vectors for {} inputs",
                            vectors.len(),
                            chunk.len()
                        )));
                    }
                    Ok(vectors.into_iter().map(Some).collect())
                }
                Err(err) if err.is_context_length() && chunk.len() > 1 => {
                    let mid = chunk.len() / 2;
                    tracing::debug!(
                        batch = chunk.len(),
                        "Context length exceeded, bisecting batch"
                    );
                    let mut left = self.embed_chunk(&chunk[..mid]).await?;
                    let right = self.embed_chunk(&chunk[mid..]).await?;
                    left.extend(right);
                    Ok(left)
                }
                Err(err) if err.is_context_length() => {
                    Ok(vec![self.shrink_single(&chunk[0]).await?])
                }
                Err(err) => Err(err),
            }
        }
        .boxed()
    }

    async fn shrink_single(&self, text: &str) -> Result<Option<Vec<f32>>, EmbedError> {
        let mut len = text.chars().count();
        for attempt in 1..=self.policy.max_retries {
            len = ((len as f32) * self.policy.factor).floor() as usize;
            if len == 0 {
                break;
            }
            let shrunk = truncate_chars(text, len).to_string();
            match self.inner.embed(std::slice::from_ref(&shrunk)).await {
                Ok(mut vectors) if vectors.len() == 1 => {
                    tracing::debug!(attempt, chars = len, "Embedded shrunk input");
                    return Ok(vectors.pop());
                }
                Ok(vectors) => {
                    return Err(EmbedError::Provider(format!(
                        "provider returned {} vectors for 1 input",
                        vectors.len()
                    )));
                }
                Err(err) if err.is_context_length() => continue,
                Err(err) => return Err(err),
            }
        }
        tracing::warn!(
            chars = text.chars().count(),
            retries = self.policy.max_retries,
            "Input exceeds model context after all shrink retries; skipping"
        );
        Ok(None)
    }
}
