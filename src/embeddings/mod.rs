pub mod batching;
pub mod fastembed;
pub mod hash;
pub mod ollama;

use crate::config::{Config, EmbeddingsBackend};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use batching::{BatchingEmbedder, ShrinkPolicy};

/// Failure modes an embedding provider can report.
///
/// `ContextLength` is the only recoverable one: the batching layer reacts to
/// it by splitting the batch or shrinking the input.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedError {
    ContextLength(String),
    Provider(String),
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedError::ContextLength(msg) => write!(f, "input exceeds context length: {}", msg),
            EmbedError::Provider(msg) => write!(f, "embedding provider error: {}", msg),
        }
    }
}

impl std::error::Error for EmbedError {}

impl EmbedError {
    pub fn is_context_length(&self) -> bool {
        matches!(self, EmbedError::ContextLength(_))
    }
}

/// A text to vector model. Implementations return exactly one vector per
/// input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embeddings_backend {
        EmbeddingsBackend::Hash => Ok(Arc::new(hash::HashEmbedder::new(config.hash_embedding_dim))),
        EmbeddingsBackend::Ollama => Ok(Arc::new(ollama::OllamaEmbedder::new(
            &config.ollama_url,
            &config.embeddings_model,
            config.embedding_timeout_secs,
        )?)),
        EmbeddingsBackend::FastEmbed => Ok(Arc::new(fastembed::FastEmbedder::new(
            &config.embeddings_model,
            config.embeddings_model_dir.as_deref(),
        )?)),
    }
}

/// Cosine similarity in [-1, 1]. Zero vectors and length mismatches score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
