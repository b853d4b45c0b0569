use crate::embeddings::{EmbedError, Embedder};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Local ONNX embedding. Inference is blocking, so calls hop onto the
/// blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
}

impl FastEmbedder {
    pub fn new(model_name: &str, cache_dir: Option<&Path>) -> Result<Self> {
        let model_enum = match model_name {
            "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "sentence-transformers/all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            "jinaai/jina-embeddings-v2-base-code" => EmbeddingModel::JinaEmbeddingsV2BaseCode,
            _ => return Err(anyhow!("Unsupported model for FastEmbed: {}. Supported: BAAI/bge-base-en-v1.5, BAAI/bge-small-en-v1.5, sentence-transformers/all-MiniLM-L6-v2, jinaai/jina-embeddings-v2-base-code", model_name)),
        };

        let mut options = InitOptions::new(model_enum);
        if let Some(path) = cache_dir {
            options = options.with_cache_dir(path.to_path_buf());
        }
        tracing::info!(model = model_name, "Initializing FastEmbed");

        let model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Failed to initialize FastEmbed: {}", e))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbedError::Provider("FastEmbed model lock poisoned".into()))?;
            guard
                .embed(texts, None)
                .map_err(|e| EmbedError::Provider(format!("Embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbedError::Provider(format!("Embedding task failed: {}", e)))?
    }
}
