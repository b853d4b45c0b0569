use crate::embeddings::{EmbedError, Embedder};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Error bodies Ollama (and llama.cpp underneath) produce when an input does
/// not fit the model window.
const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "context length",
    "input length",
    "context window",
    "too long",
    "exceeds the context",
];

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EmbedError::Provider(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Provider(format!("Invalid Ollama response: {}", e)))?;
        let vectors = parse_embed_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Provider(format!(
                "Ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

pub(crate) fn classify_error(status: u16, body: &str) -> EmbedError {
    let lower = body.to_lowercase();
    if CONTEXT_LENGTH_MARKERS.iter().any(|m| lower.contains(m)) {
        EmbedError::ContextLength(body.trim().to_string())
    } else {
        EmbedError::Provider(format!("Ollama API error {}: {}", status, body.trim()))
    }
}

pub(crate) fn parse_embed_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbedError::Provider("Invalid Ollama response: missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| {
                    EmbedError::Provider("Invalid Ollama response: embedding is not an array".into())
                })
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
        })
        .collect()
}
