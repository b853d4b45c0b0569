use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

const MAX_LABEL_CHARS: usize = 60;
const SAMPLE_FILES_PER_GROUP: usize = 8;

/// Outcome of a best-effort text generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Unavailable(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Completion;
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
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
impl TextGenerator for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Completion {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let response = match self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return Completion::Unavailable(format!(
                    "Ollama not available at {}: {}",
                    self.url, e
                ))
            }
        };
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Completion::Unavailable(format!("Ollama returned {}: {}", status, text));
        }
        match response.json::<serde_json::Value>().await {
            Ok(json) => match json.get("response").and_then(|v| v.as_str()) {
                Some(text) => Completion::Text(text.to_string()),
                None => Completion::Unavailable("Ollama response had no text".to_string()),
            },
            Err(e) => Completion::Unavailable(format!("Invalid Ollama response: {}", e)),
        }
    }
}

/// One cluster among siblings waiting for a label.
#[derive(Debug, Clone)]
pub struct SiblingGroup {
    pub pattern: Option<String>,
    pub files: Vec<String>,
}

pub fn label_prompt(groups: &[SiblingGroup]) -> String {
    let mut prompt = format!(
        "You are naming groups of source files in a code repository.\n\
         Give each of the {} groups below a short label of 2 to 5 words describing \
         what its files are about.\n\
         Reply with only a JSON array of {} strings, in group order.\n\n",
        groups.len(),
        groups.len()
    );
    for (i, group) in groups.iter().enumerate() {
        prompt.push_str(&format!("Group {}", i + 1));
        if let Some(pattern) = &group.pattern {
            prompt.push_str(&format!(" ({pattern})"));
        }
        prompt.push_str(":\n");
        for file in group.files.iter().take(SAMPLE_FILES_PER_GROUP) {
            prompt.push_str(&format!("  {file}\n"));
        }
        if group.files.len() > SAMPLE_FILES_PER_GROUP {
            prompt.push_str(&format!(
                "  ... and {} more\n",
                group.files.len() - SAMPLE_FILES_PER_GROUP
            ));
        }
    }
    prompt
}

/// Pulls a JSON string array out of free-form model output. Returns `None`
/// unless it holds exactly `expected` non-empty labels.
pub fn parse_labels(text: &str, expected: usize) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let labels: Vec<String> = serde_json::from_str(&text[start..=end]).ok()?;
    if labels.len() != expected {
        return None;
    }
    let labels: Vec<String> = labels
        .into_iter()
        .map(|l| l.trim().chars().take(MAX_LABEL_CHARS).collect::<String>())
        .collect();
    if labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(labels)
}

/// Mechanical label: the path pattern, else a numbered placeholder.
pub fn fallback_label(pattern: Option<&str>, ordinal: usize) -> String {
    match pattern {
        Some(p) => p.to_string(),
        None => format!("Cluster {ordinal}"),
    }
}

pub fn fallback_labels(groups: &[SiblingGroup]) -> Vec<String> {
    groups
        .iter()
        .enumerate()
        .map(|(i, g)| fallback_label(g.pattern.as_deref(), i + 1))
        .collect()
}

/// Labels a sibling set. Never fails: anything short of a well-formed
/// answer yields the mechanical labels.
pub async fn label_siblings(
    generator: Option<&dyn TextGenerator>,
    groups: &[SiblingGroup],
) -> Vec<String> {
    let Some(generator) = generator else {
        return fallback_labels(groups);
    };
    if groups.len() < 2 {
        return fallback_labels(groups);
    }
    match generator.complete(&label_prompt(groups)).await {
        Completion::Text(text) => match parse_labels(&text, groups.len()) {
            Some(labels) => labels,
            None => {
                tracing::debug!(
                    groups = groups.len(),
                    "Unparsable cluster labels, using path patterns"
                );
                fallback_labels(groups)
            }
        },
        Completion::Unavailable(reason) => {
            tracing::warn!(reason = %reason, "Cluster labeling unavailable, using path patterns");
            fallback_labels(groups)
        }
    }
}
