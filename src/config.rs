use crate::path::RepoPaths;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Hard bounds for the embedding batch window.
pub const MIN_EMBEDDING_BATCH_SIZE: usize = 1;
pub const MAX_EMBEDDING_BATCH_SIZE: usize = 32;

pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    ".semnav",
    "__pycache__",
    ".venv",
    ".next",
    "coverage",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsBackend {
    Ollama,
    FastEmbed,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_dir: PathBuf,
    pub cache_dir: PathBuf,

    pub embeddings_backend: EmbeddingsBackend,
    pub embeddings_model: String,
    pub embeddings_model_dir: Option<PathBuf>,
    pub ollama_url: String,
    pub embedding_batch_size: usize,
    pub embedding_timeout_secs: u64,
    pub embedding_shrink_factor: f32,
    pub embedding_max_shrink_retries: usize,
    pub hash_embedding_dim: usize,

    pub index_ttl_secs: u64,
    pub max_document_chars: usize,
    pub max_file_bytes: u64,
    pub ignored_prefixes: Vec<String>,

    pub rank_semantic_weight: f32,
    pub rank_keyword_weight: f32,
    pub keyword_coverage_weight: f32,
    pub keyword_symbol_weight: f32,
    pub keyword_phrase_boost: f32,
    pub callsite_semantic_weight: f32,
    pub callsite_keyword_weight: f32,

    pub navigator_max_depth: usize,
    pub navigator_max_clusters: usize,
    pub navigator_leaf_size: usize,
    pub labels_enabled: bool,
    pub label_model: String,

    pub watch_mode: bool,
    pub watch_debounce_ms: u64,
    pub watch_batch_size: usize,

    pub restore_max_points: usize,
}

impl Config {
    /// Defaults for a given root, without consulting the environment.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            cache_dir: base_dir.join(".semnav"),
            base_dir,
            embeddings_backend: EmbeddingsBackend::Ollama,
            embeddings_model: "nomic-embed-text".to_string(),
            embeddings_model_dir: None,
            ollama_url: "http://localhost:11434".to_string(),
            embedding_batch_size: 8,
            embedding_timeout_secs: 60,
            embedding_shrink_factor: 0.75,
            embedding_max_shrink_retries: 4,
            hash_embedding_dim: 256,
            index_ttl_secs: 30,
            max_document_chars: 4000,
            max_file_bytes: 1024 * 1024,
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            rank_semantic_weight: 0.75,
            rank_keyword_weight: 0.25,
            keyword_coverage_weight: 0.65,
            keyword_symbol_weight: 0.20,
            keyword_phrase_boost: 0.15,
            callsite_semantic_weight: 0.82,
            callsite_keyword_weight: 0.18,
            navigator_max_depth: 3,
            navigator_max_clusters: 8,
            navigator_leaf_size: 8,
            labels_enabled: true,
            label_model: "llama3.2".to_string(),
            watch_mode: true,
            watch_debounce_ms: 500,
            watch_batch_size: 32,
            restore_max_points: 20,
        }
    }

    /// Path rules for the index root. The cache directory is always
    /// skipped, whatever `ignored_prefixes` says.
    pub fn repo_paths(&self) -> RepoPaths {
        RepoPaths::new(&self.base_dir, &self.ignored_prefixes).excluding(&self.cache_dir)
    }

    pub fn from_env() -> Result<Self> {
        let base_dir_raw = required_env("BASE_DIR")?;
        let base_dir = canonicalize_dir(Path::new(&base_dir_raw))
            .with_context(|| format!("Invalid BASE_DIR: {base_dir_raw}"))?;

        let mut cfg = Self::with_base_dir(base_dir.clone());
        cfg.cache_dir = default_path(&base_dir, "CACHE_DIR", "./.semnav");

        if let Some(backend) = optional_env("EMBEDDINGS_BACKEND")
            .as_deref()
            .map(parse_embeddings_backend)
            .transpose()?
        {
            cfg.embeddings_backend = backend;
        }
        cfg.embeddings_model = optional_env("EMBEDDINGS_MODEL").unwrap_or_else(|| {
            match cfg.embeddings_backend {
                EmbeddingsBackend::FastEmbed => "BAAI/bge-small-en-v1.5".to_string(),
                EmbeddingsBackend::Ollama | EmbeddingsBackend::Hash => {
                    "nomic-embed-text".to_string()
                }
            }
        });
        if cfg.embeddings_backend == EmbeddingsBackend::FastEmbed {
            cfg.embeddings_model_dir = Some(default_path(
                &base_dir,
                "EMBEDDINGS_MODEL_DIR",
                "./.semnav/models",
            ));
        }
        if let Some(url) = optional_env("OLLAMA_URL") {
            cfg.ollama_url = url.trim_end_matches('/').to_string();
        }

        cfg.embedding_batch_size = clamp_batch_size(
            optional_env("EMBEDDING_BATCH_SIZE")
                .as_deref()
                .map(parse_usize)
                .transpose()?
                .unwrap_or(cfg.embedding_batch_size),
        );
        cfg.embedding_timeout_secs = optional_env("EMBEDDING_TIMEOUT_SECS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(cfg.embedding_timeout_secs);
        cfg.embedding_shrink_factor = optional_env("EMBEDDING_SHRINK_FACTOR")
            .as_deref()
            .map(parse_shrink_factor)
            .transpose()?
            .unwrap_or(cfg.embedding_shrink_factor);
        cfg.embedding_max_shrink_retries = optional_env("EMBEDDING_MAX_SHRINK_RETRIES")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.embedding_max_shrink_retries);
        cfg.hash_embedding_dim = optional_env("HASH_EMBEDDING_DIM")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.hash_embedding_dim)
            .max(8);

        cfg.index_ttl_secs = optional_env("INDEX_TTL_SECS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(cfg.index_ttl_secs);
        cfg.max_document_chars = optional_env("MAX_DOCUMENT_CHARS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.max_document_chars)
            .max(64);
        cfg.max_file_bytes = optional_env("MAX_FILE_BYTES")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(cfg.max_file_bytes);
        if let Some(raw) = optional_env("IGNORED_PREFIXES") {
            cfg.ignored_prefixes = parse_csv(&raw);
        }

        cfg.rank_semantic_weight = weight_env("RANK_SEMANTIC_WEIGHT", cfg.rank_semantic_weight)?;
        cfg.rank_keyword_weight = weight_env("RANK_KEYWORD_WEIGHT", cfg.rank_keyword_weight)?;
        cfg.keyword_coverage_weight =
            weight_env("KEYWORD_COVERAGE_WEIGHT", cfg.keyword_coverage_weight)?;
        cfg.keyword_symbol_weight =
            weight_env("KEYWORD_SYMBOL_WEIGHT", cfg.keyword_symbol_weight)?;
        cfg.keyword_phrase_boost = weight_env("KEYWORD_PHRASE_BOOST", cfg.keyword_phrase_boost)?;
        cfg.callsite_semantic_weight =
            weight_env("CALLSITE_SEMANTIC_WEIGHT", cfg.callsite_semantic_weight)?;
        cfg.callsite_keyword_weight =
            weight_env("CALLSITE_KEYWORD_WEIGHT", cfg.callsite_keyword_weight)?;

        cfg.navigator_max_depth = optional_env("NAVIGATOR_MAX_DEPTH")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.navigator_max_depth)
            .max(1);
        cfg.navigator_max_clusters = optional_env("NAVIGATOR_MAX_CLUSTERS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.navigator_max_clusters)
            .max(2);
        cfg.navigator_leaf_size = optional_env("NAVIGATOR_LEAF_SIZE")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.navigator_leaf_size)
            .max(1);
        cfg.labels_enabled = optional_env("LABELS_ENABLED")
            .as_deref()
            .map(parse_bool)
            .transpose()?
            .unwrap_or(cfg.labels_enabled);
        if let Some(model) = optional_env("LABEL_MODEL") {
            cfg.label_model = model;
        }

        cfg.watch_mode = optional_env("WATCH_MODE")
            .as_deref()
            .map(parse_bool)
            .transpose()?
            .unwrap_or(cfg.watch_mode);
        cfg.watch_debounce_ms = optional_env("WATCH_DEBOUNCE_MS")
            .as_deref()
            .map(parse_u64)
            .transpose()?
            .unwrap_or(cfg.watch_debounce_ms);
        cfg.watch_batch_size = optional_env("WATCH_BATCH_SIZE")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.watch_batch_size)
            .max(1);

        cfg.restore_max_points = optional_env("RESTORE_MAX_POINTS")
            .as_deref()
            .map(parse_usize)
            .transpose()?
            .unwrap_or(cfg.restore_max_points)
            .max(1);

        Ok(cfg)
    }

    pub fn normalize_path_to_base(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

pub fn clamp_batch_size(size: usize) -> usize {
    size.clamp(MIN_EMBEDDING_BATCH_SIZE, MAX_EMBEDDING_BATCH_SIZE)
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("Missing required env var: {key}"))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("Failed to get current_dir")?
            .join(path)
    };
    let meta = std::fs::metadata(&path)
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !meta.is_dir() {
        return Err(anyhow!("Expected directory, got file: {}", path.display()));
    }
    dunce::canonicalize(&path)
        .with_context(|| format!("Failed to canonicalize: {}", path.display()))
}

fn default_path(base_dir: &Path, key: &str, default_rel: &str) -> PathBuf {
    let raw = optional_env(key).unwrap_or_else(|| default_rel.to_string());
    let path = Path::new(&raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_embeddings_backend(value: &str) -> Result<EmbeddingsBackend> {
    match value.trim().to_lowercase().as_str() {
        "ollama" => Ok(EmbeddingsBackend::Ollama),
        "fastembed" => Ok(EmbeddingsBackend::FastEmbed),
        "hash" => Ok(EmbeddingsBackend::Hash),
        other => Err(anyhow!("Invalid EMBEDDINGS_BACKEND: {other}")),
    }
}

fn parse_usize(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_u64(value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| anyhow!("Invalid integer '{value}': {err}"))
}

fn parse_any_f32(value: &str) -> Result<f32> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|err| anyhow!("Invalid float '{value}': {err}"))
}

fn parse_shrink_factor(value: &str) -> Result<f32> {
    let v = parse_any_f32(value)?;
    if !(v > 0.0 && v < 1.0) {
        return Err(anyhow!("EMBEDDING_SHRINK_FACTOR must be in (0, 1), got {v}"));
    }
    Ok(v)
}

fn weight_env(key: &str, default: f32) -> Result<f32> {
    let Some(raw) = optional_env(key) else {
        return Ok(default);
    };
    let v = parse_any_f32(&raw)?;
    if !v.is_finite() || v < 0.0 {
        return Err(anyhow!("{key} must be a non-negative number, got {raw}"));
    }
    Ok(v)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        other => Err(anyhow!("Invalid boolean '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "BASE_DIR",
        "CACHE_DIR",
        "EMBEDDINGS_BACKEND",
        "EMBEDDINGS_MODEL",
        "EMBEDDINGS_MODEL_DIR",
        "OLLAMA_URL",
        "EMBEDDING_BATCH_SIZE",
        "EMBEDDING_TIMEOUT_SECS",
        "EMBEDDING_SHRINK_FACTOR",
        "EMBEDDING_MAX_SHRINK_RETRIES",
        "HASH_EMBEDDING_DIM",
        "INDEX_TTL_SECS",
        "MAX_DOCUMENT_CHARS",
        "MAX_FILE_BYTES",
        "IGNORED_PREFIXES",
        "RANK_SEMANTIC_WEIGHT",
        "RANK_KEYWORD_WEIGHT",
        "KEYWORD_COVERAGE_WEIGHT",
        "KEYWORD_SYMBOL_WEIGHT",
        "KEYWORD_PHRASE_BOOST",
        "CALLSITE_SEMANTIC_WEIGHT",
        "CALLSITE_KEYWORD_WEIGHT",
        "NAVIGATOR_MAX_DEPTH",
        "NAVIGATOR_MAX_CLUSTERS",
        "NAVIGATOR_LEAF_SIZE",
        "LABELS_ENABLED",
        "LABEL_MODEL",
        "WATCH_MODE",
        "WATCH_DEBOUNCE_MS",
        "WATCH_BATCH_SIZE",
        "RESTORE_MAX_POINTS",
    ];

    fn clear_env() {
        for k in KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn from_env_requires_base_dir() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let err = Config::from_env().unwrap_err().to_string();
        assert!(err.contains("BASE_DIR"));
    }

    #[test]
    fn from_env_defaults_to_ollama_and_cache_under_base() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.embeddings_backend, EmbeddingsBackend::Ollama);
        assert_eq!(cfg.embeddings_model, "nomic-embed-text");
        assert_eq!(cfg.cache_dir, cfg.base_dir.join("./.semnav"));
        assert!(cfg.embeddings_model_dir.is_none());
        assert!(cfg.watch_mode);
    }

    #[test]
    fn batch_size_is_clamped_to_hard_range() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());

        std::env::set_var("EMBEDDING_BATCH_SIZE", "500");
        assert_eq!(
            Config::from_env().unwrap().embedding_batch_size,
            MAX_EMBEDDING_BATCH_SIZE
        );
        std::env::set_var("EMBEDDING_BATCH_SIZE", "0");
        assert_eq!(
            Config::from_env().unwrap().embedding_batch_size,
            MIN_EMBEDDING_BATCH_SIZE
        );
    }

    #[test]
    fn fastembed_backend_gets_model_dir_and_default_model() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());
        std::env::set_var("EMBEDDINGS_BACKEND", "FastEmbed");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.embeddings_backend, EmbeddingsBackend::FastEmbed);
        assert_eq!(cfg.embeddings_model, "BAAI/bge-small-en-v1.5");
        assert_eq!(
            cfg.embeddings_model_dir,
            Some(cfg.base_dir.join("./.semnav/models"))
        );
    }

    #[test]
    fn negative_weights_and_bad_shrink_factor_are_rejected() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());

        std::env::set_var("RANK_KEYWORD_WEIGHT", "-0.1");
        assert!(Config::from_env().is_err());
        std::env::remove_var("RANK_KEYWORD_WEIGHT");

        std::env::set_var("EMBEDDING_SHRINK_FACTOR", "1.5");
        assert!(Config::from_env().is_err());
        std::env::set_var("EMBEDDING_SHRINK_FACTOR", "0.5");
        let cfg = Config::from_env().unwrap();
        assert!((cfg.embedding_shrink_factor - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn ignored_prefixes_parse_from_csv() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());
        std::env::set_var("IGNORED_PREFIXES", " .git , vendor ,, out ");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.ignored_prefixes, vec![".git", "vendor", "out"]);
    }

    #[test]
    fn cache_dir_stays_ignored_when_prefixes_are_overridden() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());
        std::env::set_var("IGNORED_PREFIXES", ".git");

        let cfg = Config::from_env().unwrap();
        assert!(!cfg.ignored_prefixes.iter().any(|p| p == ".semnav"));
        let paths = cfg.repo_paths();
        assert!(paths.is_ignored(".semnav/embeddings/abc.bin"));
        assert!(paths.is_ignored(".semnav/restore/index.json"));
        assert!(paths.is_ignored(".git/HEAD"));
        assert!(!paths.is_ignored("src/main.rs"));

        std::env::set_var("CACHE_DIR", "./build/nav-cache");
        let paths = Config::from_env().unwrap().repo_paths();
        assert!(paths.is_ignored("build/nav-cache/a.bin"));
        assert!(!paths.is_ignored(".semnav/a.bin"));
    }

    #[test]
    fn bool_parsing_accepts_multiple_spellings() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let base = tempfile::tempdir().unwrap();
        std::env::set_var("BASE_DIR", base.path());
        std::env::set_var("WATCH_MODE", "no");
        std::env::set_var("LABELS_ENABLED", "0");
        let cfg = Config::from_env().unwrap();
        assert!(!cfg.watch_mode);
        assert!(!cfg.labels_enabled);
    }
}
