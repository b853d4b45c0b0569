use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::embeddings::hash::fnv1a_64;

/// One persisted vector plus the hash of the text it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub vector: Vec<f32>,
}

pub type CacheMap = BTreeMap<String, CacheEntry>;

/// Separate cache files keep file-level keys from colliding with
/// identifier and call-site keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    Files,
    Identifiers,
}

impl CacheNamespace {
    pub fn file_name(self) -> &'static str {
        match self {
            CacheNamespace::Files => "embeddings-files.json",
            CacheNamespace::Identifiers => "embeddings-identifiers.json",
        }
    }
}

/// Change detector over the full embedding input. Not collision resistant.
pub fn content_hash(text: &str) -> String {
    format!("{:016x}", fnv1a_64(text.as_bytes()))
}

pub fn file_key(path: &str) -> String {
    path.to_string()
}

pub fn identifier_key(id: &str) -> String {
    format!("id:{}", id)
}

pub fn callsite_key(path: &str, line: usize) -> String {
    format!("callsite:{}:{}", path, line)
}

/// Returns the cached vector only when the stored hash matches.
pub fn lookup<'a>(map: &'a CacheMap, key: &str, hash: &str) -> Option<&'a Vec<f32>> {
    map.get(key)
        .filter(|entry| entry.hash == hash)
        .map(|entry| &entry.vector)
}

#[derive(Debug, Clone)]
pub struct DiskEmbeddingCache {
    dir: PathBuf,
}

impl DiskEmbeddingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ns: CacheNamespace) -> PathBuf {
        self.dir.join(ns.file_name())
    }

    /// Missing or corrupt files load as an empty map.
    pub async fn load(&self, ns: CacheNamespace) -> CacheMap {
        let path = self.path_for(ns);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return CacheMap::new(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to read embedding cache");
                return CacheMap::new();
            }
        };
        match serde_json::from_slice::<CacheMap>(&bytes) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Corrupt embedding cache, starting empty");
                CacheMap::new()
            }
        }
    }

    /// Writes to a sibling temp file, then renames over the target.
    pub async fn save(&self, ns: CacheNamespace, map: &CacheMap) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;
        let path = self.path_for(ns);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(map).context("Failed to serialize embedding cache")?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Drops every entry `keep` rejects. Returns the number removed.
pub fn prune(map: &mut CacheMap, keep: impl Fn(&str) -> bool) -> usize {
    let before = map.len();
    map.retain(|key, _| keep(key));
    before - map.len()
}

/// Path component of a `callsite:<path>:<line>` key.
pub fn callsite_path(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("callsite:")?;
    rest.rsplit_once(':').map(|(path, _)| path)
}
