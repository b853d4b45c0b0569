use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::documents::{code_documents, is_text_document, text_document, Document, IdentifierDocument};
use super::parser::StructuralParser;
use super::walker::{walk, WalkOptions};
use crate::embeddings::BatchingEmbedder;
use crate::path::RepoPaths;
use crate::storage::cache::{
    callsite_key, callsite_path, content_hash, file_key, identifier_key, lookup, prune,
    CacheEntry, CacheNamespace, DiskEmbeddingCache,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub files_scanned: usize,
    pub documents: usize,
    pub identifiers: usize,
    pub cache_hits: usize,
    pub embedded: usize,
    pub skipped_files: usize,
    /// Items dropped because they never fit the model context.
    pub skipped_embeddings: usize,
    pub pruned: usize,
    pub elapsed_ms: u64,
}

/// Whole-file index. `vectors[i]` belongs to `documents[i]`.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    pub documents: Vec<Document>,
    pub vectors: Vec<Vec<f32>>,
    pub stats: BuildStats,
}

/// Identifier index plus the source text call-site scans read from.
#[derive(Debug, Clone, Default)]
pub struct IdentifierIndex {
    pub identifiers: Vec<IdentifierDocument>,
    pub vectors: Vec<Vec<f32>>,
    /// Relative path to full source, code files only.
    pub files: BTreeMap<String, String>,
    pub stats: BuildStats,
}

impl IdentifierIndex {
    pub fn find(&self, name: &str) -> Vec<usize> {
        self.identifiers
            .iter()
            .enumerate()
            .filter(|(_, d)| d.name == name)
            .map(|(i, _)| i)
            .collect()
    }
}

/// One walk-and-parse pass over the tree. Both indexes are derived from
/// the same corpus so a cold start reads every file once.
#[derive(Debug, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    identifiers: Vec<IdentifierDocument>,
    files: BTreeMap<String, String>,
    scanned: usize,
    skipped: usize,
}

enum FileOutcome {
    Code {
        document: Document,
        identifiers: Vec<IdentifierDocument>,
        source: String,
    },
    Text(Document),
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub refreshed: usize,
    pub removed: usize,
    pub embedded: usize,
}

struct CachedEmbeddings {
    vectors: Vec<Option<Vec<f32>>>,
    hits: usize,
    embedded: usize,
    pruned: usize,
}

pub struct IndexBuilder {
    paths: RepoPaths,
    parser: Arc<dyn StructuralParser>,
    embedder: BatchingEmbedder,
    cache: DiskEmbeddingCache,
    /// Serializes read-modify-write passes over the cache files.
    cache_lock: Mutex<()>,
    max_document_chars: usize,
    max_file_bytes: u64,
}

impl IndexBuilder {
    pub fn new(
        paths: RepoPaths,
        parser: Arc<dyn StructuralParser>,
        embedder: BatchingEmbedder,
        cache: DiskEmbeddingCache,
        max_document_chars: usize,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            paths,
            parser,
            embedder,
            cache,
            cache_lock: Mutex::new(()),
            max_document_chars,
            max_file_bytes,
        }
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    pub fn embedder(&self) -> &BatchingEmbedder {
        &self.embedder
    }

    pub fn cache(&self) -> &DiskEmbeddingCache {
        &self.cache
    }

    pub async fn build_file_index(&self) -> Result<FileIndex> {
        let corpus = self.collect().await?;
        self.file_index_from(&corpus).await
    }

    pub async fn build_identifier_index(&self) -> Result<IdentifierIndex> {
        let corpus = self.collect().await?;
        self.identifier_index_from(&corpus).await
    }

    pub async fn file_index_from(&self, corpus: &Corpus) -> Result<FileIndex> {
        let started = Instant::now();
        let items: Vec<(String, String)> = corpus
            .documents
            .iter()
            .map(|d| (file_key(&d.path), d.embedding_text()))
            .collect();
        let embedded = self
            .embed_with_cache(CacheNamespace::Files, items, true)
            .await?;

        let mut stats = BuildStats {
            files_scanned: corpus.scanned,
            skipped_files: corpus.skipped,
            cache_hits: embedded.hits,
            embedded: embedded.embedded,
            pruned: embedded.pruned,
            ..BuildStats::default()
        };
        let mut index = FileIndex::default();
        for (doc, vector) in corpus.documents.iter().cloned().zip(embedded.vectors) {
            match vector {
                Some(v) => {
                    index.documents.push(doc);
                    index.vectors.push(v);
                }
                None => stats.skipped_embeddings += 1,
            }
        }
        stats.documents = index.documents.len();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            documents = stats.documents,
            cache_hits = stats.cache_hits,
            embedded = stats.embedded,
            skipped = stats.skipped_files + stats.skipped_embeddings,
            elapsed_ms = stats.elapsed_ms,
            "File index built"
        );
        index.stats = stats;
        Ok(index)
    }

    pub async fn identifier_index_from(&self, corpus: &Corpus) -> Result<IdentifierIndex> {
        let started = Instant::now();
        let items: Vec<(String, String)> = corpus
            .identifiers
            .iter()
            .map(|d| (identifier_key(&d.id), d.text.clone()))
            .collect();
        let live_files: HashSet<&str> = corpus.files.keys().map(String::as_str).collect();
        let embedded = {
            let _guard = self.cache_lock.lock().await;
            let mut map = self.cache.load(CacheNamespace::Identifiers).await;
            let mut result = self.embed_into(&mut map, items).await?;
            let live: HashSet<String> = corpus
                .identifiers
                .iter()
                .map(|d| identifier_key(&d.id))
                .collect();
            result.pruned = prune(&mut map, |key| match callsite_path(key) {
                Some(path) => live_files.contains(path),
                None => live.contains(key),
            });
            self.persist(CacheNamespace::Identifiers, &map).await;
            result
        };

        let mut stats = BuildStats {
            files_scanned: corpus.scanned,
            skipped_files: corpus.skipped,
            cache_hits: embedded.hits,
            embedded: embedded.embedded,
            pruned: embedded.pruned,
            ..BuildStats::default()
        };
        let mut index = IdentifierIndex {
            files: corpus.files.clone(),
            ..IdentifierIndex::default()
        };
        for (doc, vector) in corpus.identifiers.iter().cloned().zip(embedded.vectors) {
            match vector {
                Some(v) => {
                    index.identifiers.push(doc);
                    index.vectors.push(v);
                }
                None => stats.skipped_embeddings += 1,
            }
        }
        stats.documents = index.files.len();
        stats.identifiers = index.identifiers.len();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            identifiers = stats.identifiers,
            cache_hits = stats.cache_hits,
            embedded = stats.embedded,
            skipped = stats.skipped_files + stats.skipped_embeddings,
            elapsed_ms = stats.elapsed_ms,
            "Identifier index built"
        );
        index.stats = stats;
        Ok(index)
    }

    /// Embeds call-site snippets through the identifier cache namespace.
    /// `items` are `(path, line, text)`.
    pub async fn embed_callsites(
        &self,
        items: &[(String, usize, String)],
    ) -> Result<Vec<Option<Vec<f32>>>> {
        let keyed: Vec<(String, String)> = items
            .iter()
            .map(|(path, line, text)| (callsite_key(path, *line), text.clone()))
            .collect();
        let result = self
            .embed_with_cache(CacheNamespace::Identifiers, keyed, false)
            .await?;
        tracing::debug!(
            sites = items.len(),
            cache_hits = result.hits,
            embedded = result.embedded,
            "Embedded call sites"
        );
        Ok(result.vectors)
    }

    /// Re-embeds only the given root-relative paths into both cache
    /// namespaces. Paths that no longer exist have their entries removed.
    pub async fn refresh_paths(&self, rel_paths: &[String]) -> Result<RefreshOutcome> {
        let mut outcome = RefreshOutcome::default();
        let mut file_items = Vec::new();
        let mut identifier_items = Vec::new();
        let mut removed: Vec<&str> = Vec::new();

        for rel in rel_paths {
            let abs = self.paths.absolute(rel);
            if !abs.is_file() {
                removed.push(rel.as_str());
                continue;
            }
            match self.analyze_file(rel, &abs).await {
                FileOutcome::Code {
                    document,
                    identifiers,
                    ..
                } => {
                    file_items.push((file_key(&document.path), document.embedding_text()));
                    identifier_items.extend(
                        identifiers
                            .iter()
                            .map(|d| (identifier_key(&d.id), d.text.clone())),
                    );
                    outcome.refreshed += 1;
                }
                FileOutcome::Text(document) => {
                    file_items.push((file_key(&document.path), document.embedding_text()));
                    outcome.refreshed += 1;
                }
                FileOutcome::Skipped => removed.push(rel.as_str()),
            }
        }

        let _guard = self.cache_lock.lock().await;
        for ns in [CacheNamespace::Files, CacheNamespace::Identifiers] {
            let items = match ns {
                CacheNamespace::Files => std::mem::take(&mut file_items),
                CacheNamespace::Identifiers => std::mem::take(&mut identifier_items),
            };
            let mut map = self.cache.load(ns).await;
            let before = map.len();
            prune(&mut map, |key| !removed.iter().any(|rel| belongs_to(key, rel)));
            outcome.removed += before - map.len();
            let result = self.embed_into(&mut map, items).await?;
            outcome.embedded += result.embedded;
            self.persist(ns, &map).await;
        }
        tracing::debug!(?outcome, "Refreshed paths");
        Ok(outcome)
    }

    /// Walks the tree and parses every supported file.
    pub async fn collect(&self) -> Result<Corpus> {
        let paths = self.paths.clone();
        let entries = tokio::task::spawn_blocking(move || walk(&paths, &WalkOptions::default()))
            .await
            .context("Walk task failed")?;

        let mut corpus = Corpus::default();
        for entry in entries {
            corpus.scanned += 1;
            match self.analyze_file(&entry.relative_path, &entry.path).await {
                FileOutcome::Code {
                    document,
                    identifiers,
                    source,
                } => {
                    corpus.files.insert(document.path.clone(), source);
                    corpus.identifiers.extend(identifiers);
                    corpus.documents.push(document);
                }
                FileOutcome::Text(document) => corpus.documents.push(document),
                FileOutcome::Skipped => corpus.skipped += 1,
            }
        }
        Ok(corpus)
    }

    async fn analyze_file(&self, rel: &str, abs: &Path) -> FileOutcome {
        let is_code = self.parser.is_supported(abs);
        let is_text = is_text_document(abs);
        if !is_code && !is_text {
            return FileOutcome::Skipped;
        }
        match tokio::fs::metadata(abs).await {
            Ok(meta) if meta.len() <= self.max_file_bytes => {}
            Ok(_) => {
                tracing::debug!(file = rel, "Skipping oversized file");
                return FileOutcome::Skipped;
            }
            Err(err) => {
                tracing::warn!(file = rel, error = %err, "Failed to stat file");
                return FileOutcome::Skipped;
            }
        }
        let source = match tokio::fs::read_to_string(abs).await {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(file = rel, error = %err, "Failed to read file");
                return FileOutcome::Skipped;
            }
        };
        if source.trim().is_empty() {
            return FileOutcome::Skipped;
        }

        if is_code {
            match self.parser.analyze(abs, &source) {
                Ok(analysis) => {
                    let (document, identifiers) =
                        code_documents(rel, &analysis, self.max_document_chars);
                    return FileOutcome::Code {
                        document,
                        identifiers,
                        source,
                    };
                }
                Err(err) => {
                    tracing::debug!(file = rel, error = %err, "Structural parse failed");
                    if !is_text {
                        return FileOutcome::Skipped;
                    }
                }
            }
        }
        FileOutcome::Text(text_document(rel, &source, self.max_document_chars))
    }

    async fn embed_with_cache(
        &self,
        ns: CacheNamespace,
        items: Vec<(String, String)>,
        prune_missing: bool,
    ) -> Result<CachedEmbeddings> {
        let _guard = self.cache_lock.lock().await;
        let mut map = self.cache.load(ns).await;
        let live: HashSet<String> = if prune_missing {
            items.iter().map(|(k, _)| k.clone()).collect()
        } else {
            HashSet::new()
        };
        let mut result = self.embed_into(&mut map, items).await?;
        if prune_missing {
            result.pruned = prune(&mut map, |key| live.contains(key));
        }
        self.persist(ns, &map).await;
        Ok(result)
    }

    /// Fills `map` with vectors for every item whose hash is not cached.
    async fn embed_into(
        &self,
        map: &mut BTreeMap<String, CacheEntry>,
        items: Vec<(String, String)>,
    ) -> Result<CachedEmbeddings> {
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; items.len()];
        let mut miss_slots = Vec::new();
        let mut miss_texts = Vec::new();
        let mut hashes = Vec::with_capacity(items.len());
        let mut hits = 0usize;

        for (i, (key, text)) in items.iter().enumerate() {
            let hash = content_hash(text);
            match lookup(map, key, &hash) {
                Some(v) => {
                    vectors[i] = Some(v.clone());
                    hits += 1;
                }
                None => {
                    miss_slots.push(i);
                    miss_texts.push(text.clone());
                }
            }
            hashes.push(hash);
        }

        let mut embedded = 0usize;
        if !miss_texts.is_empty() {
            let fresh = self
                .embedder
                .embed_lenient(&miss_texts)
                .await
                .context("Embedding provider failed")?;
            for (slot, vector) in miss_slots.into_iter().zip(fresh) {
                if let Some(v) = vector {
                    map.insert(
                        items[slot].0.clone(),
                        CacheEntry {
                            hash: hashes[slot].clone(),
                            vector: v.clone(),
                        },
                    );
                    vectors[slot] = Some(v);
                    embedded += 1;
                }
            }
        }

        Ok(CachedEmbeddings {
            vectors,
            hits,
            embedded,
            pruned: 0,
        })
    }

    async fn persist(&self, ns: CacheNamespace, map: &BTreeMap<String, CacheEntry>) {
        if let Err(err) = self.cache.save(ns, map).await {
            tracing::warn!(error = %err, "Failed to persist embedding cache");
        }
    }
}

fn belongs_to(key: &str, rel: &str) -> bool {
    if key == rel {
        return true;
    }
    if let Some(path) = callsite_path(key) {
        return path == rel;
    }
    key.strip_prefix("id:")
        .and_then(|rest| rest.strip_prefix(rel))
        .is_some_and(|rest| rest.starts_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belongs_to_matches_every_key_shape() {
        assert!(belongs_to("src/a.rs", "src/a.rs"));
        assert!(belongs_to("id:src/a.rs:run:3", "src/a.rs"));
        assert!(belongs_to("callsite:src/a.rs:9", "src/a.rs"));
        assert!(!belongs_to("id:src/a.rs.bak:run:3", "src/a.rs"));
        assert!(!belongs_to("src/ab.rs", "src/a.rs"));
    }
}
