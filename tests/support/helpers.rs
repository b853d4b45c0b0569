//! Test helper functions for integration tests
//!
//! Procedural helpers, not rstest fixtures: file writers, a counting
//! embedder and the wiring that turns a config into a `Retriever` without
//! touching the network.

use async_trait::async_trait;
use semantic_code_navigator::{
    config::Config,
    embeddings::{hash::HashEmbedder, BatchingEmbedder, EmbedError, Embedder, ShrinkPolicy},
    indexer::{FileAnalysis, IndexBuilder, StructuralParser, TreeSitterParser},
    navigator::{Navigator, NavigatorOptions},
    retrieval::Retriever,
    storage::cache::DiskEmbeddingCache,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Write `contents` to `rel` under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Hash embedder that counts every text it is asked to embed.
pub struct CountingEmbedder {
    inner: HashEmbedder,
    texts: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new(dim: usize) -> (Self, Arc<AtomicUsize>) {
        let texts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: HashEmbedder::new(dim),
                texts: texts.clone(),
            },
            texts,
        )
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn name(&self) -> &str {
        "counting-hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// Tree-sitter parser that counts every file it analyzes.
pub struct CountingParser {
    analyzed: Arc<AtomicUsize>,
}

impl CountingParser {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let analyzed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                analyzed: analyzed.clone(),
            },
            analyzed,
        )
    }
}

impl StructuralParser for CountingParser {
    fn is_supported(&self, path: &Path) -> bool {
        TreeSitterParser.is_supported(path)
    }

    fn analyze(&self, path: &Path, source: &str) -> anyhow::Result<FileAnalysis> {
        self.analyzed.fetch_add(1, Ordering::SeqCst);
        TreeSitterParser.analyze(path, source)
    }
}

pub fn index_builder(config: &Config, embedder: Arc<dyn Embedder>) -> IndexBuilder {
    index_builder_with_parser(config, embedder, Arc::new(TreeSitterParser))
}

pub fn index_builder_with_parser(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    parser: Arc<dyn StructuralParser>,
) -> IndexBuilder {
    IndexBuilder::new(
        config.repo_paths(),
        parser,
        BatchingEmbedder::new(
            embedder,
            config.embedding_batch_size,
            ShrinkPolicy {
                factor: config.embedding_shrink_factor,
                max_retries: config.embedding_max_shrink_retries,
            },
        ),
        DiskEmbeddingCache::new(&config.cache_dir),
        config.max_document_chars,
        config.max_file_bytes,
    )
}

/// Retriever over `config` with the given embedder and no labeler.
pub fn retriever_with(config: Arc<Config>, embedder: Arc<dyn Embedder>) -> Retriever {
    let builder = index_builder(&config, embedder);
    let navigator = Navigator::new(NavigatorOptions::from_config(&config), None);
    Retriever::new(config, Arc::new(builder), navigator)
}

/// Like [`retriever_with`], parsing through `parser`.
pub fn retriever_with_parser(
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    parser: Arc<dyn StructuralParser>,
) -> Retriever {
    let builder = index_builder_with_parser(&config, embedder, parser);
    let navigator = Navigator::new(NavigatorOptions::from_config(&config), None);
    Retriever::new(config, Arc::new(builder), navigator)
}
