pub mod callsites;
pub mod files;
pub mod format;
pub mod identifiers;
pub mod keyword;
pub mod ranking;

use crate::{
    config::Config,
    embeddings::{create_embedder, BatchingEmbedder, ShrinkPolicy},
    indexer::{
        BuildStats, Corpus, FileIndex, IdentifierIndex, IndexBuilder, RefreshOutcome, SnapshotCache,
        SymbolKind, TreeSitterParser,
    },
    navigator::{ClusterTree, Navigator, NavigatorOptions, OllamaGenerator, TextGenerator},
    storage::cache::DiskEmbeddingCache,
};
use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::{path::Path, sync::Arc, time::Duration};

pub use callsites::{CallSite, CallSiteReport};
pub use files::FileHit;
pub use identifiers::IdentifierHit;
pub use keyword::{KeywordWeights, QueryTerms};
pub use ranking::{HybridOptions, Scores};

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Restricts results to this sub-path of the root.
    pub path: Option<String>,
    pub options: HybridOptions,
}

#[derive(Debug, Clone)]
pub struct IdentifierRequest {
    pub query: String,
    pub path: Option<String>,
    pub kinds: Vec<SymbolKind>,
    pub options: HybridOptions,
    /// Ranked call sites attached to each hit; 0 attaches none.
    pub top_calls_per_identifier: usize,
}

#[derive(Debug, Clone)]
pub struct CallSiteRequest {
    pub name: String,
    /// Disambiguates which definition `name` means.
    pub path: Option<String>,
    /// Ranking query; defaults to the identifier's name and signature.
    pub query: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NavigateRequest {
    pub path: Option<String>,
    pub max_depth: Option<usize>,
    pub max_clusters: Option<usize>,
    pub leaf_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub age_ms: u64,
    pub build: BuildStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub root: String,
    pub embedder: String,
    pub file_index: Option<SnapshotStats>,
    pub identifier_index: Option<SnapshotStats>,
}

/// Search, call-site and navigation service over one root directory.
///
/// Owns the in-memory index snapshots; handlers receive it explicitly.
pub struct Retriever {
    config: Arc<Config>,
    builder: Arc<IndexBuilder>,
    /// Shared by both index builds.
    corpus: SnapshotCache<Corpus>,
    files: SnapshotCache<FileIndex>,
    identifiers: SnapshotCache<IdentifierIndex>,
    navigator: Navigator,
    weights: KeywordWeights,
}

impl Retriever {
    pub fn new(config: Arc<Config>, builder: Arc<IndexBuilder>, navigator: Navigator) -> Self {
        let ttl = Duration::from_secs(config.index_ttl_secs);
        Self {
            corpus: SnapshotCache::new(&config.base_dir, ttl),
            files: SnapshotCache::new(&config.base_dir, ttl),
            identifiers: SnapshotCache::new(&config.base_dir, ttl),
            weights: KeywordWeights::from_config(&config),
            config,
            builder,
            navigator,
        }
    }

    /// Wires the configured embedder, parser, cache and labeler.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let embedder = BatchingEmbedder::new(
            create_embedder(&config)?,
            config.embedding_batch_size,
            ShrinkPolicy {
                factor: config.embedding_shrink_factor,
                max_retries: config.embedding_max_shrink_retries,
            },
        );
        let builder = IndexBuilder::new(
            config.repo_paths(),
            Arc::new(TreeSitterParser),
            embedder,
            DiskEmbeddingCache::new(&config.cache_dir),
            config.max_document_chars,
            config.max_file_bytes,
        );
        let labeler: Option<Arc<dyn TextGenerator>> = if config.labels_enabled {
            Some(Arc::new(OllamaGenerator::new(
                &config.ollama_url,
                &config.label_model,
                config.embedding_timeout_secs,
            )?))
        } else {
            None
        };
        let navigator = Navigator::new(NavigatorOptions::from_config(&config), labeler);
        Ok(Self::new(config, Arc::new(builder), navigator))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    async fn corpus(&self) -> Result<Arc<Corpus>> {
        self.corpus
            .get_or_build(|| async { self.builder.collect().await })
            .await
    }

    pub async fn file_index(&self) -> Result<Arc<FileIndex>> {
        self.files
            .get_or_build(|| async {
                let corpus = self.corpus().await?;
                self.builder.file_index_from(&corpus).await
            })
            .await
    }

    pub async fn identifier_index(&self) -> Result<Arc<IdentifierIndex>> {
        self.identifiers
            .get_or_build(|| async {
                let corpus = self.corpus().await?;
                self.builder.identifier_index_from(&corpus).await
            })
            .await
    }

    pub async fn invalidate(&self) {
        self.corpus.invalidate().await;
        self.files.invalidate().await;
        self.identifiers.invalidate().await;
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        Ok(self.builder.embedder().embed_one(query).await?)
    }

    pub async fn file_hits(&self, req: &SearchRequest) -> Result<Vec<FileHit>> {
        let terms = QueryTerms::new(&req.query);
        let index = self.file_index().await?;
        let query_vector = self.embed_query(&req.query).await?;
        Ok(files::search_files(
            &index,
            &terms,
            &query_vector,
            req.path.as_deref(),
            &req.options,
            self.weights,
        ))
    }

    /// File-level hybrid search as a text report. Only an empty query is an
    /// error; provider failures are reported in the text.
    pub async fn search(&self, req: &SearchRequest) -> Result<String> {
        require_query(&req.query)?;
        match self.file_hits(req).await {
            Ok(hits) => Ok(format::file_report(&req.query, &hits, &req.options)),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Semantic search failed");
                Ok(format::unavailable("Search", &format!("{err:#}")))
            }
        }
    }

    pub async fn identifier_hits(&self, req: &IdentifierRequest) -> Result<Vec<IdentifierHit>> {
        let terms = QueryTerms::new(&req.query);
        let index = self.identifier_index().await?;
        let query_vector = self.embed_query(&req.query).await?;
        let mut hits = identifiers::search_identifiers(
            &index,
            &terms,
            &query_vector,
            req.path.as_deref(),
            &req.kinds,
            &req.options,
            self.weights,
        );
        if req.top_calls_per_identifier > 0 {
            let options = HybridOptions::callsites(&self.config, req.top_calls_per_identifier);
            for hit in &mut hits {
                let report = callsites::rank_call_sites(
                    &self.builder,
                    &index,
                    &hit.identifier,
                    &terms,
                    &query_vector,
                    req.top_calls_per_identifier,
                    &options,
                    self.weights,
                )
                .await?;
                hit.calls = Some(report);
            }
        }
        Ok(hits)
    }

    pub async fn search_identifiers(&self, req: &IdentifierRequest) -> Result<String> {
        require_query(&req.query)?;
        match self.identifier_hits(req).await {
            Ok(hits) => Ok(format::identifier_report(&req.query, &hits, &req.options)),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Identifier search failed");
                Ok(format::unavailable("Identifier search", &format!("{err:#}")))
            }
        }
    }

    /// Ranked call sites of one named identifier. An identifier that is not
    /// in the index is an error.
    pub async fn call_site_report(&self, req: &CallSiteRequest) -> Result<CallSiteReport> {
        let name = req.name.trim();
        if name.is_empty() {
            bail!("Identifier name must not be empty");
        }
        let index = self.identifier_index().await?;
        let target = identifiers::resolve_identifier(&index, name, req.path.as_deref())
            .ok_or_else(|| match &req.path {
                Some(path) => anyhow!("Unknown identifier `{name}` under {path}"),
                None => anyhow!("Unknown identifier `{name}`"),
            })?
            .clone();
        let query = req
            .query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| format!("{} {}", target.name, target.signature));
        let terms = QueryTerms::new(&query);
        let query_vector = self.embed_query(&query).await?;
        callsites::rank_call_sites(
            &self.builder,
            &index,
            &target,
            &terms,
            &query_vector,
            req.limit,
            &HybridOptions::callsites(&self.config, req.limit),
            self.weights,
        )
        .await
    }

    pub async fn find_call_sites(&self, req: &CallSiteRequest) -> Result<String> {
        let index = match self.identifier_index().await {
            Ok(index) => index,
            Err(err) => return Ok(format::unavailable("Call-site search", &format!("{err:#}"))),
        };
        let name = req.name.trim();
        let location = identifiers::resolve_identifier(&index, name, req.path.as_deref())
            .map(|d| format!("{}:{}", d.path, d.line));
        match self.call_site_report(req).await {
            Ok(report) => Ok(format::call_site_report(
                name,
                location.as_deref().unwrap_or("?"),
                &report,
            )),
            Err(err) if location.is_none() || name.is_empty() => Err(err),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Call-site search failed");
                Ok(format::unavailable("Call-site search", &format!("{err:#}")))
            }
        }
    }

    pub async fn navigate_tree(&self, req: &NavigateRequest) -> Result<ClusterTree> {
        let index = self.file_index().await?;
        let scope = req.path.as_deref();
        let (paths, vectors): (Vec<String>, Vec<Vec<f32>>) = index
            .documents
            .iter()
            .zip(&index.vectors)
            .filter(|(doc, _)| files::in_scope(&doc.path, scope))
            .map(|(doc, v)| (doc.path.clone(), v.clone()))
            .unzip();
        let options = self.navigator.options().with_overrides(
            req.max_depth,
            req.max_clusters,
            req.leaf_size,
        );
        let root_label = match scope.filter(|s| !s.is_empty() && *s != ".") {
            Some(s) => s.trim_matches('/').to_string(),
            None => self
                .config
                .base_dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("repository")
                .to_string(),
        };
        Ok(self
            .navigator
            .with_options(options)
            .build(&root_label, &paths, &vectors)
            .await)
    }

    pub async fn navigate(&self, req: &NavigateRequest) -> Result<String> {
        match self.navigate_tree(req).await {
            Ok(tree) => Ok(format::navigation_report(&tree)),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "Navigation failed");
                Ok(format::unavailable("Navigation", &format!("{err:#}")))
            }
        }
    }

    /// Re-embeds the given files into the disk cache and drops the
    /// in-memory snapshots.
    pub async fn refresh_paths(&self, rel_paths: &[String]) -> Result<RefreshOutcome> {
        let outcome = self.builder.refresh_paths(rel_paths).await?;
        self.invalidate().await;
        Ok(outcome)
    }

    /// With `files`, refreshes just those; otherwise rebuilds both indexes.
    pub async fn refresh(&self, files: &[String]) -> Result<String> {
        if !files.is_empty() {
            let mut rels = Vec::with_capacity(files.len());
            for file in files {
                rels.push(self.builder.paths().relative(Path::new(file))?);
            }
            let outcome = self.refresh_paths(&rels).await?;
            return Ok(format!(
                "Refreshed {} of {} files ({} embedded, {} cache entries removed)\n",
                outcome.refreshed,
                rels.len(),
                outcome.embedded,
                outcome.removed
            ));
        }

        self.invalidate().await;
        let file_index = self.file_index().await?;
        let identifier_index = self.identifier_index().await?;
        let f = &file_index.stats;
        let i = &identifier_index.stats;
        Ok(format!(
            "Rebuilt index: {} documents, {} identifiers ({} cache hits, {} embedded, {} skipped)\n",
            f.documents,
            i.identifiers,
            f.cache_hits + i.cache_hits,
            f.embedded + i.embedded,
            f.skipped_files + f.skipped_embeddings + i.skipped_embeddings
        ))
    }

    /// Counts of the current snapshots, without triggering a build.
    pub async fn stats(&self) -> IndexStats {
        let file_index = self.files.peek().await.map(|(index, age)| SnapshotStats {
            age_ms: age.as_millis() as u64,
            build: index.stats.clone(),
        });
        let identifier_index = self
            .identifiers
            .peek()
            .await
            .map(|(index, age)| SnapshotStats {
                age_ms: age.as_millis() as u64,
                build: index.stats.clone(),
            });
        IndexStats {
            root: self.config.base_dir.display().to_string(),
            embedder: self.builder.embedder().name().to_string(),
            file_index,
            identifier_index,
        }
    }
}

fn require_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    Ok(())
}
