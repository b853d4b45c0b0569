use serde::Serialize;

use super::keyword::{KeywordWeights, QueryTerms};
use super::ranking::{rank, HybridOptions, Scores};
use crate::embeddings::cosine_similarity;
use crate::indexer::{FileIndex, SymbolEntry};
use crate::text::token_set;

#[derive(Debug, Clone, Serialize)]
pub struct FileHit {
    pub path: String,
    pub header: String,
    /// Symbols whose names share a token with the query.
    pub matched_symbols: Vec<SymbolEntry>,
    pub scores: Scores,
}

/// True when `path` is `scope` or lies under it. An empty or `.` scope
/// matches everything.
pub fn in_scope(path: &str, scope: Option<&str>) -> bool {
    let Some(scope) = scope.map(|s| s.trim_matches('/')) else {
        return true;
    };
    if scope.is_empty() || scope == "." {
        return true;
    }
    path == scope
        || path
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn matched_symbols<'a>(
    terms: &QueryTerms,
    entries: &'a [SymbolEntry],
) -> impl Iterator<Item = &'a SymbolEntry> + 'a {
    let tokens = terms.tokens.clone();
    entries.iter().filter(move |e| {
        token_set(&e.name)
            .iter()
            .any(|t| tokens.contains(t))
    })
}

/// Hybrid whole-file search over one snapshot.
pub fn search_files(
    index: &FileIndex,
    terms: &QueryTerms,
    query_vector: &[f32],
    scope: Option<&str>,
    options: &HybridOptions,
    weights: KeywordWeights,
) -> Vec<FileHit> {
    let candidates = index
        .documents
        .iter()
        .zip(&index.vectors)
        .enumerate()
        .filter(|(_, (doc, _))| in_scope(&doc.path, scope))
        .map(|(i, (doc, vector))| {
            let keyword = terms.score(&doc.keyword_text(), weights);
            (i, cosine_similarity(query_vector, vector), keyword)
        });

    rank(candidates, options)
        .into_iter()
        .map(|ranked| {
            let doc = &index.documents[ranked.index];
            FileHit {
                path: doc.path.clone(),
                header: doc.header.clone(),
                matched_symbols: matched_symbols(terms, &doc.symbol_entries)
                    .cloned()
                    .collect(),
                scores: ranked.scores,
            }
        })
        .collect()
}
