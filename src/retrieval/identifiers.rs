use serde::Serialize;

use super::callsites::CallSiteReport;
use super::files::in_scope;
use super::keyword::{KeywordWeights, QueryTerms};
use super::ranking::{rank, HybridOptions, Scores};
use crate::embeddings::cosine_similarity;
use crate::indexer::{IdentifierDocument, IdentifierIndex, SymbolKind};

#[derive(Debug, Clone, Serialize)]
pub struct IdentifierHit {
    pub identifier: IdentifierDocument,
    pub scores: Scores,
    pub calls: Option<CallSiteReport>,
}

/// Keyword score of one identifier: general coverage over its text blended
/// with coverage over its own and its parent's names.
pub fn identifier_keyword_score(
    doc: &IdentifierDocument,
    terms: &QueryTerms,
    weights: KeywordWeights,
) -> f32 {
    let mut names = vec![doc.name.as_str()];
    if let Some(parent) = doc.parent_name.as_deref() {
        names.push(parent);
    }
    terms.blended_score(&doc.keyword_text(), &names, weights)
}

pub fn search_identifiers(
    index: &IdentifierIndex,
    terms: &QueryTerms,
    query_vector: &[f32],
    scope: Option<&str>,
    kinds: &[SymbolKind],
    options: &HybridOptions,
    weights: KeywordWeights,
) -> Vec<IdentifierHit> {
    let candidates = index
        .identifiers
        .iter()
        .zip(&index.vectors)
        .enumerate()
        .filter(|(_, (doc, _))| in_scope(&doc.path, scope))
        .filter(|(_, (doc, _))| kinds.is_empty() || kinds.contains(&doc.kind))
        .map(|(i, (doc, vector))| {
            (
                i,
                cosine_similarity(query_vector, vector),
                identifier_keyword_score(doc, terms, weights),
            )
        });

    rank(candidates, options)
        .into_iter()
        .map(|ranked| IdentifierHit {
            identifier: index.identifiers[ranked.index].clone(),
            scores: ranked.scores,
            calls: None,
        })
        .collect()
}

/// Picks the definition a bare name refers to: callables first, then by
/// path and line.
pub fn resolve_identifier<'a>(
    index: &'a IdentifierIndex,
    name: &str,
    scope: Option<&str>,
) -> Option<&'a IdentifierDocument> {
    index
        .find(name)
        .into_iter()
        .map(|i| &index.identifiers[i])
        .filter(|d| in_scope(&d.path, scope))
        .min_by(|a, b| {
            b.kind
                .is_callable()
                .cmp(&a.kind.is_callable())
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.line.cmp(&b.line))
        })
}
