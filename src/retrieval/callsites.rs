use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use super::keyword::{KeywordWeights, QueryTerms};
use super::ranking::{rank, HybridOptions, Scores};
use crate::embeddings::cosine_similarity;
use crate::indexer::{IdentifierDocument, IdentifierIndex, IndexBuilder, SymbolKind};

/// Lower bound on how many candidates survive the keyword prefilter.
pub const MIN_PREFILTER: usize = 30;
/// Survivors per requested site above that bound.
pub const PREFILTER_FACTOR: usize = 4;

/// Declaration statements across the supported languages.
const DEFINITION_PATTERN: &str = r"^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|static|abstract|unsafe|extern|public|private|protected)\s+)*(?:fn|function|def|func|class|struct|enum|trait|interface|type|impl)\b";

static DEFINITION: OnceCell<Regex> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSite {
    pub path: String,
    pub line: usize,
    /// The matching line, trimmed.
    pub text: String,
    /// The line with one line of context either side.
    pub snippet: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallSiteReport {
    pub sites: Vec<CallSite>,
    /// Occurrences found before any truncation.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: String,
    pub line: usize,
    pub text: String,
    pub snippet: String,
}

impl Candidate {
    pub fn embedding_text(&self) -> String {
        format!("{}:{}\n{}", self.path, self.line, self.snippet)
    }

    fn keyword_text(&self) -> String {
        format!("{} {}", self.path, self.snippet)
    }
}

pub fn prefilter_size(limit: usize) -> usize {
    MIN_PREFILTER.max(limit.saturating_mul(PREFILTER_FACTOR))
}

/// Tells uses of one identifier apart from declarations.
pub struct OccurrenceMatcher {
    occurrence: Regex,
    definition: Regex,
}

impl OccurrenceMatcher {
    /// `name(` for callables, a bare word match otherwise.
    pub fn new(name: &str, kind: SymbolKind) -> Result<Self> {
        let escaped = regex::escape(name);
        let pattern = if kind.is_callable() {
            format!(r"\b{escaped}\s*\(")
        } else {
            format!(r"\b{escaped}\b")
        };
        Ok(Self {
            occurrence: Regex::new(&pattern)
                .with_context(|| format!("Invalid occurrence pattern for {name}"))?,
            definition: DEFINITION
                .get_or_try_init(|| Regex::new(DEFINITION_PATTERN))
                .context("Invalid definition pattern")?
                .clone(),
        })
    }

    pub fn mentions(&self, line: &str) -> bool {
        self.occurrence.is_match(line)
    }

    pub fn is_definition(&self, line: &str) -> bool {
        self.definition.is_match(line)
    }
}

/// Every use of `target` across the indexed sources, in path then line order.
pub fn find_candidates(
    index: &IdentifierIndex,
    target: &IdentifierDocument,
) -> Result<Vec<Candidate>> {
    let matcher = OccurrenceMatcher::new(&target.name, target.kind)?;
    let mut out = Vec::new();
    for (path, source) in &index.files {
        let lines: Vec<&str> = source.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let number = i + 1;
            if !matcher.mentions(line) {
                continue;
            }
            if (path == &target.path && number == target.line) || matcher.is_definition(line) {
                continue;
            }
            let from = i.saturating_sub(1);
            let to = (i + 1).min(lines.len() - 1);
            let snippet = lines[from..=to]
                .iter()
                .map(|l| l.trim_end())
                .collect::<Vec<_>>()
                .join("\n");
            out.push(Candidate {
                path: path.clone(),
                line: number,
                text: line.trim().to_string(),
                snippet,
            });
        }
    }
    Ok(out)
}

/// Keyword-only first pass. Keeps the best `keep` candidates, ties in
/// source order.
pub fn prefilter(
    candidates: Vec<Candidate>,
    terms: &QueryTerms,
    weights: KeywordWeights,
    keep: usize,
) -> Vec<(Candidate, f32)> {
    let mut scored: Vec<(Candidate, f32)> = candidates
        .into_iter()
        .map(|c| {
            let score = terms.score(&c.keyword_text(), weights);
            (c, score)
        })
        .collect();
    scored.sort_by(|(a, sa), (b, sb)| {
        sb.total_cmp(sa)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
    });
    scored.truncate(keep);
    scored
}

/// Two-stage call-site ranking: cheap keyword prefilter, then hybrid
/// scoring of the survivors only.
#[allow(clippy::too_many_arguments)]
pub async fn rank_call_sites(
    builder: &IndexBuilder,
    index: &IdentifierIndex,
    target: &IdentifierDocument,
    terms: &QueryTerms,
    query_vector: &[f32],
    limit: usize,
    options: &HybridOptions,
    weights: KeywordWeights,
) -> Result<CallSiteReport> {
    let candidates = find_candidates(index, target)?;
    let total = candidates.len();
    if limit == 0 || total == 0 {
        return Ok(CallSiteReport {
            sites: Vec::new(),
            total,
        });
    }

    let survivors = prefilter(candidates, terms, weights, prefilter_size(limit));
    let items: Vec<(String, usize, String)> = survivors
        .iter()
        .map(|(c, _)| (c.path.clone(), c.line, c.embedding_text()))
        .collect();
    let vectors = builder.embed_callsites(&items).await?;

    let options = HybridOptions {
        top_k: limit,
        ..options.clone()
    };
    let ranked = rank(
        survivors
            .iter()
            .zip(&vectors)
            .enumerate()
            .filter_map(|(i, ((_, keyword), vector))| {
                vector
                    .as_ref()
                    .map(|v| (i, cosine_similarity(query_vector, v), *keyword))
            }),
        &options,
    );

    tracing::debug!(
        identifier = %target.id,
        total,
        embedded = survivors.len(),
        shown = ranked.len(),
        "Ranked call sites"
    );
    let sites = ranked
        .into_iter()
        .map(|r| {
            let (candidate, _) = &survivors[r.index];
            CallSite {
                path: candidate.path.clone(),
                line: candidate.line,
                text: candidate.text.clone(),
                snippet: candidate.snippet.clone(),
                scores: r.scores,
            }
        })
        .collect();
    Ok(CallSiteReport { sites, total })
}
