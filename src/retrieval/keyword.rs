use std::collections::BTreeSet;

use crate::config::Config;
use crate::text::{collapse_whitespace, token_set};

/// Sub-weights for the blended keyword score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordWeights {
    pub coverage: f32,
    pub symbol: f32,
    pub phrase: f32,
}

impl Default for KeywordWeights {
    fn default() -> Self {
        Self {
            coverage: 0.65,
            symbol: 0.20,
            phrase: 0.15,
        }
    }
}

impl KeywordWeights {
    pub fn from_config(config: &Config) -> Self {
        Self {
            coverage: config.keyword_coverage_weight,
            symbol: config.keyword_symbol_weight,
            phrase: config.keyword_phrase_boost,
        }
    }
}

/// A query pre-split for repeated scoring.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    pub tokens: BTreeSet<String>,
    pub phrase: String,
}

impl QueryTerms {
    pub fn new(query: &str) -> Self {
        Self {
            tokens: token_set(query),
            phrase: collapse_whitespace(query),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Fraction of query tokens present in `doc_tokens`.
    pub fn coverage(&self, doc_tokens: &BTreeSet<String>) -> f32 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        let hit = self.tokens.iter().filter(|t| doc_tokens.contains(*t)).count();
        hit as f32 / self.tokens.len() as f32
    }

    fn phrase_in(&self, text: &str) -> bool {
        !self.phrase.is_empty() && collapse_whitespace(text).contains(&self.phrase)
    }

    /// Coverage plus a phrase bonus, capped at 1.
    pub fn score(&self, text: &str, weights: KeywordWeights) -> f32 {
        let mut score = self.coverage(&token_set(text));
        if self.phrase_in(text) {
            score += weights.phrase;
        }
        score.clamp(0.0, 1.0)
    }

    /// Weighted general coverage, symbol-name coverage and phrase bonus.
    pub fn blended_score(&self, text: &str, symbol_names: &[&str], weights: KeywordWeights) -> f32 {
        let general = self.coverage(&token_set(text));
        let symbol_tokens: BTreeSet<String> = symbol_names
            .iter()
            .flat_map(|name| token_set(name))
            .collect();
        let symbol = self.coverage(&symbol_tokens);
        let phrase = if self.phrase_in(text) { 1.0 } else { 0.0 };
        (weights.coverage * general + weights.symbol * symbol + weights.phrase * phrase)
            .clamp(0.0, 1.0)
    }
}
