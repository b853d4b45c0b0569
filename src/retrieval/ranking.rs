use serde::Serialize;
use std::cmp::Ordering;

use crate::config::Config;

/// Accepts a fraction or a percentage; `0.5` and `50` both mean 50%.
pub fn normalize_threshold(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    let v = if value > 1.0 { value / 100.0 } else { value };
    v.clamp(0.0, 1.0)
}

/// Score as a percentage with one decimal.
pub fn percent(score: f32) -> f32 {
    (score * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridOptions {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub min_semantic_score: f32,
    pub min_keyword_score: f32,
    pub min_combined_score: f32,
    pub require_keyword_match: bool,
    pub require_semantic_match: bool,
    pub top_k: usize,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            semantic_weight: 0.75,
            keyword_weight: 0.25,
            min_semantic_score: 0.0,
            min_keyword_score: 0.0,
            min_combined_score: 0.0,
            require_keyword_match: false,
            require_semantic_match: false,
            top_k: 10,
        }
    }
}

impl HybridOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            semantic_weight: config.rank_semantic_weight,
            keyword_weight: config.rank_keyword_weight,
            ..Self::default()
        }
    }

    pub fn callsites(config: &Config, limit: usize) -> Self {
        Self {
            semantic_weight: config.callsite_semantic_weight,
            keyword_weight: config.callsite_keyword_weight,
            top_k: limit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    /// Cosine floored at 0.
    pub semantic: f32,
    /// Cosine as computed, possibly negative.
    pub raw_semantic: f32,
    pub keyword: f32,
    pub combined: f32,
}

impl Scores {
    pub fn new(raw_semantic: f32, keyword: f32, semantic_weight: f32, keyword_weight: f32) -> Self {
        let semantic = raw_semantic.max(0.0);
        let sw = semantic_weight.max(0.0);
        let kw = keyword_weight.max(0.0);
        let total = sw + kw;
        let combined = if total > 0.0 {
            (sw * semantic + kw * keyword) / total
        } else {
            semantic
        };
        Self {
            semantic,
            raw_semantic,
            keyword,
            combined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ranked {
    /// Position of the candidate in the index it came from.
    pub index: usize,
    pub scores: Scores,
}

/// Scores, filters and orders candidates given as `(index, cosine, keyword)`.
pub fn rank<I>(candidates: I, options: &HybridOptions) -> Vec<Ranked>
where
    I: IntoIterator<Item = (usize, f32, f32)>,
{
    let min_semantic = normalize_threshold(options.min_semantic_score);
    let min_keyword = normalize_threshold(options.min_keyword_score);
    let min_combined = normalize_threshold(options.min_combined_score);

    let mut ranked: Vec<Ranked> = candidates
        .into_iter()
        .map(|(index, cosine, keyword)| Ranked {
            index,
            scores: Scores::new(
                cosine,
                keyword,
                options.semantic_weight,
                options.keyword_weight,
            ),
        })
        .filter(|r| {
            let s = r.scores;
            s.semantic >= min_semantic
                && s.keyword >= min_keyword
                && s.combined >= min_combined
                && (!options.require_keyword_match || s.keyword > 0.0)
                && (!options.require_semantic_match || s.semantic > 0.0)
        })
        .collect();

    ranked.sort_by(compare_ranked);
    ranked.truncate(options.top_k.max(1));
    ranked
}

/// Combined, then keyword, then semantic, all descending. Index breaks the
/// remaining ties so output is stable.
pub fn compare_ranked(a: &Ranked, b: &Ranked) -> Ordering {
    b.scores
        .combined
        .total_cmp(&a.scores.combined)
        .then_with(|| b.scores.keyword.total_cmp(&a.scores.keyword))
        .then_with(|| b.scores.semantic.total_cmp(&a.scores.semantic))
        .then_with(|| a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.5, 0.5; "fraction")]
    #[test_case(50.0, 0.5; "percentage")]
    #[test_case(1.0, 1.0; "one is a fraction")]
    #[test_case(250.0, 1.0; "clamped high")]
    #[test_case(-3.0, 0.0; "clamped low")]
    #[test_case(f32::NAN, 0.0; "nan")]
    fn thresholds_normalize(input: f32, expected: f32) {
        assert!((normalize_threshold(input) - expected).abs() < 1e-6);
    }

    #[test]
    fn fraction_and_percentage_thresholds_filter_identically() {
        let candidates = vec![(0, 0.9, 0.1), (1, 0.4, 0.2), (2, 0.6, 0.9)];
        let mut a = HybridOptions::default();
        a.min_combined_score = 0.5;
        let mut b = HybridOptions::default();
        b.min_combined_score = 50.0;
        assert_eq!(rank(candidates.clone(), &a), rank(candidates, &b));
    }

    #[test]
    fn equal_combined_scores_prefer_keyword_hits() {
        // semantic-only weighting makes combined equal; keyword breaks the tie
        let opts = HybridOptions {
            semantic_weight: 1.0,
            keyword_weight: 0.0,
            ..HybridOptions::default()
        };
        let ranked = rank(vec![(0, 0.5, 0.1), (1, 0.5, 0.8)], &opts);
        assert_eq!(ranked[0].index, 1);
        assert_eq!(ranked[1].index, 0);
    }

    #[test]
    fn negative_cosine_floors_but_is_reported() {
        let s = Scores::new(-0.4, 0.5, 0.75, 0.25);
        assert_eq!(s.semantic, 0.0);
        assert!((s.raw_semantic + 0.4).abs() < 1e-6);
        assert!((s.combined - 0.125).abs() < 1e-6);
    }

    #[test]
    fn zero_weights_fall_back_to_semantic() {
        let s = Scores::new(0.6, 1.0, 0.0, 0.0);
        assert!((s.combined - 0.6).abs() < 1e-6);
    }

    #[test]
    fn require_flags_filter_zero_scores() {
        let opts = HybridOptions {
            require_keyword_match: true,
            ..HybridOptions::default()
        };
        let ranked = rank(vec![(0, 0.9, 0.0), (1, 0.1, 0.2)], &opts);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].index, 1);

        let opts = HybridOptions {
            require_semantic_match: true,
            ..HybridOptions::default()
        };
        let ranked = rank(vec![(0, -0.2, 1.0), (1, 0.1, 0.0)], &opts);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].index, 1);
    }

    #[test]
    fn top_k_has_a_floor_of_one() {
        let opts = HybridOptions {
            top_k: 0,
            ..HybridOptions::default()
        };
        assert_eq!(rank(vec![(0, 0.1, 0.1), (1, 0.2, 0.2)], &opts).len(), 1);
    }

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert!((percent(0.12345) - 12.3).abs() < 1e-4);
        assert!((percent(0.9996) - 100.0).abs() < 1e-4);
    }
}
