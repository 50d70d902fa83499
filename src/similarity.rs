//! Normalized string similarity.
//!
//! Scores are case-insensitive, deterministic and always within `[0, 1]`,
//! with identical strings scoring exactly `1.0`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    /// `1 - lev(a, b) / max(len(a), len(b))`
    #[default]
    Levenshtein,
    JaroWinkler,
}

/// Similarity between `input` and `target` using the default metric.
pub fn score(input: &str, target: &str) -> f64 {
    score_with(Metric::Levenshtein, input, target)
}

pub fn score_with(metric: Metric, input: &str, target: &str) -> f64 {
    if input == target {
        return 1.0;
    }
    let a = input.to_lowercase();
    let b = target.to_lowercase();
    let raw = match metric {
        Metric::Levenshtein => strsim::normalized_levenshtein(&a, &b),
        Metric::JaroWinkler => strsim::jaro_winkler(&a, &b),
    };
    raw.clamp(0.0, 1.0)
}
