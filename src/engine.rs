//! Suggestion engine: score an unknown token against the registry and pick
//! the candidates worth offering.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::registry::CommandNames;
use crate::similarity::{score_with, Metric};

/// A command reaching the similarity threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionCandidate {
    /// Canonical command name
    pub name: String,

    /// Best score over the name and its aliases
    pub score: f64,

    /// Spellings (name or aliases) that reached the threshold, in
    /// registration order
    pub spellings: Vec<String>,
}

impl SuggestionCandidate {
    /// The spelling to show when this is the only candidate.
    pub fn best_spelling(&self, input: &str, metric: Metric) -> &str {
        let mut best = self.name.as_str();
        let mut best_score = f64::MIN;
        for spelling in &self.spellings {
            let s = score_with(metric, input, spelling);
            if s > best_score {
                best_score = s;
                best = spelling.as_str();
            }
        }
        best
    }
}

/// Outcome of a lookup, by number of candidates
#[derive(Debug, Clone, PartialEq)]
pub enum Suggestions {
    None,
    Single(SuggestionCandidate),
    Multiple(Vec<SuggestionCandidate>),
}

impl Suggestions {
    pub fn classify(mut candidates: Vec<SuggestionCandidate>) -> Self {
        match candidates.len() {
            0 => Suggestions::None,
            1 => Suggestions::Single(candidates.remove(0)),
            _ => Suggestions::Multiple(candidates),
        }
    }
}

/// Score `input` against every command and alias.
///
/// Aliases collapse into their canonical command keeping the max score.
/// Results are sorted by descending score; ties keep registration order.
pub fn suggest(
    input: &str,
    candidates: &[CommandNames],
    threshold: f64,
    metric: Metric,
) -> Vec<SuggestionCandidate> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }

    let scored: Vec<SuggestionCandidate> = candidates
        .par_iter()
        .filter_map(|entry| {
            let mut best = 0.0_f64;
            let mut spellings = Vec::new();
            for spelling in entry.spellings() {
                let s = score_with(metric, input, spelling);
                best = best.max(s);
                if s >= threshold {
                    spellings.push(spelling.to_string());
                }
            }
            if best >= threshold {
                Some(SuggestionCandidate {
                    name: entry.name.clone(),
                    score: best,
                    spellings,
                })
            } else {
                None
            }
        })
        .collect();

    // the same name listed twice is one candidate
    let mut matched: Vec<SuggestionCandidate> = Vec::with_capacity(scored.len());
    for candidate in scored {
        match matched.iter_mut().find(|m| m.name == candidate.name) {
            Some(existing) => {
                existing.score = existing.score.max(candidate.score);
                for spelling in candidate.spellings {
                    if !existing.spellings.contains(&spelling) {
                        existing.spellings.push(spelling);
                    }
                }
            }
            None => matched.push(candidate),
        }
    }

    // stable: equal scores stay in registration order
    matched.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        "{} candidate(s) for {:?} at threshold {}",
        matched.len(),
        input,
        threshold
    );
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry() -> Vec<CommandNames> {
        vec![
            CommandNames::new("foo"),
            CommandNames::new("fooo").with_alias("bool"),
        ]
    }

    fn names(candidates: &[SuggestionCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_single_candidate() {
        let found = suggest("fo", &registry(), 0.64, Metric::Levenshtein);
        assert_eq!(names(&found), vec!["foo"]);
        assert_eq!(found[0].spellings, vec!["foo"]);
    }

    #[test]
    fn test_aliases_collapse_into_command() {
        let found = suggest("fool", &registry(), 0.64, Metric::Levenshtein);
        assert_eq!(names(&found), vec!["foo", "fooo"]);
        assert_eq!(found[1].spellings, vec!["fooo", "bool"]);
        assert_eq!(found[1].score, 0.75);
    }

    #[test]
    fn test_alias_only_match_reports_canonical_name() {
        let found = suggest("boo", &registry(), 0.7, Metric::Levenshtein);
        assert_eq!(names(&found), vec!["fooo"]);
        assert_eq!(found[0].spellings, vec!["bool"]);
        assert_eq!(found[0].best_spelling("boo", Metric::Levenshtein), "bool");
    }

    #[test]
    fn test_sorted_by_score_then_registration() {
        let targets = vec![
            CommandNames::new("bar"),
            CommandNames::new("baz"),
            CommandNames::new("bax"),
        ];
        let found = suggest("bax", &targets, 0.5, Metric::Levenshtein);
        assert_eq!(names(&found), vec!["bax", "bar", "baz"]);
    }

    #[test]
    fn test_no_candidates() {
        assert!(suggest("bar", &registry(), 0.64, Metric::Levenshtein).is_empty());
        assert!(suggest("   ", &registry(), 0.0, Metric::Levenshtein).is_empty());
        assert!(suggest("foo", &[], 0.0, Metric::Levenshtein).is_empty());
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let targets = vec![CommandNames::new("foo"), CommandNames::new("foo")];
        let found = suggest("fo", &targets, 0.5, Metric::Levenshtein);
        assert_eq!(names(&found), vec!["foo"]);
        assert_eq!(found[0].spellings, vec!["foo"]);
    }

    #[test]
    fn test_classify() {
        let found = suggest("fo", &registry(), 0.64, Metric::Levenshtein);
        assert!(matches!(Suggestions::classify(found), Suggestions::Single(c) if c.name == "foo"));

        let found = suggest("fool", &registry(), 0.64, Metric::Levenshtein);
        assert!(matches!(Suggestions::classify(found), Suggestions::Multiple(v) if v.len() == 2));

        assert_eq!(Suggestions::classify(Vec::new()), Suggestions::None);
    }

    proptest! {
        #[test]
        fn prop_higher_threshold_narrows(
            input in "[a-z]{1,6}",
            t1 in 0.0f64..=1.0,
            t2 in 0.0f64..=1.0,
        ) {
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let targets = vec![
                CommandNames::new("foo"),
                CommandNames::new("fooo").with_alias("bool"),
                CommandNames::new("bar"),
                CommandNames::new("baz"),
            ];
            let wide = suggest(&input, &targets, lo, Metric::Levenshtein);
            let narrow = suggest(&input, &targets, hi, Metric::Levenshtein);
            for c in &narrow {
                prop_assert!(wide.iter().any(|w| w.name == c.name));
            }
            for pair in wide.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
