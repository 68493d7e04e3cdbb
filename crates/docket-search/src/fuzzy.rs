//! Tokenisation and edit-distance matching for the fuzzy index.

use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, DFA};

use docket_core::defaults;

/// Largest edit distance accepted by [`FuzzyMatcher::new`].
///
/// Builder construction cost grows steeply with the distance: a few
/// milliseconds at 2, hundreds at 3 and seconds at 4.
pub const MAX_SUPPORTED_DISTANCE: u8 = 2;

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Builds per-query automata. Construct once and share; the builder
/// precomputes tables proportional to the edit distance.
pub struct FuzzyMatcher {
    builder: LevenshteinAutomatonBuilder,
    max_edit_distance: u8,
}

impl FuzzyMatcher {
    /// Matcher counting a transposition as a single edit.
    pub fn new(max_edit_distance: u8) -> Self {
        let max_edit_distance = max_edit_distance.min(MAX_SUPPORTED_DISTANCE);
        Self {
            builder: LevenshteinAutomatonBuilder::new(max_edit_distance, true),
            max_edit_distance,
        }
    }

    pub fn max_edit_distance(&self) -> u8 {
        self.max_edit_distance
    }

    /// Compile a normalised term. Returns `None` when it has no tokens.
    pub fn compile(&self, term: &str) -> Option<CompiledQuery> {
        let tokens: Vec<QueryToken> = tokenize(term)
            .into_iter()
            .map(|text| QueryToken {
                char_len: text.chars().count(),
                dfa: self.builder.build_dfa(&text),
                text,
            })
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(CompiledQuery {
                tokens,
                max_edit_distance: self.max_edit_distance,
            })
        }
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(defaults::FUZZY_MAX_EDIT_DISTANCE)
    }
}

struct QueryToken {
    text: String,
    char_len: usize,
    dfa: DFA,
}

/// A query ready to be scored against tokenised fields.
pub struct CompiledQuery {
    tokens: Vec<QueryToken>,
    max_edit_distance: u8,
}

impl CompiledQuery {
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }

    /// Mean over query tokens of the best normalised distance to any field
    /// token. 0.0 is an exact match, 1.0 means nothing came close.
    pub fn field_distance(&self, field_tokens: &[String]) -> f64 {
        let total: f64 = self
            .tokens
            .iter()
            .map(|q| self.token_distance(q, field_tokens))
            .sum();
        total / self.tokens.len() as f64
    }

    fn token_distance(&self, query: &QueryToken, field_tokens: &[String]) -> f64 {
        let mut best = 1.0_f64;
        for candidate in field_tokens {
            let candidate_len = candidate.chars().count();
            if candidate_len.abs_diff(query.char_len) > self.max_edit_distance as usize {
                continue;
            }
            if let Distance::Exact(d) = query.dfa.eval(candidate) {
                if d == 0 {
                    return 0.0;
                }
                let normalised = d as f64 / candidate_len.max(query.char_len) as f64;
                best = best.min(normalised);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        tokenize(text)
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Invoice #1021, PAID"), vec!["invoice", "1021", "paid"]);
        assert_eq!(tokenize("q3-report_final.pdf"), vec!["q3", "report", "final", "pdf"]);
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn test_exact_token_scores_zero() {
        let query = FuzzyMatcher::default().compile("invoice").unwrap();
        assert_eq!(query.field_distance(&tokens("Invoice #1021")), 0.0);
    }

    #[test]
    fn test_transposition_counts_as_one_edit() {
        let query = FuzzyMatcher::default().compile("invioce").unwrap();
        let distance = query.field_distance(&tokens("Invoice #1021"));
        assert!((distance - 1.0 / 7.0).abs() < 1e-9, "got {}", distance);
    }

    #[test]
    fn test_unrelated_token_scores_one() {
        let query = FuzzyMatcher::default().compile("zebra").unwrap();
        assert_eq!(query.field_distance(&tokens("Invoice #1021")), 1.0);
        assert_eq!(query.field_distance(&[]), 1.0);
    }

    #[test]
    fn test_multi_token_distance_is_mean() {
        let query = FuzzyMatcher::default().compile("invoice zebra").unwrap();
        assert_eq!(query.field_distance(&tokens("invoice")), 0.5);
    }

    #[test]
    fn test_compile_empty_term() {
        assert!(FuzzyMatcher::default().compile("  ").is_none());
        assert!(FuzzyMatcher::default().compile("#!").is_none());
    }

    #[test]
    fn test_max_distance_is_capped() {
        assert_eq!(FuzzyMatcher::new(9).max_edit_distance(), MAX_SUPPORTED_DISTANCE);
        assert_eq!(FuzzyMatcher::new(3).max_edit_distance(), 2);
        assert_eq!(FuzzyMatcher::new(1).max_edit_distance(), 1);
    }
}
