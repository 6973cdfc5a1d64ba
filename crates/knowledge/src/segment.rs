//! Query segmentation for lexical search.
//!
//! Chinese text has no spaces, so the query is cut into words with jieba.
//! Latin text comes through jieba word-by-word as well.

use std::sync::LazyLock;

use jieba_rs::Jieba;

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);

/// Maximum number of tokens used for lexical matching.
pub const MAX_QUERY_TOKENS: usize = 5;

/// Segment a query into match tokens.
///
/// Tokens are trimmed; anything one character or shorter is dropped (single
/// characters, particles, punctuation, whitespace). At most the first
/// [`MAX_QUERY_TOKENS`] survivors are returned, in query order.
pub fn query_tokens(query: &str) -> Vec<String> {
    JIEBA
        .cut(query, true)
        .into_iter()
        .map(str::trim)
        .filter(|t| t.chars().count() > 1)
        .take(MAX_QUERY_TOKENS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_query_drops_short_tokens() {
        assert_eq!(query_tokens("find me X"), vec!["find", "me"]);
    }

    #[test]
    fn chinese_query_is_segmented() {
        let tokens = query_tokens("我想了解退款政策");
        assert!(tokens.iter().all(|t| t.chars().count() > 1));
        assert!(tokens.iter().any(|t| t == "退款" || t == "政策"));
    }

    #[test]
    fn at_most_five_tokens() {
        let tokens = query_tokens("alpha beta gamma delta epsilon zeta eta");
        assert_eq!(tokens, vec!["alpha", "beta", "gamma", "delta", "epsilon"]);
    }

    #[test]
    fn punctuation_only_query_has_no_tokens() {
        assert!(query_tokens("a ? b !").is_empty());
    }
}
