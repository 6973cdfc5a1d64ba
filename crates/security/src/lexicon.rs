//! Sensitive-word matching.

use regex::Regex;
use std::sync::LazyLock;

/// Long digit runs (user IDs, order numbers) are removed before matching.
static ID_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d{10,}\b").ok());

/// A lowercased set of sensitive terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexicon {
    terms: Vec<String>,
}

impl Lexicon {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Return the first term found in `text`, if any.
    ///
    /// - Numeric terms only match when not embedded in a longer number.
    /// - Terms of one or two characters only match as standalone words.
    /// - Longer terms match anywhere.
    pub fn find_match(&self, text: &str) -> Option<&str> {
        if self.terms.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        let cleaned = match ID_RUN.as_ref() {
            Some(re) => re.replace_all(&lowered, ""),
            None => lowered.as_str().into(),
        };

        self.terms
            .iter()
            .find(|term| term_matches(&cleaned, term))
            .map(String::as_str)
    }
}

fn term_matches(text: &str, term: &str) -> bool {
    if term.chars().all(char::is_numeric) {
        bounded_match(text, term, char::is_numeric)
    } else if term.chars().count() <= 2 {
        bounded_match(text, term, is_word_char)
    } else {
        text.contains(term)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `term` occurs in `text` with no `blocked` character on either side.
fn bounded_match(text: &str, term: &str, blocked: fn(char) -> bool) -> bool {
    text.match_indices(term).any(|(start, found)| {
        let before = text[..start].chars().next_back();
        let after = text[start + found.len()..].chars().next();
        !before.is_some_and(blocked) && !after.is_some_and(blocked)
    })
}
