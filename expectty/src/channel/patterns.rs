//! Pattern matching for expect calls.

use std::ops::Range;

use memchr::memmem;
use regex::bytes::Regex;

/// Trait for output matching - regex by default, extensible for custom matchers.
pub trait Matcher: Send + Sync {
    /// Returns the byte range of the first match, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

impl Matcher for Regex {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        self.find(data).map(|m| m.range())
    }
}

impl<M: Matcher + ?Sized> Matcher for &M {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        (**self).find_match(data)
    }
}

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        (**self).find_match(data)
    }
}

/// Exact byte-string matcher.
///
/// Cheaper than a regex for fixed prompts like `"$ "` or `"Password: "`.
#[derive(Debug, Clone)]
pub struct Literal {
    finder: memmem::Finder<'static>,
}

impl Literal {
    pub fn new(needle: impl AsRef<[u8]>) -> Self {
        Self {
            finder: memmem::Finder::new(needle.as_ref()).into_owned(),
        }
    }

    /// The bytes this matcher looks for.
    pub fn needle(&self) -> &[u8] {
        self.finder.needle()
    }
}

impl Matcher for Literal {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        self.finder
            .find(data)
            .map(|start| start..start + self.finder.needle().len())
    }
}

/// Test `patterns` in list order against `data`.
///
/// Returns the index of the first pattern (by position in `patterns`, not by
/// position in `data`) that matches anywhere, with its match range.
pub(crate) fn first_match<M: Matcher>(
    patterns: &[M],
    data: &[u8],
) -> Option<(usize, Range<usize>)> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(index, pattern)| pattern.find_match(data).map(|range| (index, range)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_matcher() {
        let pattern = Regex::new(r"router#\s*$").unwrap();
        assert_eq!(pattern.find_match(b"output\nrouter# "), Some(7..15));
        assert!(!pattern.is_match(b"router> "));
    }

    #[test]
    fn test_literal_matcher() {
        let prompt = Literal::new("$ ");
        assert_eq!(prompt.find_match(b"user@host:~$ "), Some(11..13));
        assert!(!prompt.is_match(b"user@host:~#"));
        assert_eq!(prompt.needle(), b"$ ");
    }

    #[test]
    fn test_first_match_uses_list_order() {
        let patterns = [Regex::new("foo").unwrap(), Regex::new("bar").unwrap()];
        // "bar" appears first in the data, but "foo" is first in the list.
        assert_eq!(first_match(&patterns, b"barfoo"), Some((0, 3..6)));
    }

    #[test]
    fn test_first_match_skips_non_matching() {
        let patterns = [
            Regex::new("baz").unwrap(),
            Regex::new("foo").unwrap(),
            Regex::new("bar").unwrap(),
        ];
        assert_eq!(first_match(&patterns, b"barfoo"), Some((1, 3..6)));
        assert_eq!(first_match(&patterns, b"nothing"), None);
    }

    #[test]
    fn test_mixed_matchers() {
        let patterns: Vec<Box<dyn Matcher>> = vec![
            Box::new(Literal::new("Password:")),
            Box::new(Regex::new(r"[$#] $").unwrap()),
        ];
        assert_eq!(first_match(&patterns, b"host# "), Some((1, 4..6)));
    }
}
