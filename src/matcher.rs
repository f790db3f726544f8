//! Per-segment path validation.
//!
//! A [`Matcher`] is an ordered list of patterns, one per path segment after the
//! route's leading segment. For a route registered at `/items/:id` with the
//! matcher `["^[0-9]+$"]`, the pattern is applied to `42` in `/items/42`.
//!
//! ```text
//! path      /items/42/tags/red
//! segments   items 42  tags red
//!            skip  [0] [1]  [2]   ← matcher index
//! ```
//!
//! `""` and `".*"` accept anything and never touch the regex engine. Every
//! other pattern is compiled once, at registration. A pattern that fails to
//! compile makes the whole matcher reject every request; so does a path with
//! fewer trailing segments than there are patterns.

use regex::Regex;

/// Ordered per-segment patterns attached to an endpoint.
#[derive(Clone, Debug, Default)]
pub struct Matcher {
    patterns: Vec<Pattern>,
}

#[derive(Clone, Debug)]
struct Pattern {
    source: String,
    rule: Rule,
}

#[derive(Clone, Debug)]
enum Rule {
    Any,
    Regex(Regex),
    Invalid(String),
}

impl Matcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Pattern::compile(p.as_ref()))
            .collect();
        Self { patterns }
    }

    /// A matcher that declares no constraint.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The patterns as they were declared.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }

    /// Patterns that failed to compile, with the compiler's message.
    pub fn invalid(&self) -> impl Iterator<Item = (&str, &str)> {
        self.patterns.iter().filter_map(|p| match &p.rule {
            Rule::Invalid(msg) => Some((p.source.as_str(), msg.as_str())),
            _ => None,
        })
    }

    /// Returns `true` when every pattern accepts its segment of `path`.
    ///
    /// Short-circuits on the first failing segment.
    pub fn matches(&self, path: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }

        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let mut segments = trimmed.split('/').skip(1);

        self.patterns.iter().all(|pattern| match segments.next() {
            Some(segment) => pattern.accepts(segment),
            None => false,
        })
    }
}

impl Pattern {
    fn compile(source: &str) -> Self {
        let rule = match source {
            "" | ".*" => Rule::Any,
            _ => match Regex::new(source) {
                Ok(re) => Rule::Regex(re),
                Err(e) => Rule::Invalid(e.to_string()),
            },
        };
        Self { source: source.to_owned(), rule }
    }

    fn accepts(&self, segment: &str) -> bool {
        match &self.rule {
            Rule::Any => true,
            Rule::Regex(re) => re.is_match(segment),
            Rule::Invalid(_) => false,
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for Matcher {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matcher_accepts_everything() {
        let m = Matcher::any();
        assert!(m.matches("/"));
        assert!(m.matches("/items"));
        assert!(m.matches("/items/abc/def"));
    }

    #[test]
    fn wildcards_accept_any_segment() {
        let m = Matcher::new(["", ".*"]);
        assert!(m.matches("/items/x/y"));
        assert!(m.matches("/items/1/2/3"));
        assert!(m.matches("/items//"));
    }

    #[test]
    fn leading_segment_is_skipped() {
        let m = Matcher::new(["^[0-9]+$"]);
        assert!(m.matches("/items/42"));
        assert!(!m.matches("/items/abc"));
        assert!(!m.matches("/42/items"));
    }

    #[test]
    fn all_patterns_must_pass() {
        let m = Matcher::new(["^[0-9]+$", "^[a-z]+$"]);
        assert!(m.matches("/items/42/red"));
        assert!(!m.matches("/items/42/RED"));
        assert!(!m.matches("/items/x/red"));
    }

    #[test]
    fn patterns_are_unanchored_unless_declared() {
        let m = Matcher::new(["[0-9]"]);
        assert!(m.matches("/items/abc1"));
        assert!(!m.matches("/items/abc"));
    }

    #[test]
    fn too_few_segments_is_a_no_match() {
        let m = Matcher::new([".*", ".*"]);
        assert!(!m.matches("/items/1"));
        assert!(!m.matches("/items"));
        assert!(!m.matches(""));
    }

    #[test]
    fn invalid_pattern_rejects_every_request() {
        let m = Matcher::new(["(unclosed"]);
        assert_eq!(m.invalid().count(), 1);
        assert!(!m.matches("/items/(unclosed"));
        assert!(!m.matches("/items/anything"));
    }

    #[test]
    fn sources_round_trip_for_logging() {
        let m: Matcher = ["", "^[0-9]+$"].into_iter().collect();
        assert_eq!(m.sources().collect::<Vec<_>>(), ["", "^[0-9]+$"]);
        assert_eq!(m.len(), 2);
    }
}
