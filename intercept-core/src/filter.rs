//! URL pattern matching for interception: `*`, globs, substrings and prefixes

use regex::{Regex, RegexBuilder};

/// Compiled-size ceiling for a single glob pattern
const GLOB_SIZE_LIMIT: usize = 1 << 20;

/// Decide whether `url` should be intercepted by any of `patterns`.
///
/// Compiles the list on every call; hold a [`UrlMatcher`] when the same list
/// is checked repeatedly.
pub fn matches<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    UrlMatcher::new(patterns).matches(url)
}

#[derive(Debug, Clone)]
enum CompiledPattern {
    /// `"*"`, or a broken glob with nothing left after stripping `*`
    Any,
    Glob { raw: String, regex: Regex },
    /// No wildcard and no scheme
    Contains(String),
    /// No wildcard, scheme present
    Prefix(String),
    /// Glob that failed to compile, reduced to a substring
    Fallback { raw: String, needle: String },
    /// Blank entry left over from a form field, never matches
    Blank,
}

impl CompiledPattern {
    fn compile(pattern: &str, size_limit: usize) -> Self {
        if pattern.trim().is_empty() {
            return CompiledPattern::Blank;
        }
        if pattern == "*" {
            return CompiledPattern::Any;
        }

        if pattern.contains('*') {
            return match compile_glob(pattern, size_limit) {
                Ok(regex) => CompiledPattern::Glob {
                    raw: pattern.to_string(),
                    regex,
                },
                Err(err) => {
                    tracing::debug!(pattern, error = %err, "glob rejected, using substring match");
                    let needle = pattern.replace('*', "");
                    if needle.is_empty() {
                        CompiledPattern::Any
                    } else {
                        CompiledPattern::Fallback {
                            raw: pattern.to_string(),
                            needle,
                        }
                    }
                }
            };
        }

        if pattern.contains("://") {
            CompiledPattern::Prefix(pattern.to_string())
        } else {
            CompiledPattern::Contains(pattern.to_string())
        }
    }

    fn raw(&self) -> Option<&str> {
        match self {
            CompiledPattern::Glob { raw, .. } | CompiledPattern::Fallback { raw, .. } => Some(raw),
            CompiledPattern::Contains(raw) | CompiledPattern::Prefix(raw) => Some(raw),
            CompiledPattern::Any | CompiledPattern::Blank => None,
        }
    }

    fn matches(&self, url: &str) -> bool {
        if self.raw() == Some(url) {
            return true;
        }

        match self {
            CompiledPattern::Any => true,
            CompiledPattern::Glob { regex, .. } => regex.is_match(url),
            CompiledPattern::Contains(needle) => url.contains(needle.as_str()),
            CompiledPattern::Prefix(prefix) => url.starts_with(prefix.as_str()),
            CompiledPattern::Fallback { needle, .. } => url.contains(needle.as_str()),
            CompiledPattern::Blank => false,
        }
    }
}

/// Escape everything but `*`, which becomes an unbounded greedy wildcard,
/// and anchor the result to the whole URL.
fn compile_glob(pattern: &str, size_limit: usize) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    RegexBuilder::new(&format!("^{}$", body))
        .dot_matches_new_line(true)
        .size_limit(size_limit)
        .build()
}

/// Ordered list of compiled URL patterns for one interception session
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    patterns: Vec<String>,
    compiled: Vec<CompiledPattern>,
}

impl UrlMatcher {
    /// Compile a pattern list
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::with_size_limit(patterns, GLOB_SIZE_LIMIT)
    }

    fn with_size_limit<S: AsRef<str>>(patterns: &[S], size_limit: usize) -> Self {
        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let compiled = patterns
            .iter()
            .map(|p| CompiledPattern::compile(p, size_limit))
            .collect();

        Self { patterns, compiled }
    }

    /// Check whether the URL is selected for interception
    ///
    /// Logic:
    /// 1. An empty list never matches.
    /// 2. Patterns are tried in list order; the first match wins.
    /// 3. A pattern equal to the URL always matches, whatever its shape.
    /// 4. A blank or whitespace-only pattern never matches, so a stray empty
    ///    form field does not select every URL.
    pub fn matches(&self, url: &str) -> bool {
        self.compiled.iter().any(|pattern| pattern.matches(url))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
