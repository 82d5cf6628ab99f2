//! Selection of manifest files by name

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};

/// Compiled-size cap for user supplied patterns
const PATTERN_SIZE_LIMIT: usize = 1024 * 1024;

/// Selects files whose output name matches any of a set of regular expressions
///
/// Patterns are searched for anywhere in the name (use `^`/`$` to anchor).
/// With `invert`, files matching none of the patterns are selected instead.
/// An empty pattern set selects everything either way.
#[derive(Clone, Debug, Default)]
pub struct NameFilter {
    patterns: Vec<Regex>,
    invert: bool,
}

impl NameFilter {
    /// Compile `patterns`; an invalid pattern is a configuration error
    pub fn new<S: AsRef<str>>(patterns: &[S], invert: bool) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(pattern)
                    .size_limit(PATTERN_SIZE_LIMIT)
                    .build()
                    .map_err(|e| Error::config("pattern", format!("invalid pattern {pattern:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns, invert })
    }

    /// A filter that selects every file
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the file named `name` is selected
    pub fn matches(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let hit = self.patterns.iter().any(|re| re.is_match(name));
        hit != self.invert
    }
}
