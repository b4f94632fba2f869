//! Tag name filtering for `list`
//!
//! A pattern containing glob metacharacters (`*`, `?`, `[`) is compiled with
//! globset; anything else is a plain substring match.

use globset::{Glob, GlobMatcher};

/// Errors from building a tag filter
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid tag filter '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Compiled tag filter
#[derive(Debug, Clone)]
pub enum TagFilter {
    /// Every tag matches
    All,
    Substring(String),
    Glob(GlobMatcher),
}

impl TagFilter {
    /// Build a filter from an optional user pattern
    pub fn new(pattern: Option<&str>) -> Result<Self, FilterError> {
        let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
            return Ok(TagFilter::All);
        };

        if pattern.contains(['*', '?', '[']) {
            let glob = Glob::new(pattern).map_err(|source| FilterError::InvalidGlob {
                pattern: pattern.to_string(),
                source,
            })?;
            Ok(TagFilter::Glob(glob.compile_matcher()))
        } else {
            Ok(TagFilter::Substring(pattern.to_string()))
        }
    }

    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::Substring(needle) => tag.contains(needle.as_str()),
            TagFilter::Glob(matcher) => matcher.is_match(tag),
        }
    }
}
