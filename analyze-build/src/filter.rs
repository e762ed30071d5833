// SPDX-License-Identifier: GPL-3.0-or-later

//! Source filtering of the working set.
//!
//! The filter is built from two ordered lists of regular expressions.
//!
//! 1. **Include stage**: When no include pattern is given, every path passes.
//!    Otherwise a path passes if any of the include patterns match it. The
//!    stage is a single pass, a path is kept at most once and the relative
//!    order of the paths is preserved.
//!
//! 2. **Exclude stage**: The exclude patterns are applied one after the other,
//!    each removes the paths it matches from the remaining set.
//!
//! Matching is a search: a pattern matches when it occurs anywhere in the
//! path string. Use `^` and `$` to anchor it.

use regex_lite::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// A compiled include/exclude filter for source paths.
#[derive(Clone, Debug)]
pub struct SourceFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl SourceFilter {
    /// Compiles the given patterns into a filter.
    ///
    /// Fails on the first pattern which is not a valid regular expression.
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self, FilterError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(SourceFilter { include: compile(include)?, exclude: compile(exclude)? })
    }

    /// Applies the include then the exclude stage on the paths.
    pub fn apply(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut result = if self.include.is_empty() {
            paths
        } else {
            paths
                .into_iter()
                .filter(|path| {
                    let candidate = path.to_string_lossy();
                    self.include.iter().any(|pattern| pattern.is_match(&candidate))
                })
                .collect()
        };

        for pattern in &self.exclude {
            let before = result.len();
            result.retain(|path| !pattern.is_match(&path.to_string_lossy()));
            log::debug!(
                "Exclude pattern '{}' removed {} files",
                pattern.as_str(),
                before - result.len()
            );
        }
        result
    }
}

fn compile<T>(patterns: T) -> Result<Vec<Regex>, FilterError>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            Regex::new(pattern)
                .map_err(|source| FilterError::InvalidPattern { pattern: pattern.to_string(), source })
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid source filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}
