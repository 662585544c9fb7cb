//! Exclusion filtering for manifest generation.
//!
//! Patterns are matched against the POSIX form of a path relative to the
//! blueprint root. `*`, `?` and `[...]` never cross a `/`, so `*.md` only
//! matches top-level files; use `**/*.md` to match at any depth.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{CoreError, Result};

/// Compiled set of exclusion globs.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    globset: GlobSet,
}

impl ExclusionSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .backslash_escape(true)
                .build()
                .map_err(|e| CoreError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.kind().to_string(),
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let globset = builder.build().map_err(|e| CoreError::InvalidPattern {
            pattern: kept.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            patterns: kept,
            globset,
        })
    }

    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            globset: GlobSet::empty(),
        }
    }

    /// Checks a POSIX-normalized relative path against every pattern.
    pub fn is_excluded(&self, rel_posix: &str) -> bool {
        self.globset.is_match(rel_posix)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::empty()
    }
}
