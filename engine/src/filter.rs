//! Glob-based path filtering.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::config::WatchTarget;
use crate::error::{EngineError, Result};

/// Shell-glob semantics per path segment: `*` and `?` stop at
/// separators, `**` crosses them.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled include/exclude rules for one base directory.
///
/// A path matches when it satisfies at least one include pattern (an
/// empty include list matches everything) and no exclude pattern.
/// Patterns are evaluated against the path relative to the base
/// directory; paths outside it never match.
#[derive(Debug, Clone)]
pub struct PathFilter {
    base_dir: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    /// Compile the target's rules. Fails on the first malformed pattern.
    pub fn new(target: &WatchTarget) -> Result<Self> {
        Ok(Self {
            base_dir: target.base_dir.clone(),
            include: compile(&target.include)?,
            exclude: compile(&target.exclude)?,
        })
    }

    /// Whether `path` is subject to metric tracking.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.base_dir) else {
            return false;
        };

        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|pattern| pattern.matches_path_with(rel, GLOB_OPTIONS));

        included
            && !self
                .exclude
                .iter()
                .any(|pattern| pattern.matches_path_with(rel, GLOB_OPTIONS))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|source| EngineError::InvalidPattern {
                pattern: raw.clone(),
                source,
            })
        })
        .collect()
}
