//! Pattern-based path exclusion.
//!
//! Patterns are evaluated against the normalized relative path, anchored at
//! the start (a pattern must match from the beginning of the path) and
//! unanchored at the end. The matcher always carries one built-in pattern
//! that keeps the persisted manifest caches out of their own backups.

use crate::utils::errors::{BackupError, Result};
use regex::Regex;

/// Matches the persisted manifest cache files at the root of a working
/// directory, including a temp file left behind by an interrupted save.
const MANIFEST_FILE_PATTERN: &str = r"^\.panel-backup\.[^/]+\.json(?:\.tmp)?$";

/// Ordered set of compiled exclusion patterns. First match short-circuits.
pub struct ExclusionMatcher {
    patterns: Vec<Regex>,
}

impl ExclusionMatcher {
    /// Compile the user-supplied patterns plus the built-in manifest pattern.
    /// An invalid pattern is a configuration error.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len() + 1);
        compiled.push(compile(MANIFEST_FILE_PATTERN)?);
        for pattern in patterns {
            compiled.push(compile(&format!("^(?:{pattern})"))?);
        }
        Ok(Self { patterns: compiled })
    }

    /// Whether the given normalized relative path is out of scope for backup.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(relative))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|err| BackupError::Config(format!("invalid exclusion pattern {pattern:?}: {err}")))
}
