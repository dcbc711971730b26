//! Deterministic directory traversal with early exclusion pruning.
//!
//! Entries are sorted by file name at every directory level and visited
//! depth-first, so two walks over an unchanged tree enumerate files in the
//! same order. Excluded directories are pruned before descent; their
//! contents are never enumerated.

use crate::fs::exclude::ExclusionMatcher;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// A file discovered under an instance root: the path relative to that root,
/// normalized to forward-slash form. Never traverses above the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidatePath(String);

impl CandidatePath {
    pub fn new(normalized: impl Into<String>) -> Self {
        Self(normalized.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve back to a real path under the given root.
    pub fn to_local(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.0.split('/') {
            path.push(segment);
        }
        path
    }

    /// Forward-slash parent directory; empty for top-level files.
    pub fn parent(&self) -> &str {
        match self.0.rfind('/') {
            Some(index) => &self.0[..index],
            None => "",
        }
    }
}

impl fmt::Display for CandidatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk the tree under `root`, yielding candidate files in stable pre-order.
///
/// Directories matching an exclusion pattern are pruned before descent.
/// Entries that disappear or become unreadable mid-walk are logged and
/// skipped; they never abort the traversal.
pub fn walk<'a>(
    root: &'a Path,
    matcher: &'a ExclusionMatcher,
) -> impl Iterator<Item = CandidatePath> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            match entry.path().strip_prefix(root) {
                Ok(relative) => !matcher.is_excluded(&normalize(relative)),
                Err(_) => false,
            }
        })
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    return None;
                }
                let relative = entry.path().strip_prefix(root).ok()?;
                Some(CandidatePath::new(normalize(relative)))
            }
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
}
