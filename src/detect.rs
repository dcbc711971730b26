//! Per-file change detection against the manifest cache.

use crate::fs::hasher::{self, FileIdentity};
use crate::fs::walker::CandidatePath;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Decide whether a file must be uploaded, short-circuiting cheapest-first:
/// never seen before, then a metadata-only comparison, then the content
/// digest (catches metadata drift such as a touch without modification).
///
/// Any I/O failure while probing resolves to "skip": the cache stays
/// untouched for that path, so it is retried on the next scheduled run.
pub fn needs_upload(
    root: &Path,
    candidate: &CandidatePath,
    prior: &BTreeMap<String, FileIdentity>,
) -> bool {
    let Some(previous) = prior.get(candidate.as_str()) else {
        return true;
    };

    let local = candidate.to_local(root);
    let (mtime, size) = match hasher::probe(&local) {
        Ok(probed) => probed,
        Err(err) => {
            warn!(
                "Cannot probe {}: {}; skipping until next run",
                candidate, err
            );
            return false;
        }
    };

    if mtime == previous.mtime && size == previous.size {
        return false;
    }

    match hasher::digest(&local) {
        Ok(digest) => digest != previous.digest,
        Err(err) => {
            warn!("Cannot hash {}: {}; skipping until next run", candidate, err);
            false
        }
    }
}
