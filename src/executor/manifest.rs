//! Manifest cache: the durable record of what was last successfully uploaded.
//!
//! One cache per (working directory, label) pair, stored at the root of the
//! working directory and rewritten in full on save. A key being present means
//! the file was uploaded under this exact label at least once; absence means
//! "never backed up under this label", not "does not exist".

use crate::fs::hasher::FileIdentity;
use crate::fs::walker::CandidatePath;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MANIFEST_VERSION: u32 = 1;

/// On-disk form, pretty-printed JSON so operators can inspect it.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    label: String,
    saved_at: DateTime<Utc>,
    files: BTreeMap<String, FileIdentity>,
}

/// Mapping from normalized relative path to last-known identity.
#[derive(Debug)]
pub struct ManifestCache {
    path: PathBuf,
    label: String,
    entries: BTreeMap<String, FileIdentity>,
}

impl ManifestCache {
    /// Cache file name for a label, e.g. `.panel-backup.daily.json`.
    pub fn file_name(label: &str) -> String {
        format!(".panel-backup.{label}.json")
    }

    pub fn empty(root: &Path, label: &str) -> Self {
        Self {
            path: root.join(Self::file_name(label)),
            label: label.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the persisted cache for this (root, label) pair.
    ///
    /// A missing file yields an empty cache. An unparsable one is surfaced
    /// as [`BackupError::CorruptCache`] so the caller can decide whether to
    /// reset it or abort.
    pub fn load(root: &Path, label: &str) -> Result<Self> {
        let path = root.join(Self::file_name(label));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No manifest cache at {}, starting fresh", path.display());
                return Ok(Self::empty(root, label));
            }
            Err(err) => return Err(err.into()),
        };

        let parsed: ManifestFile = serde_json::from_str(&raw).map_err(|source| {
            BackupError::CorruptCache {
                path: path.clone(),
                source,
            }
        })?;

        info!(
            "Loaded manifest cache {} ({} entries)",
            path.display(),
            parsed.files.len()
        );

        Ok(Self {
            path,
            label: label.to_string(),
            entries: parsed.files,
        })
    }

    /// Persist the full mapping.
    ///
    /// Writes a temporary sibling first and renames it over the old file, so
    /// a crash mid-write leaves the previous version intact.
    pub fn save(&self) -> Result<()> {
        let manifest = ManifestFile {
            version: MANIFEST_VERSION,
            label: self.label.clone(),
            saved_at: Utc::now(),
            files: self.entries.clone(),
        };

        let serialized = serde_json::to_string_pretty(&manifest)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;

        info!(
            "Saved manifest cache {} ({} entries)",
            self.path.display(),
            self.entries.len()
        );

        Ok(())
    }

    /// Record a successful upload. Last write wins.
    pub fn record_success(&mut self, path: &CandidatePath, identity: FileIdentity) {
        debug!("Recording {} in manifest cache", path);
        self.entries.insert(path.as_str().to_string(), identity);
    }

    pub fn get(&self, path: &str) -> Option<&FileIdentity> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy of the entries for change detection. While a run is in
    /// flight the live cache is mutated only by the pipeline aggregator; the
    /// producer reads this snapshot instead.
    pub fn snapshot(&self) -> BTreeMap<String, FileIdentity> {
        self.entries.clone()
    }
}
