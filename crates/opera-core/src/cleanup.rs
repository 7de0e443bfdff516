//! Removal of per-mode products.
//!
//! A failure on one mode is recorded and cleanup moves on to the next mode.

use crate::domain::error::CleanupError;
use crate::domain::mode::ModeKey;
use crate::obs;
use crate::resources::Directories;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to remove for each mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    /// The whole mode product directory, completion marker included.
    All,
    /// Only the mode's scratch directory.
    Dispatched,
}

impl fmt::Display for CleanupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupScope::All => f.write_str("all"),
            CleanupScope::Dispatched => f.write_str("dispatched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Removed,
    /// The target did not exist. This is not a [`CleanupError`]: a mode with
    /// no products left is already clean.
    NothingToRemove,
    Failed(CleanupError),
}

/// Cleanup result for one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub mode: ModeKey,
    pub path: PathBuf,
    pub status: CleanupStatus,
}

impl CleanupOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self.status, CleanupStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub scope: CleanupScope,
    pub outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    pub fn removed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == CleanupStatus::Removed)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &CleanupError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            CleanupStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.errors().count()
    }
}

/// Removes mode products under the night's product directory.
#[derive(Debug, Clone, Copy)]
pub struct CleanupCoordinator<'a> {
    dirs: &'a Directories,
    scratch_dir_name: &'a str,
}

impl<'a> CleanupCoordinator<'a> {
    pub fn new(dirs: &'a Directories, scratch_dir_name: &'a str) -> Self {
        Self {
            dirs,
            scratch_dir_name,
        }
    }

    /// Path removed for `key` under `scope`.
    pub fn target(&self, key: &ModeKey, scope: CleanupScope) -> PathBuf {
        let mode_dir = self.dirs.mode_product_dir(key);
        match scope {
            CleanupScope::All => mode_dir,
            CleanupScope::Dispatched => mode_dir.join(self.scratch_dir_name),
        }
    }

    /// Modes that already have a product directory for this night.
    ///
    /// Directories whose names are not mode slugs are ignored; a missing
    /// product directory yields no modes.
    pub fn known_modes(&self) -> Vec<ModeKey> {
        let entries = match std::fs::read_dir(&self.dirs.product_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let modes: BTreeSet<ModeKey> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name();
                ModeKey::from_slug(&name.to_string_lossy())
            })
            .collect();
        modes.into_iter().collect()
    }

    /// Remove the products of each mode. Duplicate keys are cleaned once, in
    /// mode order.
    pub fn cleanup(&self, keys: &[ModeKey], scope: CleanupScope) -> CleanupReport {
        let unique: BTreeSet<ModeKey> = keys.iter().copied().collect();
        let outcomes: Vec<CleanupOutcome> = unique
            .into_iter()
            .map(|key| self.cleanup_one(key, scope))
            .collect();

        let report = CleanupReport { scope, outcomes };
        obs::emit_cleanup_finished(
            &scope.to_string(),
            report.removed_count(),
            report.failed_count(),
        );
        report
    }

    fn cleanup_one(&self, key: ModeKey, scope: CleanupScope) -> CleanupOutcome {
        let path = self.target(&key, scope);
        let status = match remove_path(&path) {
            Ok(true) => {
                debug!(mode = %key, path = %path.display(), "Removed mode products");
                CleanupStatus::Removed
            }
            Ok(false) => CleanupStatus::NothingToRemove,
            Err(e) => {
                let error = CleanupError {
                    mode: key.slug(),
                    path: path.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %error, "Cleanup failed");
                CleanupStatus::Failed(error)
            }
        };
        CleanupOutcome {
            mode: key,
            path,
            status,
        }
    }
}

/// Returns `Ok(false)` when there was nothing at `path`.
fn remove_path(path: &Path) -> std::io::Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path).map(|_| true),
        Ok(_) => std::fs::remove_file(path).map(|_| true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
