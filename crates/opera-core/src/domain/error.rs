//! Error taxonomy for night orchestration.
//!
//! Per-exposure and per-mode errors are isolated and aggregated by the caller;
//! only [`ConfigurationError`] is fatal to a whole run.

use std::path::PathBuf;

/// A raw exposure header that could not be turned into an [`Exposure`].
///
/// [`Exposure`]: crate::domain::exposure::Exposure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    #[error("{path}: unreadable header: {reason}")]
    UnreadableHeader { path: String, reason: String },

    #[error("{path}: missing required header keyword {keyword}")]
    MissingKeyword { path: String, keyword: String },

    #[error("{path}: unrecognized instrument mode '{value}'")]
    UnknownInstrumentMode { path: String, value: String },

    #[error("{path}: unrecognized readout speed '{value}'")]
    UnknownReadoutSpeed { path: String, value: String },

    #[error("{path}: unrecognized exposure type '{value}'")]
    UnknownExposureType { path: String, value: String },
}

impl ClassificationError {
    /// Identifier of the offending exposure.
    pub fn path(&self) -> &str {
        match self {
            ClassificationError::UnreadableHeader { path, .. }
            | ClassificationError::MissingKeyword { path, .. }
            | ClassificationError::UnknownInstrumentMode { path, .. }
            | ClassificationError::UnknownReadoutSpeed { path, .. }
            | ClassificationError::UnknownExposureType { path, .. } => path,
        }
    }
}

/// A single mode's reduction could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("mode {mode}: reduction exited with code {exit_code}")]
    ExecutorFailed { mode: String, exit_code: i32 },

    #[error("mode {mode}: reduction could not be executed: {reason}")]
    ExecutionError { mode: String, reason: String },

    #[error("mode {mode}: reduction timed out after {timeout_secs} seconds")]
    Timeout { mode: String, timeout_secs: u64 },

    #[error("mode {mode}: could not prepare product directory {path}: {reason}")]
    Preparation {
        mode: String,
        path: PathBuf,
        reason: String,
    },
}

/// Removal of a mode's products failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mode {mode}: failed to remove {path}: {reason}")]
pub struct CleanupError {
    pub mode: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Shared resources for the run are missing or unusable. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{role} directory not found: {path}")]
    MissingDirectory { role: &'static str, path: PathBuf },

    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("invalid pipeline settings in {path}: {reason}")]
    InvalidSettings { path: PathBuf, reason: String },

    #[error("night must not be empty")]
    EmptyNight,
}
