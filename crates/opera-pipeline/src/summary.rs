//! End-of-night summary and pass/fail verdict.

use crate::dispatcher::{DispatchReport, DispatchStatus};
use anyhow::Context;
use chrono::{DateTime, Utc};
use opera_core::{
    ClassificationError, CleanupOutcome, CleanupReport, CleanupStatus, Inventory, RunMode,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-mode line of the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeSummary {
    /// Mode slug, e.g. `polar_fast`.
    pub mode: String,
    pub exposures: usize,
    pub forced: bool,
    pub status: DispatchStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupState {
    Removed,
    NothingToRemove,
    Failed,
}

/// Cleanup line for one planned mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupEntry {
    pub mode: String,
    pub path: PathBuf,
    pub status: CleanupState,
    pub error: Option<String>,
}

impl From<&CleanupOutcome> for CleanupEntry {
    fn from(outcome: &CleanupOutcome) -> Self {
        let (status, error) = match &outcome.status {
            CleanupStatus::Removed => (CleanupState::Removed, None),
            CleanupStatus::NothingToRemove => (CleanupState::NothingToRemove, None),
            CleanupStatus::Failed(e) => (CleanupState::Failed, Some(e.to_string())),
        };
        Self {
            mode: outcome.mode.slug(),
            path: outcome.path.clone(),
            status,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupSummary {
    pub scope: String,
    pub removed: usize,
    pub errors: Vec<String>,
    /// One entry per mode the cleanup pass planned, in mode order.
    pub outcomes: Vec<CleanupEntry>,
}

impl From<&CleanupReport> for CleanupSummary {
    fn from(report: &CleanupReport) -> Self {
        Self {
            scope: report.scope.to_string(),
            removed: report.removed_count(),
            errors: report.errors().map(|e| e.to_string()).collect(),
            outcomes: report.outcomes.iter().map(CleanupEntry::from).collect(),
        }
    }
}

/// Serializable record of a night run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NightSummary {
    pub run_id: String,
    pub night: String,
    pub run_mode: RunMode,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Classified exposures.
    pub total_exposures: usize,
    pub mode_groups: usize,
    pub eligible_modes: usize,
    pub plan_digest: String,

    pub modes: Vec<ModeSummary>,
    pub classification_errors: Vec<String>,
    pub cleanup: CleanupSummary,
}

/// Verdict over a night run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    pub message: String,
}

impl NightSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        night: String,
        inventory: &Inventory,
        report: &DispatchReport,
        classification_errors: &[ClassificationError],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let modes = report
            .results
            .iter()
            .map(|r| {
                let record = inventory.get(&r.mode);
                ModeSummary {
                    mode: r.mode.slug(),
                    exposures: record.map(|rec| rec.total()).unwrap_or(0),
                    forced: record.map(|rec| rec.forced).unwrap_or(false),
                    status: r.status,
                    exit_code: r.exit_code,
                    duration_ms: r.duration_ms,
                    error: r.error.as_ref().map(|e| e.to_string()),
                }
            })
            .collect();

        Self {
            run_id,
            night,
            run_mode: report.run_mode,
            target: inventory.target.to_string(),
            started_at,
            finished_at,
            duration_ms,
            total_exposures: inventory.total_exposures,
            mode_groups: inventory.len(),
            eligible_modes: inventory.eligible_count(),
            plan_digest: report.plan.digest.clone(),
            modes,
            classification_errors: classification_errors
                .iter()
                .map(|e| e.to_string())
                .collect(),
            cleanup: CleanupSummary::from(&report.cleanup),
        }
    }

    pub fn failed_modes(&self) -> usize {
        self.modes
            .iter()
            .filter(|m| m.status == DispatchStatus::Failed)
            .count()
    }

    /// The run passes when no mode failed and every cleanup succeeded.
    ///
    /// Rejected exposures and an empty inventory do not fail the run.
    pub fn verdict(&self) -> Verdict {
        let mut violations: Vec<String> = self
            .modes
            .iter()
            .filter_map(|m| m.error.clone())
            .collect();
        violations.extend(self.cleanup.errors.iter().cloned());

        let passed = violations.is_empty();
        let message = if passed {
            format!(
                "Night {} completed: {} mode(s) processed",
                self.night,
                self.modes.len()
            )
        } else {
            format!(
                "Night {} failed: {} violation(s)",
                self.night,
                violations.len()
            )
        };

        Verdict {
            passed,
            violations,
            message,
        }
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Night {} ({}) run {}\n",
            self.night,
            match self.run_mode {
                RunMode::Reduce => "reduce",
                RunMode::CleanOnly => "clean only",
            },
            self.run_id
        );
        out.push_str(&format!(
            "  exposures: {}  groups: {}  eligible: {}  target: {}\n",
            self.total_exposures, self.mode_groups, self.eligible_modes, self.target
        ));
        for mode in &self.modes {
            let mark = match mode.status {
                DispatchStatus::Succeeded => "✓",
                DispatchStatus::Failed => "✗",
                DispatchStatus::Skipped => "-",
            };
            out.push_str(&format!(
                "  {} {:<18} {}ms",
                mark, mode.mode, mode.duration_ms
            ));
            if let Some(error) = &mode.error {
                out.push_str(&format!("  {}", error));
            }
            out.push('\n');
        }
        if !self.classification_errors.is_empty() {
            out.push_str(&format!(
                "  rejected exposures: {}\n",
                self.classification_errors.len()
            ));
        }
        out.push_str(&format!(
            "  cleanup ({}): {} removed, {} failed\n",
            self.cleanup.scope,
            self.cleanup.removed,
            self.cleanup.errors.len()
        ));
        for entry in &self.cleanup.outcomes {
            let state = match entry.status {
                CleanupState::Removed => "removed",
                CleanupState::NothingToRemove => "nothing to remove",
                CleanupState::Failed => "failed",
            };
            out.push_str(&format!(
                "    {:<18} {:<17} {}\n",
                entry.mode,
                state,
                entry.path.display()
            ));
        }
        out
    }
}

/// Write the summary as pretty JSON.
pub fn write_summary_json(path: &Path, summary: &NightSummary) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary).context("serialize night summary")?;
    std::fs::write(path, json)
        .with_context(|| format!("write night summary to {}", path.display()))?;
    Ok(())
}
