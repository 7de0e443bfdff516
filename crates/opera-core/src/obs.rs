//! Structured observability hooks for the night run lifecycle.
//!
//! Every helper emits one event tagged with an `event = "..."` field so log
//! consumers can filter on it. `run_span` ties all of them to a run id.

use tracing::{info, warn};

/// Run-scoped span tagged with the run id and night.
///
/// ```ignore
/// async { /* ... */ }.instrument(run_span("3f2c...", "14BQ02-Aug13")).await
/// ```
pub fn run_span(run_id: &str, night: &str) -> tracing::Span {
    tracing::info_span!("opera.night", run_id = %run_id, night = %night)
}

pub fn emit_night_started(run_id: &str, night: &str, run_mode: &str) {
    info!(event = "night.started", run_id = %run_id, night = %night, run_mode = %run_mode);
}

pub fn emit_night_finished(run_id: &str, duration_ms: u64, dispatched: usize, failed: usize) {
    info!(
        event = "night.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        dispatched = dispatched,
        failed = failed,
    );
}

/// An exposure was excluded from every mode record.
pub fn emit_exposure_rejected(path: &str, error: &dyn std::fmt::Display) {
    warn!(event = "exposure.rejected", path = %path, error = %error);
}

pub fn emit_inventory_built(total_exposures: usize, groups: usize, eligible: usize) {
    info!(
        event = "inventory.built",
        total_exposures = total_exposures,
        groups = groups,
        eligible = eligible,
    );
}

pub fn emit_mode_dispatched(mode: &str, plan_index: usize, plan_len: usize) {
    info!(event = "mode.dispatched", mode = %mode, index = plan_index + 1, of = plan_len);
}

pub fn emit_mode_finished(mode: &str, success: bool, duration_ms: u64) {
    if success {
        info!(event = "mode.finished", mode = %mode, success = true, duration_ms = duration_ms);
    } else {
        warn!(event = "mode.finished", mode = %mode, success = false, duration_ms = duration_ms);
    }
}

pub fn emit_mode_skipped(mode: &str, reason: &str) {
    info!(event = "mode.skipped", mode = %mode, reason = %reason);
}

pub fn emit_cleanup_finished(scope: &str, removed: usize, failed: usize) {
    info!(event = "cleanup.finished", scope = %scope, removed = removed, failed = failed);
}
