//! One night, end to end: scan, classify, inventory, dispatch, summarize.

use crate::dispatcher::ReductionDispatcher;
use crate::executor::ReductionExecutor;
use crate::summary::NightSummary;
use chrono::Utc;
use opera_core::obs;
use opera_core::{
    build_inventory, classify_all, scan_night, ConfigurationError, ProductKind, RunFlags, RunMode,
    RunReporter, SharedResources,
};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Night pipeline orchestrator.
pub struct NightPipeline;

impl NightPipeline {
    /// Run a night against already loaded shared resources.
    ///
    /// Only an unreadable data directory aborts the run. Rejected exposures
    /// and failed modes are recorded in the returned summary.
    pub async fn run(
        resources: &SharedResources,
        executor: &dyn ReductionExecutor,
        reporter: &dyn RunReporter,
        flags: RunFlags,
        target: ProductKind,
    ) -> Result<NightSummary, ConfigurationError> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id, &resources.dirs.night);
        Self::run_inner(run_id, resources, executor, reporter, flags, target)
            .instrument(span)
            .await
    }

    async fn run_inner(
        run_id: String,
        resources: &SharedResources,
        executor: &dyn ReductionExecutor,
        reporter: &dyn RunReporter,
        flags: RunFlags,
        target: ProductKind,
    ) -> Result<NightSummary, ConfigurationError> {
        let night = resources.dirs.night.clone();
        let started_at = Utc::now();
        let start = Instant::now();

        let run_mode = match flags.run_mode() {
            RunMode::Reduce => "reduce",
            RunMode::CleanOnly => "clean_only",
        };
        obs::emit_night_started(&run_id, &night, run_mode);

        let scan = scan_night(&resources.dirs.data_dir, &resources.settings().raw_suffix)?;
        let classified = classify_all(&scan.headers, &resources.keywords, &night);

        let mut rejected = scan.errors;
        for error in &rejected {
            obs::emit_exposure_rejected(error.path(), error);
        }
        rejected.extend(classified.errors);

        let inventory = build_inventory(
            &classified.exposures,
            flags.allow_any_readout,
            flags.force_calibration,
            target,
        );
        if inventory.is_empty() {
            warn!(
                night = %night,
                data_dir = %resources.dirs.data_dir.display(),
                "No classified exposures for night"
            );
        }

        let dispatcher = ReductionDispatcher::new(executor, resources, reporter);
        let report = dispatcher.dispatch(&inventory, &flags, target).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_night_finished(
            &run_id,
            duration_ms,
            report.results.len() - report.skipped_count(),
            report.failed_count(),
        );
        info!(plan_digest = %report.plan.digest, "Night finished");

        Ok(NightSummary::new(
            run_id,
            night,
            &inventory,
            &report,
            &rejected,
            started_at,
            Utc::now(),
            duration_ms,
        ))
    }
}
