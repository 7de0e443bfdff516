//! Sequential per-mode dispatch.
//!
//! The run mode is chosen once from the flags. `Reduce` walks the eligible
//! modes in key order, awaiting each reduction before starting the next and
//! recording failures without stopping; `CleanOnly` never touches the
//! executor and hands every known mode to the cleanup coordinator.

use crate::executor::ReductionExecutor;
use crate::plan::{parameters_fingerprint, DispatchPlan};
use opera_core::obs;
use opera_core::{
    CleanupCoordinator, CleanupReport, CleanupScope, DispatchError, Inventory, ModeKey, ModeRecord,
    ProductKind, RunFlags, RunMode, RunParameters, RunReporter, SharedResources,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Completion marker written into a mode product directory after a
/// successful reduction. Holds the parameter fingerprint.
pub const MARKER_FILE: &str = ".opera-complete";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Succeeded,
    Failed,
    /// Products from an identical earlier run were found; nothing was executed.
    Skipped,
}

/// Outcome of one mode's dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub mode: ModeKey,
    pub status: DispatchStatus,

    /// Failure detail (`None` unless `status` is `Failed`).
    pub error: Option<DispatchError>,

    /// Executor exit code, when the executor ran to completion.
    pub exit_code: Option<i32>,

    pub duration_ms: u64,
}

impl DispatchResult {
    /// Whether this mode did not fail.
    pub fn passed(&self) -> bool {
        self.status != DispatchStatus::Failed
    }

    fn skipped(mode: ModeKey) -> Self {
        Self {
            mode,
            status: DispatchStatus::Skipped,
            error: None,
            exit_code: None,
            duration_ms: 0,
        }
    }

    fn failed(
        mode: ModeKey,
        error: DispatchError,
        exit_code: Option<i32>,
        duration_ms: u64,
    ) -> Self {
        Self {
            mode,
            status: DispatchStatus::Failed,
            error: Some(error),
            exit_code,
            duration_ms,
        }
    }
}

/// Everything a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub run_mode: RunMode,
    pub plan: DispatchPlan,

    /// One entry per planned mode, in plan order. Empty for `CleanOnly`.
    pub results: Vec<DispatchResult>,

    pub cleanup: CleanupReport,
}

impl DispatchReport {
    pub fn succeeded_count(&self) -> usize {
        self.count(DispatchStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DispatchStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(DispatchStatus::Skipped)
    }

    /// Every failure of the run, in dispatch order.
    pub fn errors(&self) -> impl Iterator<Item = &DispatchError> {
        self.results.iter().filter_map(|r| r.error.as_ref())
    }

    fn count(&self, status: DispatchStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Dispatches reductions over an inventory.
///
/// All collaborators are borrowed read-only for the whole run; each mode gets
/// its own freshly built [`RunParameters`].
pub struct ReductionDispatcher<'a> {
    executor: &'a dyn ReductionExecutor,
    resources: &'a SharedResources,
    reporter: &'a dyn RunReporter,
}

impl<'a> ReductionDispatcher<'a> {
    pub fn new(
        executor: &'a dyn ReductionExecutor,
        resources: &'a SharedResources,
        reporter: &'a dyn RunReporter,
    ) -> Self {
        Self {
            executor,
            resources,
            reporter,
        }
    }

    fn coordinator(&self) -> CleanupCoordinator<'a> {
        CleanupCoordinator::new(
            &self.resources.dirs,
            &self.resources.settings().scratch_dir_name,
        )
    }

    pub async fn dispatch(
        &self,
        inventory: &Inventory,
        flags: &RunFlags,
        target: ProductKind,
    ) -> DispatchReport {
        self.reporter.report_overall(inventory);

        match flags.run_mode() {
            RunMode::Reduce => self.reduce(inventory, flags, target).await,
            RunMode::CleanOnly => self.clean_only(inventory),
        }
    }

    async fn reduce(
        &self,
        inventory: &Inventory,
        flags: &RunFlags,
        target: ProductKind,
    ) -> DispatchReport {
        let plan = DispatchPlan::from_inventory(inventory);
        info!(modes = plan.len(), plan_digest = %plan.digest, "Dispatching reductions");

        let mut results = Vec::with_capacity(plan.len());
        let mut invoked = Vec::new();

        for (index, (key, record)) in inventory.eligible().enumerate() {
            self.reporter.report_mode(key, record);

            let params = self.parameters(*key, flags, target);
            let fingerprint = parameters_fingerprint(&params);

            if !flags.clean
                && !flags.simulate
                && marker_matches(&params.product_dir, &fingerprint)
            {
                obs::emit_mode_skipped(&key.slug(), "completion marker matches");
                results.push(DispatchResult::skipped(*key));
                continue;
            }

            obs::emit_mode_dispatched(&key.slug(), index, plan.len());
            let result = self.dispatch_one(&params, record).await;

            if !matches!(result.error, Some(DispatchError::Preparation { .. })) {
                invoked.push(*key);
            }
            if result.status == DispatchStatus::Succeeded && !flags.simulate {
                write_marker(&params.product_dir, &fingerprint);
            }

            obs::emit_mode_finished(&key.slug(), result.passed(), result.duration_ms);
            results.push(result);
        }

        let cleanup = self
            .coordinator()
            .cleanup(&invoked, CleanupScope::Dispatched);

        DispatchReport {
            run_mode: RunMode::Reduce,
            plan,
            results,
            cleanup,
        }
    }

    fn clean_only(&self, inventory: &Inventory) -> DispatchReport {
        let coordinator = self.coordinator();
        let plan = DispatchPlan::for_cleanup(inventory, &coordinator.known_modes());
        info!(modes = plan.len(), "Cleaning products without reduction");

        let cleanup = coordinator.cleanup(&plan.keys, CleanupScope::All);

        DispatchReport {
            run_mode: RunMode::CleanOnly,
            plan,
            results: Vec::new(),
            cleanup,
        }
    }

    fn parameters(&self, mode: ModeKey, flags: &RunFlags, target: ProductKind) -> RunParameters {
        let product_dir = self.resources.dirs.mode_product_dir(&mode);
        let scratch_dir = product_dir.join(&self.resources.settings().scratch_dir_name);
        RunParameters {
            night: self.resources.dirs.night.clone(),
            mode,
            flags: *flags,
            target,
            product_dir,
            scratch_dir,
        }
    }

    async fn dispatch_one(&self, params: &RunParameters, record: &ModeRecord) -> DispatchResult {
        let start = Instant::now();
        let mode = params.mode;

        debug!(
            mode = %mode,
            exposures = record.total(),
            forced = record.forced,
            product_dir = %params.product_dir.display(),
            "Preparing mode"
        );

        if let Err(e) = std::fs::create_dir_all(&params.scratch_dir) {
            let error = DispatchError::Preparation {
                mode: mode.slug(),
                path: params.scratch_dir.clone(),
                reason: e.to_string(),
            };
            warn!(error = %error, "Mode preparation failed");
            return DispatchResult::failed(mode, error, None, start.elapsed().as_millis() as u64);
        }

        let duration = || start.elapsed().as_millis() as u64;
        match self.executor.execute(params, self.resources).await {
            Ok(status) if status.success() => DispatchResult {
                mode,
                status: DispatchStatus::Succeeded,
                error: None,
                exit_code: Some(status.exit_code),
                duration_ms: duration(),
            },
            Ok(status) => {
                let error = DispatchError::ExecutorFailed {
                    mode: mode.slug(),
                    exit_code: status.exit_code,
                };
                warn!(error = %error, stderr = %status.stderr.trim(), "Reduction failed");
                DispatchResult::failed(mode, error, Some(status.exit_code), duration())
            }
            Err(error) => {
                warn!(error = %error, "Reduction failed");
                DispatchResult::failed(mode, error, None, duration())
            }
        }
    }
}

fn marker_matches(product_dir: &Path, fingerprint: &str) -> bool {
    std::fs::read_to_string(product_dir.join(MARKER_FILE))
        .map(|content| content.trim() == fingerprint)
        .unwrap_or(false)
}

fn write_marker(product_dir: &Path, fingerprint: &str) {
    let path = product_dir.join(MARKER_FILE);
    if let Err(e) = std::fs::write(&path, format!("{}\n", fingerprint)) {
        // The mode still succeeded; it will simply be re-run next time.
        warn!(path = %path.display(), error = %e, "Failed to write completion marker");
    }
}
