//! End-to-end tests: raw frames on disk through classification, dispatch,
//! cleanup and the night summary.

use async_trait::async_trait;
use opera_core::{
    DispatchError, ExposureHeader, InstrumentMode, Inventory, ModeKey, ModeRecord, ProductKind,
    ReadoutSpeed, RunFlags, RunParameters, RunReporter, SharedResources,
};
use opera_pipeline::{
    CleanupState, CommandExecutor, DispatchStatus, ExecutionStatus, NightPipeline, NightSummary,
    ReductionExecutor, MARKER_FILE,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

const POLAR: &str = "Polarimetry, R=65,000";
const STAR_SKY: &str = "Spectroscopy, star+sky, R=65,000";
const STAR_ONLY: &str = "Spectroscopy, star only, R=81,000";
const FAST: &str = "Fast: 4.70e noise, 1.60e/ADU, 32s";
const NORMAL: &str = "Normal: 3.80e noise, 1.30e/ADU, 38s";
const SLOW: &str = "Slow: 2.90e noise, 0.80e/ADU, 60s";

struct NightFixture {
    _root: TempDir,
    resources: SharedResources,
}

impl NightFixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("opera").join("config")).unwrap();
        std::fs::create_dir_all(root.path().join("data").join("N1")).unwrap();
        let resources = SharedResources::load(
            root.path().join("opera"),
            root.path().join("data"),
            root.path().join("products"),
            "N1",
        )
        .unwrap();
        Self {
            _root: root,
            resources,
        }
    }

    fn data_dir(&self) -> &Path {
        &self.resources.dirs.data_dir
    }

    /// Write `count` raw frames named `<prefix>NNo.fits`.
    fn frames(&self, prefix: &str, count: usize, obstype: &str, instmode: &str, readout: &str) {
        for i in 0..count {
            let name = format!("{}{:02}o.fits", prefix, i);
            let header = ExposureHeader::from_cards(
                name.as_str(),
                [
                    ("OBSTYPE", obstype),
                    ("INSTMODE", instmode),
                    ("EREADSPD", readout),
                ],
            );
            std::fs::write(self.data_dir().join(name), header.to_fits_bytes()).unwrap();
        }
    }

    fn mode_dir(&self, key: ModeKey) -> std::path::PathBuf {
        self.resources.dirs.mode_product_dir(&key)
    }
}

/// Records every invocation; fails the modes it was told to fail.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<RunParameters>>,
    failing: BTreeSet<ModeKey>,
}

impl RecordingExecutor {
    fn failing(modes: &[ModeKey]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: modes.iter().copied().collect(),
        }
    }

    fn modes(&self) -> Vec<ModeKey> {
        self.calls.lock().unwrap().iter().map(|p| p.mode).collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReductionExecutor for RecordingExecutor {
    async fn execute(
        &self,
        params: &RunParameters,
        _resources: &SharedResources,
    ) -> Result<ExecutionStatus, DispatchError> {
        self.calls.lock().unwrap().push(params.clone());
        std::fs::write(params.scratch_dir.join("order.geom"), "intermediate").unwrap();
        std::fs::write(params.product_dir.join("product.s"), "spectrum").unwrap();

        let failed = self.failing.contains(&params.mode);
        Ok(ExecutionStatus {
            exit_code: i32::from(failed),
            stdout: String::new(),
            stderr: if failed {
                "reduction error".to_string()
            } else {
                String::new()
            },
            duration_ms: 1,
        })
    }
}

/// Records the order of reporter calls.
#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RunReporter for RecordingReporter {
    fn report_overall(&self, inventory: &Inventory) {
        self.events
            .lock()
            .unwrap()
            .push(format!("overall:{}", inventory.eligible_count()));
    }

    fn report_mode(&self, key: &ModeKey, record: &ModeRecord) {
        self.events
            .lock()
            .unwrap()
            .push(format!("mode:{}:{}", key.slug(), record.total()));
    }
}

fn polar_fast() -> ModeKey {
    ModeKey::new(InstrumentMode::Polar, ReadoutSpeed::Fast)
}

fn star_only_slow() -> ModeKey {
    ModeKey::new(InstrumentMode::StarOnly, ReadoutSpeed::Slow)
}

fn star_sky_normal() -> ModeKey {
    ModeKey::new(InstrumentMode::StarPlusSky, ReadoutSpeed::Normal)
}

/// Three eligible modes, written in an order unrelated to mode order.
fn three_modes(night: &NightFixture) {
    night.frames("a", 2, "OBJECT", STAR_ONLY, SLOW);
    night.frames("b", 1, "OBJECT", STAR_SKY, NORMAL);
    night.frames("c", 3, "OBJECT", POLAR, FAST);
}

/// Runs an OBJECTS night with a throwaway reporter.
async fn run_night(
    night: &NightFixture,
    executor: &dyn ReductionExecutor,
    flags: RunFlags,
) -> NightSummary {
    NightPipeline::run(
        &night.resources,
        executor,
        &RecordingReporter::default(),
        flags,
        ProductKind::Objects,
    )
    .await
    .unwrap()
}

fn cleanup_modes(summary: &NightSummary) -> Vec<&str> {
    summary
        .cleanup
        .outcomes
        .iter()
        .map(|e| e.mode.as_str())
        .collect()
}

#[tokio::test]
async fn test_single_eligible_mode_dispatched_once() {
    let night = NightFixture::new();
    night.frames("bias", 10, "BIAS", POLAR, FAST);
    night.frames("obj", 5, "OBJECT", POLAR, FAST);
    night.frames("flat", 8, "FLAT", STAR_ONLY, SLOW);

    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let summary = NightPipeline::run(
        &night.resources,
        &executor,
        &reporter,
        RunFlags::default(),
        ProductKind::Objects,
    )
    .await
    .unwrap();

    assert_eq!(executor.modes(), vec![polar_fast()]);
    assert_eq!(summary.total_exposures, 23);
    assert_eq!(summary.mode_groups, 2);
    assert_eq!(summary.eligible_modes, 1);
    assert_eq!(summary.modes.len(), 1);
    assert_eq!(summary.modes[0].mode, "polar_fast");
    assert_eq!(summary.modes[0].exposures, 15);
    assert!(summary.verdict().passed);

    let events = reporter.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["overall:1".to_string(), "mode:polar_fast:15".to_string()]
    );
}

#[tokio::test]
async fn test_parameters_built_per_mode() {
    let night = NightFixture::new();
    three_modes(&night);

    let executor = RecordingExecutor::default();
    let flags = RunFlags {
        plot: true,
        ..RunFlags::default()
    };
    run_night(&night, &executor, flags).await;

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    for params in calls.iter() {
        assert_eq!(params.night, "N1");
        assert!(params.flags.plot);
        assert_eq!(params.target, ProductKind::Objects);
        assert_eq!(params.product_dir, night.mode_dir(params.mode));
        assert_eq!(params.scratch_dir, night.mode_dir(params.mode).join("tmp"));
    }
}

#[tokio::test]
async fn test_failure_does_not_stop_remaining_modes() {
    let night = NightFixture::new();
    three_modes(&night);

    let executor = RecordingExecutor::failing(&[star_sky_normal()]);
    let summary = run_night(&night, &executor, RunFlags::default()).await;

    assert_eq!(
        executor.modes(),
        vec![polar_fast(), star_sky_normal(), star_only_slow()]
    );
    let statuses: Vec<DispatchStatus> = summary.modes.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![
            DispatchStatus::Succeeded,
            DispatchStatus::Failed,
            DispatchStatus::Succeeded
        ]
    );
    assert_eq!(summary.modes[1].exit_code, Some(1));

    let verdict = summary.verdict();
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 1);
    assert!(verdict.violations[0].contains("starplussky_normal"));

    // Only successful modes are marked complete.
    let marker = |key: ModeKey| night.mode_dir(key).join(MARKER_FILE);
    assert!(marker(polar_fast()).exists());
    assert!(!marker(star_sky_normal()).exists());
}

#[tokio::test]
async fn test_dispatch_order_is_deterministic() {
    let night = NightFixture::new();
    three_modes(&night);
    let flags = RunFlags {
        clean: true,
        ..RunFlags::default()
    };

    let first = RecordingExecutor::default();
    let s1 = run_night(&night, &first, flags).await;
    let second = RecordingExecutor::default();
    let s2 = run_night(&night, &second, flags).await;

    assert_eq!(first.modes(), second.modes());
    assert_eq!(
        first.modes(),
        vec![polar_fast(), star_sky_normal(), star_only_slow()]
    );
    assert_eq!(s1.plan_digest, s2.plan_digest);
    assert_ne!(s1.run_id, s2.run_id);
}

#[tokio::test]
async fn test_rerun_skips_completed_modes() {
    let night = NightFixture::new();
    three_modes(&night);

    let executor = RecordingExecutor::failing(&[star_only_slow()]);
    let reporter = RecordingReporter::default();
    NightPipeline::run(
        &night.resources,
        &executor,
        &reporter,
        RunFlags::default(),
        ProductKind::Objects,
    )
    .await
    .unwrap();
    assert_eq!(executor.call_count(), 3);

    let rerun = RecordingExecutor::default();
    let summary = NightPipeline::run(
        &night.resources,
        &rerun,
        &reporter,
        RunFlags::default(),
        ProductKind::Objects,
    )
    .await
    .unwrap();

    // The previously failed mode is the only one executed again.
    assert_eq!(rerun.modes(), vec![star_only_slow()]);
    let statuses: Vec<DispatchStatus> = summary.modes.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![
            DispatchStatus::Skipped,
            DispatchStatus::Skipped,
            DispatchStatus::Succeeded
        ]
    );
    assert!(summary.verdict().passed);

    // `clean` forces every mode to run again.
    let forced = RecordingExecutor::default();
    let flags = RunFlags {
        clean: true,
        ..RunFlags::default()
    };
    NightPipeline::run(
        &night.resources,
        &forced,
        &reporter,
        flags,
        ProductKind::Objects,
    )
    .await
    .unwrap();
    assert_eq!(forced.call_count(), 3);
}

#[tokio::test]
async fn test_changed_parameters_invalidate_marker() {
    let night = NightFixture::new();
    night.frames("obj", 2, "OBJECT", POLAR, FAST);

    let executor = RecordingExecutor::default();
    run_night(&night, &executor, RunFlags::default()).await;

    let flags = RunFlags {
        plot: true,
        ..RunFlags::default()
    };
    run_night(&night, &executor, flags).await;
    assert_eq!(executor.call_count(), 2);
}

#[tokio::test]
async fn test_simulate_does_not_mark_complete() {
    let night = NightFixture::new();
    night.frames("obj", 2, "OBJECT", POLAR, FAST);
    let flags = RunFlags {
        simulate: true,
        ..RunFlags::default()
    };

    let executor = RecordingExecutor::default();
    run_night(&night, &executor, flags).await;
    run_night(&night, &executor, flags).await;

    assert_eq!(executor.call_count(), 2);
    assert!(!night.mode_dir(polar_fast()).join(MARKER_FILE).exists());
    assert!(executor.calls.lock().unwrap()[0].flags.simulate);
}

#[tokio::test]
async fn test_scratch_removed_after_dispatch() {
    let night = NightFixture::new();
    night.frames("obj", 1, "OBJECT", POLAR, FAST);

    let executor = RecordingExecutor::default();
    let summary = run_night(&night, &executor, RunFlags::default()).await;

    let mode_dir = night.mode_dir(polar_fast());
    assert!(!mode_dir.join("tmp").exists());
    assert!(mode_dir.join("product.s").exists());
    assert_eq!(summary.cleanup.scope, "dispatched");
    assert_eq!(summary.cleanup.removed, 1);
}

#[tokio::test]
async fn test_clean_all_removes_every_known_mode_without_reducing() {
    let night = NightFixture::new();
    three_modes(&night);
    night.frames("flat", 2, "FLAT", POLAR, SLOW);

    // Products from an earlier run of all four modes, plus a mode no longer
    // present in tonight's raw data.
    let stale = ModeKey::any_readout(InstrumentMode::StarOnly);
    let mut previous = vec![
        polar_fast(),
        ModeKey::new(InstrumentMode::Polar, ReadoutSpeed::Slow),
        star_sky_normal(),
        star_only_slow(),
        stale,
    ];
    for key in &previous {
        std::fs::create_dir_all(night.mode_dir(*key).join("tmp")).unwrap();
        std::fs::write(night.mode_dir(*key).join(MARKER_FILE), "x").unwrap();
    }

    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let flags = RunFlags {
        clean_all: true,
        ..RunFlags::default()
    };
    let summary = NightPipeline::run(
        &night.resources,
        &executor,
        &reporter,
        flags,
        ProductKind::Objects,
    )
    .await
    .unwrap();

    assert_eq!(executor.call_count(), 0);
    assert!(summary.modes.is_empty());
    assert_eq!(summary.cleanup.scope, "all");
    assert_eq!(summary.cleanup.removed, 5);
    previous.sort();

    // One cleanup entry per planned mode, in mode order.
    let entries = &summary.cleanup.outcomes;
    assert_eq!(entries.len(), previous.len());
    for (entry, key) in entries.iter().zip(&previous) {
        assert_eq!(entry.mode, key.slug());
        assert_eq!(entry.path, night.mode_dir(*key));
        assert_eq!(entry.status, CleanupState::Removed);
        assert!(entry.error.is_none());
        assert!(!night.mode_dir(*key).exists(), "{} still present", key);
    }
    assert!(summary.verdict().passed);
    assert!(summary.render_text().contains("staronly_any"));

    // The overall report still runs; no per-mode reports in clean-only runs.
    assert_eq!(
        reporter.events.lock().unwrap().clone(),
        vec!["overall:3".to_string()]
    );
}

#[tokio::test]
async fn test_clean_all_with_nothing_on_disk() {
    let night = NightFixture::new();
    three_modes(&night);

    let executor = RecordingExecutor::default();
    let flags = RunFlags {
        clean_all: true,
        ..RunFlags::default()
    };
    let summary = run_night(&night, &executor, flags).await;

    assert_eq!(executor.call_count(), 0);
    assert_eq!(summary.cleanup.removed, 0);
    assert!(summary.cleanup.errors.is_empty());

    assert_eq!(
        cleanup_modes(&summary),
        vec!["polar_fast", "starplussky_normal", "staronly_slow"]
    );
    for entry in &summary.cleanup.outcomes {
        assert_eq!(entry.status, CleanupState::NothingToRemove);
    }
    assert!(summary.verdict().passed);
}

#[tokio::test]
async fn test_cleanup_failure_fails_the_night() {
    let night = NightFixture::new();
    three_modes(&night);

    // A plain file where the night's product directory belongs: no mode
    // directory beneath it can be inspected or removed.
    let product_dir = night.resources.dirs.product_dir.clone();
    std::fs::create_dir_all(product_dir.parent().unwrap()).unwrap();
    std::fs::write(&product_dir, "not a directory").unwrap();

    let executor = RecordingExecutor::default();
    let flags = RunFlags {
        clean_all: true,
        ..RunFlags::default()
    };
    let summary = run_night(&night, &executor, flags).await;

    assert_eq!(executor.call_count(), 0);
    assert_eq!(summary.cleanup.removed, 0);
    assert_eq!(summary.cleanup.errors.len(), 3);
    assert_eq!(summary.cleanup.outcomes.len(), 3);
    for entry in &summary.cleanup.outcomes {
        assert_eq!(entry.status, CleanupState::Failed);
        assert!(entry.error.as_deref().unwrap().contains(&entry.mode));
    }

    let verdict = summary.verdict();
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 3);
    assert!(verdict.violations[0].contains("polar_fast"));
    assert!(product_dir.is_file());
}

#[tokio::test]
async fn test_unpreparable_mode_does_not_stop_remaining_modes() {
    let night = NightFixture::new();
    three_modes(&night);

    // The mode directory is a plain file, so its scratch directory cannot be
    // created.
    std::fs::create_dir_all(&night.resources.dirs.product_dir).unwrap();
    std::fs::write(night.mode_dir(star_sky_normal()), "not a directory").unwrap();

    let executor = RecordingExecutor::default();
    let summary = run_night(&night, &executor, RunFlags::default()).await;

    assert_eq!(executor.modes(), vec![polar_fast(), star_only_slow()]);
    let statuses: Vec<DispatchStatus> = summary.modes.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![
            DispatchStatus::Succeeded,
            DispatchStatus::Failed,
            DispatchStatus::Succeeded
        ]
    );
    assert_eq!(summary.modes[1].exit_code, None);
    let error = summary.modes[1].error.as_deref().unwrap();
    assert!(error.contains("could not prepare product directory"));
    assert!(error.contains("starplussky_normal"));

    let verdict = summary.verdict();
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 1);

    // Only modes whose reduction was invoked get their scratch removed.
    assert_eq!(cleanup_modes(&summary), vec!["polar_fast", "staronly_slow"]);
    assert_eq!(summary.cleanup.removed, 2);
    assert!(night.mode_dir(star_sky_normal()).is_file());
}

#[tokio::test]
async fn test_any_readout_merges_groups() {
    let night = NightFixture::new();
    night.frames("fast", 2, "OBJECT", POLAR, FAST);
    night.frames("slow", 3, "BIAS", POLAR, SLOW);

    let executor = RecordingExecutor::default();
    let flags = RunFlags {
        allow_any_readout: true,
        ..RunFlags::default()
    };
    let summary = run_night(&night, &executor, flags).await;

    let merged = ModeKey::any_readout(InstrumentMode::Polar);
    assert_eq!(executor.modes(), vec![merged]);
    assert_eq!(summary.modes[0].mode, "polar_any");
    assert_eq!(summary.modes[0].exposures, 5);

    let args = executor.calls.lock().unwrap()[0].to_args();
    assert_eq!(args[2], "Any");
    assert_eq!(args[8], "true");
}

#[tokio::test]
async fn test_forced_calibration_dispatches_calibration_only_modes() {
    let night = NightFixture::new();
    night.frames("bias", 4, "BIAS", STAR_ONLY, NORMAL);
    night.frames("comp", 2, "COMPARISON", STAR_ONLY, NORMAL);

    let unforced = RecordingExecutor::default();
    let summary = run_night(&night, &unforced, RunFlags::default()).await;
    assert_eq!(unforced.call_count(), 0);
    assert_eq!(summary.eligible_modes, 0);

    let forced = RecordingExecutor::default();
    let flags = RunFlags {
        force_calibration: true,
        ..RunFlags::default()
    };
    let summary = NightPipeline::run(
        &night.resources,
        &forced,
        &RecordingReporter::default(),
        flags,
        ProductKind::Calibrations,
    )
    .await
    .unwrap();
    assert_eq!(
        forced.modes(),
        vec![ModeKey::new(InstrumentMode::StarOnly, ReadoutSpeed::Normal)]
    );
    assert!(summary.modes[0].forced);
    assert_eq!(summary.target, "CALIBRATIONS");
    assert_eq!(
        forced.calls.lock().unwrap()[0].target,
        ProductKind::Calibrations
    );
}

#[tokio::test]
async fn test_rejected_exposures_do_not_fail_the_night() {
    let night = NightFixture::new();
    night.frames("obj", 2, "OBJECT", POLAR, FAST);
    night.frames("odd", 1, "SKYFLAT", POLAR, FAST);
    std::fs::write(night.data_dir().join("cut0001o.fits"), b"SIMPLE  =").unwrap();
    std::fs::write(night.data_dir().join("notes.txt"), "observing log").unwrap();

    let executor = RecordingExecutor::default();
    let summary = run_night(&night, &executor, RunFlags::default()).await;

    assert_eq!(summary.total_exposures, 2);
    assert_eq!(summary.classification_errors.len(), 2);
    assert_eq!(executor.call_count(), 1);
    assert!(summary.verdict().passed);
}

#[tokio::test]
async fn test_empty_night_is_not_an_error() {
    let night = NightFixture::new();

    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let summary = NightPipeline::run(
        &night.resources,
        &executor,
        &reporter,
        RunFlags::default(),
        ProductKind::Objects,
    )
    .await
    .unwrap();

    assert_eq!(summary.total_exposures, 0);
    assert_eq!(summary.mode_groups, 0);
    assert!(summary.modes.is_empty());
    assert!(summary.verdict().passed);
    assert_eq!(
        reporter.events.lock().unwrap().clone(),
        vec!["overall:0".to_string()]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_executor_runs_in_mode_directory() {
    let night = NightFixture::new();
    night.frames("obj", 1, "OBJECT", POLAR, FAST);
    night.frames("sky", 1, "OBJECT", STAR_SKY, FAST);

    let executor = CommandExecutor::new(
        "sh",
        vec![
            "-c".to_string(),
            "echo \"$1 $2 $3 ${10}\" > bundle.txt; test \"$2\" = Polar".to_string(),
            "reduce".to_string(),
        ],
        60,
    );
    let summary = run_night(&night, &executor, RunFlags::default()).await;

    let bundle = std::fs::read_to_string(night.mode_dir(polar_fast()).join("bundle.txt")).unwrap();
    assert_eq!(bundle.trim(), "N1 Polar Fast OBJECTS");

    let sky = ModeKey::new(InstrumentMode::StarPlusSky, ReadoutSpeed::Fast);
    assert!(night.mode_dir(sky).join("bundle.txt").exists());
    assert_eq!(summary.failed_modes(), 1);
    assert_eq!(summary.modes[1].status, DispatchStatus::Failed);
}
