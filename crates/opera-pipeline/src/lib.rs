//! OPERA Pipeline
//!
//! Per-mode reduction dispatch for a night of ESPaDOnS exposures:
//! - the [`ReductionExecutor`] seam and a subprocess executor
//! - sequential, failure-isolated dispatch in mode order
//! - completion markers so re-runs skip finished modes
//! - the end-of-night summary and verdict

pub mod dispatcher;
pub mod executor;
pub mod night;
pub mod plan;
pub mod summary;

pub use dispatcher::{
    DispatchReport, DispatchResult, DispatchStatus, ReductionDispatcher, MARKER_FILE,
};
pub use executor::{CommandExecutor, ExecutionStatus, ReductionExecutor};
pub use night::NightPipeline;
pub use plan::{compute_plan_digest, parameters_fingerprint, DispatchPlan};
pub use summary::{
    write_summary_json, CleanupEntry, CleanupState, CleanupSummary, ModeSummary, NightSummary,
    Verdict,
};
