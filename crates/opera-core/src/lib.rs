//! OPERA Core Library
//!
//! Mode resolution for a night of ESPaDOnS exposures:
//! - reading raw frame headers and classifying exposures
//! - grouping them into a per-mode inventory and deciding eligibility
//! - reporting statistics and cleaning mode products

pub mod classifier;
pub mod cleanup;
pub mod domain;
pub mod header;
pub mod inventory;
pub mod keywords;
pub mod obs;
pub mod reporter;
pub mod resources;
pub mod telemetry;

pub use classifier::{classify, classify_all, Classified};
pub use cleanup::{CleanupCoordinator, CleanupOutcome, CleanupReport, CleanupScope, CleanupStatus};
pub use domain::{
    ClassificationError, CleanupError, ConfigurationError, DispatchError, Exposure, ExposureType,
    InstrumentMode, ModeKey, ModeRecord, ParseProductKindError, ProductKind, ReadoutSpeed,
    RunFlags, RunMode, RunParameters,
};
pub use header::{read_primary_header, scan_night, ExposureHeader, NightScan};
pub use inventory::{build_inventory, Inventory};
pub use keywords::Keywords;
pub use obs::run_span;
pub use reporter::{render_mode, render_overall, RunReporter, TracingReporter};
pub use resources::{ConfigFiles, Directories, PipelineSettings, SharedResources};
pub use telemetry::{init_tracing, verbosity};
