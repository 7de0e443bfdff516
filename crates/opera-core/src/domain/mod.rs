//! Domain models for night orchestration.
//!
//! - `Exposure`: one classified raw frame
//! - `ModeKey` / `ModeRecord`: grouping key and per-mode aggregate
//! - `RunParameters`: bundle handed to the reduction executor per mode

pub mod error;
pub mod exposure;
pub mod mode;
pub mod params;

pub use error::{ClassificationError, CleanupError, ConfigurationError, DispatchError};
pub use exposure::{Exposure, ExposureType, InstrumentMode, ReadoutSpeed};
pub use mode::{ModeKey, ModeRecord};
pub use params::{ParseProductKindError, ProductKind, RunFlags, RunMode, RunParameters};
