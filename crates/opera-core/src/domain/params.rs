//! Run flags and the per-mode parameter bundle handed to the reduction executor.

use crate::domain::mode::ModeKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Target product of a night's reduction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProductKind {
    #[serde(rename = "CALIBRATIONS")]
    Calibrations,
    #[default]
    #[serde(rename = "OBJECTS")]
    Objects,
    #[serde(rename = "LIBRE-ESPRIT")]
    LibreEsprit,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Calibrations => "CALIBRATIONS",
            ProductKind::Objects => "OBJECTS",
            ProductKind::LibreEsprit => "LIBRE-ESPRIT",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown target product name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target product '{0}' (expected CALIBRATIONS, OBJECTS or LIBRE-ESPRIT)")]
pub struct ParseProductKindError(pub String);

impl FromStr for ProductKind {
    type Err = ParseProductKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALIBRATIONS" => Ok(ProductKind::Calibrations),
            "OBJECTS" => Ok(ProductKind::Objects),
            "LIBRE-ESPRIT" => Ok(ProductKind::LibreEsprit),
            _ => Err(ParseProductKindError(s.to_string())),
        }
    }
}

/// Operator switches shared by every mode of a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunFlags {
    pub clean: bool,
    pub clean_all: bool,
    pub simulate: bool,
    pub plot: bool,
    pub verbose: bool,
    pub trace: bool,
    pub allow_any_readout: bool,
    pub force_calibration: bool,
}

impl RunFlags {
    pub fn run_mode(&self) -> RunMode {
        if self.clean_all {
            RunMode::CleanOnly
        } else {
            RunMode::Reduce
        }
    }
}

/// Top-level behaviour of a run, selected once before dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Invoke the reduction executor for every eligible mode.
    Reduce,
    /// Skip reduction and remove the products of every known mode.
    CleanOnly,
}

/// Parameter bundle for one mode's reduction. Built fresh per dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunParameters {
    pub night: String,
    pub mode: ModeKey,
    pub flags: RunFlags,
    pub target: ProductKind,

    /// Product directory owned by this mode.
    pub product_dir: PathBuf,

    /// Scratch directory for this mode's intermediates.
    pub scratch_dir: PathBuf,
}

impl RunParameters {
    /// Flat ordered bundle:
    /// `[night, instrumentMode, readoutSpeed, clean, simulate, plot, verbose,
    /// trace, allowAnyReadout, targetProduct, cleanAll]`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.night.clone(),
            self.mode.instrument_mode.name().to_string(),
            self.mode.readout_label().to_string(),
            self.flags.clean.to_string(),
            self.flags.simulate.to_string(),
            self.flags.plot.to_string(),
            self.flags.verbose.to_string(),
            self.flags.trace.to_string(),
            self.flags.allow_any_readout.to_string(),
            self.target.as_str().to_string(),
            self.flags.clean_all.to_string(),
        ]
    }
}
