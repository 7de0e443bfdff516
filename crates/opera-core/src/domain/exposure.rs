//! Classified raw exposures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Spectrograph/polarimeter configuration of an exposure.
///
/// Variant order is the dispatch order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentMode {
    /// Polarimetry, R=65,000
    Polar,
    /// Spectroscopy, star+sky, R=65,000
    StarPlusSky,
    /// Spectroscopy, star only, R=80,000
    StarOnly,
}

impl InstrumentMode {
    pub const ALL: [InstrumentMode; 3] = [
        InstrumentMode::Polar,
        InstrumentMode::StarPlusSky,
        InstrumentMode::StarOnly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentMode::Polar => "Polar",
            InstrumentMode::StarPlusSky => "StarPlusSky",
            InstrumentMode::StarOnly => "StarOnly",
        }
    }

    /// Lower-case token used in product directory names.
    pub fn slug(&self) -> &'static str {
        match self {
            InstrumentMode::Polar => "polar",
            InstrumentMode::StarPlusSky => "starplussky",
            InstrumentMode::StarOnly => "staronly",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.slug() == slug)
    }
}

impl fmt::Display for InstrumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detector readout rate.
///
/// Variant order is the dispatch order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReadoutSpeed {
    Fast,
    Normal,
    Slow,
}

impl ReadoutSpeed {
    pub const ALL: [ReadoutSpeed; 3] = [
        ReadoutSpeed::Fast,
        ReadoutSpeed::Normal,
        ReadoutSpeed::Slow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReadoutSpeed::Fast => "Fast",
            ReadoutSpeed::Normal => "Normal",
            ReadoutSpeed::Slow => "Slow",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ReadoutSpeed::Fast => "fast",
            ReadoutSpeed::Normal => "normal",
            ReadoutSpeed::Slow => "slow",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.slug() == slug)
    }
}

impl fmt::Display for ReadoutSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observation type of an exposure (`OBSTYPE`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExposureType {
    Bias,
    Flat,
    Comparison,
    Align,
    Object,
}

impl ExposureType {
    pub const ALL: [ExposureType; 5] = [
        ExposureType::Bias,
        ExposureType::Flat,
        ExposureType::Comparison,
        ExposureType::Align,
        ExposureType::Object,
    ];

    /// Calibration frames count toward forced-calibration eligibility.
    pub fn is_calibration(&self) -> bool {
        !matches!(self, ExposureType::Object)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExposureType::Bias => "BIAS",
            ExposureType::Flat => "FLAT",
            ExposureType::Comparison => "COMPARISON",
            ExposureType::Align => "ALIGN",
            ExposureType::Object => "OBJECT",
        }
    }
}

impl fmt::Display for ExposureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classified raw data file. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exposure {
    /// Path or frame identifier.
    pub id: String,
    pub instrument_mode: InstrumentMode,
    pub readout_speed: ReadoutSpeed,
    pub exposure_type: ExposureType,
    pub night: String,
}

impl Exposure {
    pub fn new(
        id: impl Into<String>,
        instrument_mode: InstrumentMode,
        readout_speed: ReadoutSpeed,
        exposure_type: ExposureType,
        night: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            instrument_mode,
            readout_speed,
            exposure_type,
            night: night.into(),
        }
    }
}
