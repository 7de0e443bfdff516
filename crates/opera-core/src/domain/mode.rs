//! Mode keys and per-mode aggregates.

use crate::domain::exposure::{ExposureType, InstrumentMode, ReadoutSpeed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Grouping key: (instrument mode, readout speed).
///
/// `readout_speed` is `None` when records were merged across readout speeds.
/// Equality is exact on both fields. The derived ordering (mode, then readout)
/// is the dispatch order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeKey {
    pub instrument_mode: InstrumentMode,
    pub readout_speed: Option<ReadoutSpeed>,
}

impl ModeKey {
    pub fn new(instrument_mode: InstrumentMode, readout_speed: ReadoutSpeed) -> Self {
        Self {
            instrument_mode,
            readout_speed: Some(readout_speed),
        }
    }

    /// Key for a group that ignores readout speed.
    pub fn any_readout(instrument_mode: InstrumentMode) -> Self {
        Self {
            instrument_mode,
            readout_speed: None,
        }
    }

    pub fn readout_label(&self) -> &'static str {
        self.readout_speed.map(|s| s.name()).unwrap_or("Any")
    }

    /// Directory-safe name, e.g. `polar_fast` or `staronly_any`.
    pub fn slug(&self) -> String {
        let readout = self.readout_speed.map(|s| s.slug()).unwrap_or("any");
        format!("{}_{}", self.instrument_mode.slug(), readout)
    }

    /// Inverse of [`ModeKey::slug`].
    pub fn from_slug(slug: &str) -> Option<Self> {
        let (mode, readout) = slug.split_once('_')?;
        let instrument_mode = InstrumentMode::from_slug(mode)?;
        if readout == "any" {
            return Some(Self::any_readout(instrument_mode));
        }
        ReadoutSpeed::from_slug(readout).map(|speed| Self::new(instrument_mode, speed))
    }
}

impl fmt::Display for ModeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instrument_mode, self.readout_label())
    }
}

/// Aggregate of the exposures sharing one [`ModeKey`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeRecord {
    /// Exposure count per type. Types with no exposures are absent.
    pub counts: BTreeMap<ExposureType, usize>,

    /// Readout speeds observed in this group (one entry unless merged).
    pub readout_speeds: BTreeSet<ReadoutSpeed>,

    /// Whether this group qualifies for reduction.
    pub eligible: bool,

    /// True only when forced calibration created eligibility without objects.
    pub forced: bool,
}

impl ModeRecord {
    pub fn count(&self, exposure_type: ExposureType) -> usize {
        self.counts.get(&exposure_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn object_count(&self) -> usize {
        self.count(ExposureType::Object)
    }

    pub fn calibration_count(&self) -> usize {
        self.counts
            .iter()
            .filter(|(ty, _)| ty.is_calibration())
            .map(|(_, n)| n)
            .sum()
    }

    pub(crate) fn tally(&mut self, exposure_type: ExposureType, readout_speed: ReadoutSpeed) {
        *self.counts.entry(exposure_type).or_insert(0) += 1;
        self.readout_speeds.insert(readout_speed);
    }
}
