//! Mode inventory: classified exposures grouped by [`ModeKey`].
//!
//! Eligibility is a pure function of (exposures, allow_any_readout,
//! force_calibration). A group is eligible when it holds at least one object
//! exposure, or when calibration is forced and it holds at least one
//! calibration exposure.

use crate::domain::exposure::Exposure;
use crate::domain::mode::{ModeKey, ModeRecord};
use crate::domain::params::ProductKind;
use crate::obs;
use std::collections::BTreeMap;

/// Per-mode aggregates for one night, ordered by [`ModeKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub records: BTreeMap<ModeKey, ModeRecord>,
    pub total_exposures: usize,
    pub allow_any_readout: bool,
    pub force_calibration: bool,
    pub target: ProductKind,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, key: &ModeKey) -> Option<&ModeRecord> {
        self.records.get(key)
    }

    /// Every grouped mode in dispatch order, eligible or not.
    pub fn keys(&self) -> impl Iterator<Item = &ModeKey> {
        self.records.keys()
    }

    /// Eligible modes in dispatch order: instrument mode, then readout speed.
    pub fn eligible(&self) -> impl Iterator<Item = (&ModeKey, &ModeRecord)> {
        self.records.iter().filter(|(_, r)| r.eligible)
    }

    pub fn eligible_keys(&self) -> Vec<ModeKey> {
        self.eligible().map(|(k, _)| *k).collect()
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible().count()
    }
}

/// Group exposures into mode records and decide eligibility.
///
/// With `allow_any_readout` the grouping key ignores readout speed; the speeds
/// seen are still recorded on each record. An empty input yields an empty
/// inventory.
pub fn build_inventory(
    exposures: &[Exposure],
    allow_any_readout: bool,
    force_calibration: bool,
    target: ProductKind,
) -> Inventory {
    let mut records: BTreeMap<ModeKey, ModeRecord> = BTreeMap::new();

    for exposure in exposures {
        let key = if allow_any_readout {
            ModeKey::any_readout(exposure.instrument_mode)
        } else {
            ModeKey::new(exposure.instrument_mode, exposure.readout_speed)
        };
        records
            .entry(key)
            .or_default()
            .tally(exposure.exposure_type, exposure.readout_speed);
    }

    for record in records.values_mut() {
        let has_objects = record.object_count() > 0;
        let forced = !has_objects && force_calibration && record.calibration_count() > 0;
        record.eligible = has_objects || forced;
        record.forced = forced;
    }

    let inventory = Inventory {
        records,
        total_exposures: exposures.len(),
        allow_any_readout,
        force_calibration,
        target,
    };

    obs::emit_inventory_built(
        inventory.total_exposures,
        inventory.len(),
        inventory.eligible_count(),
    );

    inventory
}
