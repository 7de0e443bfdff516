//! Dispatch plan and run identity digests.

use opera_core::{Inventory, ModeKey, RunParameters};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ordered list of modes a run will act on.
///
/// Order is the mode key ordering, so two runs over the same inventory
/// produce the same plan and the same digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchPlan {
    pub keys: Vec<ModeKey>,

    /// SHA-256 digest of the ordered mode slugs.
    pub digest: String,
}

impl DispatchPlan {
    pub fn new(keys: Vec<ModeKey>) -> Self {
        let digest = compute_plan_digest(&keys);
        Self { keys, digest }
    }

    /// Eligible modes of the inventory, in dispatch order.
    pub fn from_inventory(inventory: &Inventory) -> Self {
        Self::new(inventory.eligible_keys())
    }

    /// Every inventory mode plus the modes already present on disk.
    pub fn for_cleanup(inventory: &Inventory, known: &[ModeKey]) -> Self {
        let mut keys: Vec<ModeKey> = inventory
            .keys()
            .copied()
            .chain(known.iter().copied())
            .collect();
        keys.sort();
        keys.dedup();
        Self::new(keys)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Compute deterministic digest of ordered mode keys.
pub fn compute_plan_digest(keys: &[ModeKey]) -> String {
    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.slug().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of the parameters that determine a mode's products.
///
/// Presentation and housekeeping switches (verbose, trace, simulate, clean,
/// clean-all) are left out so toggling them does not invalidate a completed
/// reduction.
pub fn parameters_fingerprint(params: &RunParameters) -> String {
    let plot = params.flags.plot.to_string();
    let any_readout = params.flags.allow_any_readout.to_string();
    let fields = [
        params.night.as_str(),
        params.mode.instrument_mode.name(),
        params.mode.readout_label(),
        plot.as_str(),
        any_readout.as_str(),
        params.target.as_str(),
    ];
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
