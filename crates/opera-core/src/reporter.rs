//! Run statistics reporting.
//!
//! Reporters only observe: they receive shared references and cannot alter
//! the inventory or dispatch state. `report_overall` is called once before
//! dispatch, `report_mode` once per mode right before that mode is dispatched.

use crate::domain::exposure::ExposureType;
use crate::domain::mode::{ModeKey, ModeRecord};
use crate::inventory::Inventory;
use tracing::info;

/// Observer of inventory statistics.
pub trait RunReporter: Send + Sync {
    fn report_overall(&self, inventory: &Inventory);

    fn report_mode(&self, key: &ModeKey, record: &ModeRecord);
}

/// Emits statistics as structured tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl RunReporter for TracingReporter {
    fn report_overall(&self, inventory: &Inventory) {
        info!(
            event = "stats.overall",
            total_exposures = inventory.total_exposures,
            groups = inventory.len(),
            eligible = inventory.eligible_count(),
            target = %inventory.target,
            force_calibration = inventory.force_calibration,
            allow_any_readout = inventory.allow_any_readout,
        );
    }

    fn report_mode(&self, key: &ModeKey, record: &ModeRecord) {
        info!(
            event = "stats.mode",
            mode = %key,
            bias = record.count(ExposureType::Bias),
            flat = record.count(ExposureType::Flat),
            comparison = record.count(ExposureType::Comparison),
            align = record.count(ExposureType::Align),
            object = record.count(ExposureType::Object),
            forced = record.forced,
        );
    }
}

/// Human-readable overall statistics.
pub fn render_overall(inventory: &Inventory) -> String {
    let mut out = format!(
        "Total exposures: {}\nMode groups: {} ({} eligible)\nTarget product: {}\n",
        inventory.total_exposures,
        inventory.len(),
        inventory.eligible_count(),
        inventory.target,
    );
    for (key, record) in &inventory.records {
        let status = match (record.eligible, record.forced) {
            (true, true) => "eligible (forced calibration)",
            (true, false) => "eligible",
            (false, _) => "not eligible",
        };
        out.push_str(&format!(
            "  {:<20} {:>4} exposures  {}\n",
            key.to_string(),
            record.total(),
            status
        ));
    }
    out
}

/// Human-readable statistics for one mode.
pub fn render_mode(key: &ModeKey, record: &ModeRecord) -> String {
    let mut out = format!("Mode {}: {} exposures\n", key, record.total());
    for ty in ExposureType::ALL {
        let n = record.count(ty);
        if n > 0 {
            out.push_str(&format!("  {:<11} {}\n", ty.name(), n));
        }
    }
    if record.readout_speeds.len() > 1 {
        let speeds: Vec<&str> = record.readout_speeds.iter().map(|s| s.name()).collect();
        out.push_str(&format!("  readout     {}\n", speeds.join(", ")));
    }
    out
}
