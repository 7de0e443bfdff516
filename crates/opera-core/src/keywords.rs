//! Header keyword dictionary used to classify exposures.

use crate::domain::exposure::{ExposureType, InstrumentMode, ReadoutSpeed};
use regex::Regex;

/// Header value pattern that selects an instrument mode.
#[derive(Debug, Clone)]
pub struct ModePattern {
    pub pattern: Regex,
    pub mode: InstrumentMode,
}

/// Maps header keywords and values to classification axes.
#[derive(Debug, Clone)]
pub struct Keywords {
    /// Keyword holding the exposure type.
    pub obstype: String,

    /// Keyword holding the instrument mode description.
    pub instmode: String,

    /// Keyword holding the readout speed description.
    pub readout_speed: String,

    mode_patterns: Vec<ModePattern>,
}

impl Keywords {
    /// Empty dictionary reading the given keywords; instrument modes then only
    /// match their canonical names until patterns are added.
    pub fn new(
        obstype: impl Into<String>,
        instmode: impl Into<String>,
        readout_speed: impl Into<String>,
    ) -> Self {
        Self {
            obstype: obstype.into(),
            instmode: instmode.into(),
            readout_speed: readout_speed.into(),
            mode_patterns: Vec::new(),
        }
    }

    /// ESPaDOnS raw headers: `OBSTYPE`, `INSTMODE`, `EREADSPD`.
    ///
    /// `INSTMODE` values look like `Polarimetry, R=65,000`,
    /// `Spectroscopy, star+sky, R=65,000` or `Spectroscopy, star only, R=80,000`.
    pub fn espadons() -> Self {
        let mut keywords = Self::new("OBSTYPE", "INSTMODE", "EREADSPD");
        let defaults = [
            (r"(?i)\bpolarimetr", InstrumentMode::Polar),
            (r"(?i)\bstar\s*\+\s*sky\b", InstrumentMode::StarPlusSky),
            (r"(?i)\bstar[\s_-]*only\b", InstrumentMode::StarOnly),
        ];
        for (pattern, mode) in defaults {
            if let Ok(pattern) = Regex::new(pattern) {
                keywords.mode_patterns.push(ModePattern { pattern, mode });
            }
        }
        keywords
    }

    /// Append a pattern; earlier patterns take precedence.
    pub fn add_mode_pattern(
        &mut self,
        pattern: &str,
        mode: InstrumentMode,
    ) -> Result<(), regex::Error> {
        let pattern = Regex::new(pattern)?;
        self.mode_patterns.push(ModePattern { pattern, mode });
        Ok(())
    }

    pub fn mode_patterns(&self) -> &[ModePattern] {
        &self.mode_patterns
    }

    /// Canonical names (`Polar`, `StarPlusSky`, `StarOnly`) match first, then
    /// the patterns in order.
    pub fn instrument_mode(&self, value: &str) -> Option<InstrumentMode> {
        let value = value.trim();
        InstrumentMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(value))
            .or_else(|| {
                self.mode_patterns
                    .iter()
                    .find(|p| p.pattern.is_match(value))
                    .map(|p| p.mode)
            })
    }

    /// Leading token of the value, e.g. `Fast: 4.70e noise, 1.60e/ADU, 32s`.
    pub fn readout_speed(&self, value: &str) -> Option<ReadoutSpeed> {
        let token = value
            .trim()
            .split(|c: char| c == ':' || c == ',' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        ReadoutSpeed::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(token))
    }

    pub fn exposure_type(&self, value: &str) -> Option<ExposureType> {
        let value = value.trim();
        ExposureType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(value))
    }
}

impl Default for Keywords {
    fn default() -> Self {
        Self::espadons()
    }
}
