//! Exposure classification.
//!
//! Turns raw header cards into [`Exposure`]s labelled with
//! (instrument mode, readout speed, exposure type). Pure over its inputs.

use crate::domain::error::ClassificationError;
use crate::domain::exposure::Exposure;
use crate::header::ExposureHeader;
use crate::keywords::Keywords;
use crate::obs;

/// Classify one exposure header.
pub fn classify(
    header: &ExposureHeader,
    keywords: &Keywords,
    night: &str,
) -> Result<Exposure, ClassificationError> {
    let required = |keyword: &str| {
        header
            .get(keyword)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClassificationError::MissingKeyword {
                path: header.id.clone(),
                keyword: keyword.to_string(),
            })
    };

    let obstype = required(&keywords.obstype)?;
    let instmode = required(&keywords.instmode)?;
    let readout = required(&keywords.readout_speed)?;

    let exposure_type =
        keywords
            .exposure_type(obstype)
            .ok_or_else(|| ClassificationError::UnknownExposureType {
                path: header.id.clone(),
                value: obstype.to_string(),
            })?;

    let instrument_mode =
        keywords
            .instrument_mode(instmode)
            .ok_or_else(|| ClassificationError::UnknownInstrumentMode {
                path: header.id.clone(),
                value: instmode.to_string(),
            })?;

    let readout_speed =
        keywords
            .readout_speed(readout)
            .ok_or_else(|| ClassificationError::UnknownReadoutSpeed {
                path: header.id.clone(),
                value: readout.to_string(),
            })?;

    Ok(Exposure::new(
        header.id.clone(),
        instrument_mode,
        readout_speed,
        exposure_type,
        night,
    ))
}

/// Outcome of classifying a whole night.
#[derive(Debug, Default)]
pub struct Classified {
    pub exposures: Vec<Exposure>,
    pub errors: Vec<ClassificationError>,
}

/// Classify every header; rejected exposures are logged and collected.
pub fn classify_all<'a>(
    headers: impl IntoIterator<Item = &'a ExposureHeader>,
    keywords: &Keywords,
    night: &str,
) -> Classified {
    let mut classified = Classified::default();
    for header in headers {
        match classify(header, keywords, night) {
            Ok(exposure) => classified.exposures.push(exposure),
            Err(e) => {
                obs::emit_exposure_rejected(e.path(), &e);
                classified.errors.push(e);
            }
        }
    }
    classified
}
