//! FITS primary header reading and night directory scanning.
//!
//! Only the primary header is read: 2880-byte blocks of 80-character cards,
//! terminated by an `END` card. The data unit is never touched.

use crate::domain::error::{ClassificationError, ConfigurationError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BLOCK_SIZE: usize = 2880;
pub const CARD_SIZE: usize = 80;

/// Give up on headers longer than this many blocks.
const MAX_HEADER_BLOCKS: usize = 64;

/// Keyword/value pairs of one exposure's primary header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposureHeader {
    /// Path or frame identifier of the exposure.
    pub id: String,
    pub cards: BTreeMap<String, String>,
}

impl ExposureHeader {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cards: BTreeMap::new(),
        }
    }

    /// Build a header from literal keyword/value pairs.
    pub fn from_cards<K, V>(id: impl Into<String>, cards: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            cards: cards
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.cards.get(keyword).map(String::as_str)
    }

    /// Encode as a FITS primary header: `SIMPLE = T`, one string card per
    /// entry, `END`, space-padded to a whole block.
    pub fn to_fits_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_SIZE);
        push_card(&mut out, &format!("{:<8}= {:>20}", "SIMPLE", "T"));
        for (keyword, value) in &self.cards {
            let quoted = format!("'{}'", value.replace('\'', "''"));
            push_card(&mut out, &format!("{:<8}= {:<20}", keyword, quoted));
        }
        push_card(&mut out, "END");
        let padded = out.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        out.resize(padded, b' ');
        out
    }
}

fn push_card(out: &mut Vec<u8>, text: &str) {
    let mut card: Vec<u8> = text.bytes().take(CARD_SIZE).collect();
    card.resize(CARD_SIZE, b' ');
    out.extend_from_slice(&card);
}

/// Read the primary header of a FITS file.
pub fn read_primary_header(path: &Path) -> Result<ExposureHeader, ClassificationError> {
    let id = path.to_string_lossy().to_string();
    let unreadable = |reason: String| ClassificationError::UnreadableHeader {
        path: id.clone(),
        reason,
    };

    let mut file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let mut header = ExposureHeader::new(id.clone());
    let mut block = [0u8; BLOCK_SIZE];

    for _ in 0..MAX_HEADER_BLOCKS {
        file.read_exact(&mut block)
            .map_err(|e| unreadable(format!("truncated header: {}", e)))?;
        if parse_block(&block, &mut header.cards) {
            return Ok(header);
        }
    }

    Err(unreadable(format!(
        "no END card within {} header blocks",
        MAX_HEADER_BLOCKS
    )))
}

/// Parse one header block into `cards`. Returns true once `END` is seen.
///
/// The first occurrence of a keyword wins; commentary cards are ignored.
fn parse_block(block: &[u8], cards: &mut BTreeMap<String, String>) -> bool {
    for raw in block.chunks(CARD_SIZE) {
        let text = String::from_utf8_lossy(raw);
        let keyword = text.get(..8).unwrap_or(text.as_ref()).trim_end();

        if keyword == "END" {
            return true;
        }
        if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
            continue;
        }
        if text.get(8..10) != Some("= ") {
            continue;
        }

        let value = parse_value(text.get(10..).unwrap_or_default());
        cards.entry(keyword.to_string()).or_insert(value);
    }
    false
}

fn parse_value(raw: &str) -> String {
    let raw = raw.trim_start();
    match raw.strip_prefix('\'') {
        Some(rest) => {
            let mut value = String::new();
            let mut chars = rest.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        value.push('\'');
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    value.push(c);
                }
            }
            value.trim_end().to_string()
        }
        None => raw.split('/').next().unwrap_or_default().trim().to_string(),
    }
}

/// Headers read from a night's raw directory.
#[derive(Debug, Default)]
pub struct NightScan {
    pub headers: Vec<ExposureHeader>,
    pub errors: Vec<ClassificationError>,
}

/// List raw frames in `dir` whose file name ends with `suffix`, sorted by name.
pub fn list_raw_frames(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, ConfigurationError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigurationError::Unreadable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigurationError::Unreadable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

/// Read the header of every raw frame in the night directory.
///
/// A frame whose header cannot be read is reported in `errors` and does not
/// stop the scan; only an unreadable directory is fatal.
pub fn scan_night(dir: &Path, suffix: &str) -> Result<NightScan, ConfigurationError> {
    let mut scan = NightScan::default();
    for path in list_raw_frames(dir, suffix)? {
        match read_primary_header(&path) {
            Ok(header) => scan.headers.push(header),
            Err(e) => scan.errors.push(e),
        }
    }
    debug!(
        dir = %dir.display(),
        headers = scan.headers.len(),
        errors = scan.errors.len(),
        "Scanned night directory"
    );
    Ok(scan)
}
