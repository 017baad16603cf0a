//! Structural signatures used to recognize file families.

use super::csv_profile;
use super::registry::standardize_key;
use crate::constants::{DETECTION_SCAN_LINES, MIN_ANNOTATION_LINES};
use crate::error::{Result, SnowexError};
use crate::models::FileFamily;
use tracing::debug;

const ESRI_REQUIRED: &[&str] = &["ncols", "nrows", "cellsize"];
const ESRI_ORIGIN_X: &[&str] = &["xllcorner", "xllcenter"];
const ESRI_ORIGIN_Y: &[&str] = &["yllcorner", "yllcenter"];

/// What the first lines of a file look like
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Signature {
    pub esri_keys: Vec<String>,
    pub annotation_lines: usize,
    pub ground_range_keys: usize,
    /// 0-based index of the column header line, if any
    pub column_header: Option<usize>,
}

impl Signature {
    pub fn scan(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().take(DETECTION_SCAN_LINES).collect();
        let mut signature = Signature {
            column_header: csv_profile::find_column_header(&lines),
            ..Default::default()
        };

        for line in &lines {
            let line = line.trim().trim_start_matches('#').trim();
            if line.is_empty() {
                continue;
            }

            if let Some(key) = esri_key(line) {
                if !signature.esri_keys.contains(&key) {
                    signature.esri_keys.push(key);
                }
            }

            let body = line.split(';').next().unwrap_or("");
            if let Some((name, _)) = body.split_once('=') {
                if !name.trim().is_empty() && !name.contains(',') {
                    signature.annotation_lines += 1;
                    let (key, _) = standardize_key(name);
                    if key.starts_with("ground_range_data") || key.contains("time_of_acquisition") {
                        signature.ground_range_keys += 1;
                    }
                }
            }
        }
        signature
    }

    pub fn is_raster_sidecar(&self) -> bool {
        let has = |key: &str| self.esri_keys.iter().any(|k| k == key);
        ESRI_REQUIRED.iter().all(|k| has(k))
            && ESRI_ORIGIN_X.iter().any(|k| has(k))
            && ESRI_ORIGIN_Y.iter().any(|k| has(k))
    }

    pub fn is_annotation(&self) -> bool {
        self.annotation_lines >= MIN_ANNOTATION_LINES && self.ground_range_keys > 0
    }

    pub fn is_csv_profile(&self) -> bool {
        self.column_header.is_some()
    }

    pub fn matches(&self, family: FileFamily) -> bool {
        match family {
            FileFamily::CsvProfile => self.is_csv_profile(),
            FileFamily::RasterSidecar => self.is_raster_sidecar(),
            FileFamily::UavsarAnnotation => self.is_annotation(),
        }
    }
}

/// Key of an ESRI grid header line (`ncols 120`, `ncols: 120`)
fn esri_key(line: &str) -> Option<String> {
    let key: String = line
        .chars()
        .take_while(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect::<String>()
        .to_lowercase();
    let rest = line[key.len()..].trim_start_matches([' ', '\t', ':', '=']);
    let known = ESRI_REQUIRED
        .iter()
        .chain(ESRI_ORIGIN_X)
        .chain(ESRI_ORIGIN_Y)
        .any(|k| *k == key);
    let numeric = rest
        .split_whitespace()
        .next()
        .is_some_and(|v| v.parse::<f64>().is_ok());
    (known && numeric).then_some(key)
}

/// Check content against one family's signature
pub fn matches_family(text: &str, family: FileFamily) -> bool {
    Signature::scan(text).matches(family)
}

/// Pick the family whose structure the content carries
pub fn detect_family(text: &str) -> Result<FileFamily> {
    let signature = Signature::scan(text);
    debug!("Family signature: {:?}", signature);

    if signature.is_raster_sidecar() {
        Ok(FileFamily::RasterSidecar)
    } else if signature.is_annotation() {
        Ok(FileFamily::UavsarAnnotation)
    } else if signature.is_csv_profile() {
        Ok(FileFamily::CsvProfile)
    } else {
        Err(SnowexError::unknown_format(
            "no column header line, ESRI grid keys or UAVSAR annotation entries found",
        ))
    }
}
