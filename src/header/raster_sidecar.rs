//! ESRI ASCII grid style headers with optional `key: value` extensions.
//!
//! ```text
//! ncols         1200
//! nrows         800
//! xllcorner     743000.0
//! yllcorner     4321000.0
//! cellsize      3.0
//! NODATA_value  -9999
//! # site: Grand Mesa
//! # epsg: 26912
//! ```

use super::registry;
use super::{FieldSource, Metadata, ParsedFile};
use crate::constants::{COMMENT_PREFIX, is_missing_token};
use crate::error::Result;
use crate::models::FileFamily;
use tracing::debug;

/// Split an ESRI (`key value`) or extended (`key: value`, `key = value`) line
fn split_line(line: &str) -> Option<(&str, &str)> {
    if let Some(at) = line.find([':', '=']) {
        let key = &line[..at];
        // A colon inside a value ("date 2020-02-01 10:00") is not a separator
        if !key.trim().contains(char::is_whitespace) {
            return Some((key, &line[at + 1..]));
        }
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let key = parts.next()?;
    let value = parts.next()?;
    Some((key, value))
}

fn is_grid_data(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.parse::<f64>().is_ok())
}

pub fn parse(text: &str) -> Result<ParsedFile> {
    let mut metadata = Metadata::new();
    let mut data_start_line = text.lines().count() + 1;

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let body = line.trim().trim_start_matches(COMMENT_PREFIX).trim();
        if body.is_empty() {
            continue;
        }
        if is_grid_data(body) {
            data_start_line = line_no;
            break;
        }
        let Some((raw_key, raw_value)) = split_line(body) else {
            debug!("Line {}: ignoring '{}'", line_no, body);
            continue;
        };
        let (key, key_unit) = registry::standardize_key(raw_key);
        let value = raw_value.trim();
        if key.is_empty() || (is_missing_token(value) && key != "nodata_value") {
            continue;
        }
        metadata.set_raw(&key, key_unit, value, FieldSource::Line(line_no))?;
    }

    Ok(ParsedFile {
        family: FileFamily::RasterSidecar,
        metadata,
        columns: Vec::new(),
        data_start_line,
        rows: Vec::new(),
        overrides_applied: Vec::new(),
    })
}
