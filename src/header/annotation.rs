//! UAVSAR annotation (`.ann`) files.
//!
//! Every meaningful line has the form `key (units) = value ; comment`.

use super::registry;
use super::{FieldSource, Metadata, ParsedFile};
use crate::error::Result;
use crate::models::FileFamily;

/// Split `key (units) = value ; comment` into key and value
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let body = line.split(';').next()?.trim();
    let (key, value) = body.split_once('=')?;
    let value = value.trim();
    (!key.trim().is_empty() && !value.is_empty()).then_some((key, value))
}

pub fn parse(text: &str) -> Result<ParsedFile> {
    let mut metadata = Metadata::new();
    let mut lines = 0;

    for (i, line) in text.lines().enumerate() {
        lines = i + 1;
        let Some((raw_key, raw_value)) = split_entry(line) else {
            continue;
        };
        let (key, key_unit) = registry::standardize_key(raw_key);
        if key.is_empty() {
            continue;
        }
        // Annotation units such as "(-)" or "(&)" mean "none"
        let key_unit = key_unit.filter(|u| u.chars().any(|c| c.is_ascii_alphanumeric()));
        metadata.set_raw(&key, key_unit, raw_value, FieldSource::Line(i + 1))?;
    }

    Ok(ParsedFile {
        family: FileFamily::UavsarAnnotation,
        metadata,
        columns: Vec::new(),
        data_start_line: lines + 1,
        rows: Vec::new(),
        overrides_applied: Vec::new(),
    })
}
