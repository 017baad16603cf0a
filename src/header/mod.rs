//! Header parser for SnowEx input files
//!
//! Extracts key/value metadata and column semantics from the free-form
//! preamble of a file and hands back the raw data rows untouched.
//!
//! ## Architecture
//!
//! - [`family`] - structural signatures and family detection
//! - [`registry`] - static synonym registry for header keys and columns
//! - [`values`] - typed header values and their canonicalizers
//! - [`csv_profile`], [`raster_sidecar`], [`annotation`] - one parser per family
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use snowex_ingest::header::parse_content;
//!
//! let content = b"# Site, Grand Mesa\n# Lat, 39.05\n# Lon, -108.06\n# Date, 2020-02-01\n\
//! depth (cm), density (kg/m3)\n95, 250\n";
//! let parsed = parse_content(content, None, &BTreeMap::new()).unwrap();
//! assert_eq!(parsed.rows.len(), 1);
//! ```

pub mod annotation;
pub mod csv_profile;
pub mod family;
pub mod raster_sidecar;
pub mod registry;
pub mod values;

#[cfg(test)]
mod tests;

use crate::error::{Result, SnowexError};
use crate::models::FileFamily;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use registry::ColumnRole;
pub use values::HeaderValue;

/// Where a header value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// 1-based line in the file
    Line(usize),
    /// Supplied by the operator on the command line
    Override,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderField {
    pub value: HeaderValue,
    /// Standardized key the value was read under
    pub key: String,
    /// Raw text as it appeared, for error messages and provenance
    pub raw: String,
    /// Unit declared on the key, e.g. `Elevation (ft)`
    pub key_unit: Option<String>,
    pub source: FieldSource,
}

/// Canonical field name → typed value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    fields: BTreeMap<String, HeaderField>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field; returns the previous field under the same name
    pub fn insert(&mut self, name: impl Into<String>, field: HeaderField) -> Option<HeaderField> {
        self.fields.insert(name.into(), field)
    }

    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&HeaderValue> {
        self.fields.get(name).map(|f| &f.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(HeaderValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<(f64, Option<&str>)> {
        self.value(name).and_then(HeaderValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderField)> {
        self.fields.iter()
    }

    /// Coerce `raw` for standardized `key` and store it under its canonical name.
    ///
    /// Duplicate keys keep the last value and log a warning. Unknown keys are
    /// kept as best-effort untyped values.
    pub fn set_raw(
        &mut self,
        key: &str,
        key_unit: Option<String>,
        raw: &str,
        source: FieldSource,
    ) -> Result<()> {
        let (name, value) = match registry::header_field(key) {
            Some(spec) => {
                let value = (spec.canonicalize)(raw, key_unit.as_deref()).map_err(|reason| {
                    SnowexError::invalid_value(spec.name, raw.trim(), describe(reason, source))
                })?;
                (spec.name.to_string(), value)
            }
            None => {
                debug!("Keeping unknown header key '{}' as untyped value", key);
                (key.to_string(), values::untyped(raw, key_unit.as_deref()))
            }
        };

        let name = self.pit_site_id(key, name, source);
        let field = HeaderField {
            value,
            key: key.to_string(),
            raw: raw.trim().to_string(),
            key_unit,
            source,
        };

        if let Some(previous) = self.fields.get(&name) {
            if source != FieldSource::Override {
                warn!(
                    "Duplicate header key '{}' ({:?}); '{}' replaces '{}'",
                    name, source, field.raw, previous.raw
                );
            }
        }
        self.fields.insert(name, field);
        Ok(())
    }

    /// Pit sheets carry `Location` (the study area) next to `Site` (the pit's
    /// site id). Whichever comes first, `location` keeps `site_name` and the
    /// `site` line moves to `site_id`.
    fn pit_site_id(&mut self, key: &str, name: String, source: FieldSource) -> String {
        if name != "site_name" || source == FieldSource::Override {
            return name;
        }
        let previous_key = match self.fields.get("site_name") {
            Some(previous) if previous.source != FieldSource::Override => previous.key.clone(),
            _ => return name,
        };
        match (previous_key.as_str(), key) {
            ("location", "site") => {
                debug!("Reading 'site' beside 'location' as site_id");
                "site_id".to_string()
            }
            ("site", "location") => {
                if let Some(site) = self.fields.remove("site_name") {
                    debug!("Moving '{}' from site_name to site_id", site.raw);
                    self.fields.entry("site_id".to_string()).or_insert(site);
                }
                name
            }
            _ => name,
        }
    }
}

fn describe(reason: String, source: FieldSource) -> String {
    match source {
        FieldSource::Line(line) => format!("{} on line {}", reason, line),
        FieldSource::Override => format!("{} in operator override", reason),
    }
}

/// Semantics of one data column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Position in the data row
    pub index: usize,
    /// Column header text as written
    pub raw: String,
    /// Canonical column name
    pub name: String,
    pub role: ColumnRole,
    /// Unit declared in the column header
    pub unit: Option<String>,
    /// Registry default used when `unit` is absent
    pub default_unit: Option<&'static str>,
    /// Sample letter for multi-sample columns
    pub sample: Option<char>,
}

impl ColumnSpec {
    pub fn effective_unit(&self) -> Option<&str> {
        self.unit.as_deref().or(self.default_unit)
    }
}

/// One raw data row
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    /// 1-based line number in the file
    pub line: usize,
    pub cells: Vec<String>,
}

/// Everything the header parser extracts from one file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub family: FileFamily,
    pub metadata: Metadata,
    pub columns: Vec<ColumnSpec>,
    /// 1-based line where tabular data begins
    pub data_start_line: usize,
    pub rows: Vec<DataRow>,
    /// Canonical names of the fields supplied by operator overrides
    pub overrides_applied: Vec<String>,
}

/// Decode content as UTF-8, failing with the offset of the first bad byte
pub fn decode(content: &[u8]) -> Result<&str> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    std::str::from_utf8(content).map_err(|e| {
        let offset = e.valid_up_to();
        let line = content[..offset].iter().filter(|b| **b == b'\n').count() + 1;
        SnowexError::Encoding { offset, line }
    })
}

/// Parse raw file content into a structured record
///
/// When `hint` is given the content must carry that family's structure.
/// `overrides` are operator-supplied header values that replace file values.
pub fn parse_content(
    content: &[u8],
    hint: Option<FileFamily>,
    overrides: &BTreeMap<String, String>,
) -> Result<ParsedFile> {
    let text = decode(content)?;

    let family = match hint {
        Some(family) => {
            if !family::matches_family(text, family) {
                return Err(SnowexError::unknown_format(format!(
                    "content does not have the structure of a {} file",
                    family
                )));
            }
            family
        }
        None => family::detect_family(text)?,
    };
    debug!("Parsing content as {}", family);

    let mut parsed = match family {
        FileFamily::CsvProfile => csv_profile::parse(text)?,
        FileFamily::RasterSidecar => raster_sidecar::parse(text)?,
        FileFamily::UavsarAnnotation => annotation::parse(text)?,
    };

    apply_overrides(&mut parsed, overrides)?;
    check_required(&parsed)?;

    debug!(
        "Parsed {} header fields, {} columns, {} data rows (data starts at line {})",
        parsed.metadata.len(),
        parsed.columns.len(),
        parsed.rows.len(),
        parsed.data_start_line
    );

    Ok(parsed)
}

fn apply_overrides(parsed: &mut ParsedFile, overrides: &BTreeMap<String, String>) -> Result<()> {
    for (raw_key, raw_value) in overrides {
        let (key, key_unit) = registry::standardize_key(raw_key);
        let name = registry::header_field(&key)
            .map(|spec| spec.name.to_string())
            .unwrap_or_else(|| key.clone());

        match parsed.metadata.get(&name) {
            Some(existing) => warn!(
                "Operator override for '{}': '{}' replaces file value '{}'",
                name,
                raw_value.trim(),
                existing.raw
            ),
            None => warn!(
                "Operator override for '{}': '{}' (not present in file)",
                name,
                raw_value.trim()
            ),
        }

        parsed
            .metadata
            .set_raw(&key, key_unit, raw_value, FieldSource::Override)?;
        parsed.overrides_applied.push(name);
    }
    Ok(())
}

/// Fields each family cannot do without; every missing one is reported
pub fn missing_required(family: FileFamily, metadata: &Metadata) -> Vec<String> {
    let mut missing = Vec::new();
    let mut need = |name: &str, present: bool| {
        if !present {
            missing.push(name.to_string());
        }
    };

    match family {
        FileFamily::CsvProfile => {
            need("site_name", metadata.contains("site_name"));

            let geographic = metadata.contains("latitude") || metadata.contains("longitude");
            let projected = metadata.contains("easting") || metadata.contains("northing");
            if projected && !geographic {
                need("easting", metadata.contains("easting"));
                need("northing", metadata.contains("northing"));
            } else {
                need("latitude", metadata.contains("latitude"));
                need("longitude", metadata.contains("longitude"));
            }

            need(
                "date",
                metadata.contains("date") || metadata.contains("datetime"),
            );
        }
        FileFamily::RasterSidecar => {
            need("ncols", metadata.contains("ncols"));
            need("nrows", metadata.contains("nrows"));
            need(
                "xllcorner",
                metadata.contains("xllcorner") || metadata.contains("xllcenter"),
            );
            need(
                "yllcorner",
                metadata.contains("yllcorner") || metadata.contains("yllcenter"),
            );
            need("cellsize", metadata.contains("cellsize"));
        }
        FileFamily::UavsarAnnotation => {
            for name in [
                "nrows",
                "ncols",
                "grid_origin_latitude",
                "grid_origin_longitude",
                "grid_spacing_latitude",
                "grid_spacing_longitude",
                "acquisition_start",
            ] {
                need(name, metadata.contains(name));
            }
        }
    }
    missing
}

fn check_required(parsed: &ParsedFile) -> Result<()> {
    let missing = missing_required(parsed.family, &parsed.metadata);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SnowexError::IncompleteHeader { missing })
    }
}
