//! Unit & CRS normalizer.
//!
//! Turns a [`ParsedFile`] into canonical entity drafts: coordinates in WGS84
//! geographic, times in UTC and every numeric value in the canonical unit of
//! its dimension. What was converted from what is kept in [`Lineage`] so the
//! provenance record can describe it.

pub mod crs;
pub mod profile;
pub mod raster;
pub mod time;
pub mod units;

use self::crs::{CoordinateShape, SourceCrs};
use self::units::Dimension;
use crate::config::IngestConfig;
use crate::error::{Result, SnowexError};
use crate::header::{HeaderValue, Metadata, ParsedFile};
use crate::models::{FileFamily, GeoPoint, NewProfile, NewRaster, PointDraft, SiteDraft};
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Settings the normalizer needs from the run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Offset for header times that declare no timezone
    pub default_offset: FixedOffset,
    /// Hemisphere for a UTM zone given without one
    pub northern_hemisphere: bool,
}

impl NormalizeOptions {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let default_offset = time::offset_from_minutes(config.default_utc_offset_minutes)
            .ok_or_else(|| {
                SnowexError::configuration(format!(
                    "default UTC offset of {} minutes is out of range",
                    config.default_utc_offset_minutes
                ))
            })?;
        Ok(Self {
            default_offset,
            northern_hemisphere: config.northern_hemisphere,
        })
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            default_offset: Utc.fix(),
            northern_hemisphere: true,
        }
    }
}

/// What was converted, recorded in the provenance parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    /// EPSG code the file's coordinates were declared or inferred in
    pub source_epsg: Option<u32>,
    /// UTC offset applied to the file's local times
    pub utc_offset: Option<String>,
    /// Column header → unit the values were delivered in
    pub column_units: BTreeMap<String, String>,
    /// Header field → unit the value was delivered in
    pub header_units: BTreeMap<String, String>,
    /// Header fields replaced by operator overrides
    pub overrides: Vec<String>,
}

/// Raster content before the file checksum is attached
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDraft {
    pub raster_type: String,
    pub grid: crate::models::GridMetadata,
    pub acquired_at: Option<DateTime<Utc>>,
    pub units: Option<String>,
    pub description: Option<String>,
}

impl RasterDraft {
    pub fn into_raster(self, checksum: impl Into<String>) -> NewRaster {
        NewRaster {
            raster_type: self.raster_type,
            grid: self.grid,
            checksum: checksum.into(),
            acquired_at: self.acquired_at,
            units: self.units,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedContent {
    Profiles {
        point: PointDraft,
        profiles: Vec<NewProfile>,
    },
    Raster(RasterDraft),
}

/// A file in canonical units, ready for entity resolution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFile {
    pub family: FileFamily,
    /// Rasters may arrive without a site
    pub site: Option<SiteDraft>,
    pub content: NormalizedContent,
    pub lineage: Lineage,
}

/// Normalize a parsed file; `source_name` is the file name, used when a
/// raster's type is only encoded there
pub fn normalize(
    parsed: &ParsedFile,
    options: &NormalizeOptions,
    source_name: &str,
) -> Result<NormalizedFile> {
    let mut lineage = Lineage {
        overrides: parsed.overrides_applied.clone(),
        ..Default::default()
    };

    let (site, content) = match parsed.family {
        FileFamily::CsvProfile => {
            let (site, point, profiles) = profile::normalize_profiles(parsed, options, &mut lineage)?;
            (
                Some(site),
                NormalizedContent::Profiles { point, profiles },
            )
        }
        FileFamily::RasterSidecar => {
            let draft = raster::normalize_sidecar(&parsed.metadata, options, source_name, &mut lineage)?;
            (site_draft(&parsed.metadata, None), NormalizedContent::Raster(draft))
        }
        FileFamily::UavsarAnnotation => {
            let draft = raster::normalize_annotation(&parsed.metadata, options, source_name, &mut lineage)?;
            (site_draft(&parsed.metadata, None), NormalizedContent::Raster(draft))
        }
    };

    debug!(
        "Normalized {} content from {} (source EPSG {:?}, offset {:?})",
        parsed.family, source_name, lineage.source_epsg, lineage.utc_offset
    );

    Ok(NormalizedFile {
        family: parsed.family,
        site,
        content,
        lineage,
    })
}

/// Site identity from the header, if it names one
fn site_draft(metadata: &Metadata, location: Option<GeoPoint>) -> Option<SiteDraft> {
    let name = metadata.text("site_name")?.trim();
    if name.is_empty() {
        return None;
    }
    Some(SiteDraft {
        name: name.to_string(),
        location,
        description: metadata
            .text("description")
            .map(str::to_string)
            .filter(|d| !d.trim().is_empty()),
    })
}

/// Numeric header value converted to the canonical unit of `dimension`.
///
/// `default_unit` applies when neither key nor value declares one.
fn header_quantity(
    metadata: &Metadata,
    field: &str,
    dimension: Dimension,
    default_unit: &'static str,
    lineage: &mut Lineage,
) -> Result<Option<f64>> {
    let Some(header) = metadata.get(field) else {
        return Ok(None);
    };
    let Some((value, unit)) = header.value.as_number() else {
        return Err(SnowexError::invalid_value(field, &header.raw, "expected a number"));
    };
    let unit = units::parse_unit(field, unit.unwrap_or(default_unit))?;
    if unit.dimension != dimension {
        return Err(SnowexError::UnsupportedUnit {
            field: field.to_string(),
            unit: unit.symbol.to_string(),
        });
    }
    if !unit.is_canonical() {
        lineage
            .header_units
            .insert(field.to_string(), unit.symbol.to_string());
    }
    Ok(Some(unit.to_canonical(value)))
}

/// Plain number from the header, ignoring any unit
fn header_number(metadata: &Metadata, field: &str) -> Result<Option<f64>> {
    match metadata.get(field) {
        None => Ok(None),
        Some(header) => header
            .value
            .as_number()
            .map(|(value, _)| Some(value))
            .ok_or_else(|| SnowexError::invalid_value(field, &header.raw, "expected a number")),
    }
}

fn required_number(metadata: &Metadata, field: &str) -> Result<f64> {
    header_number(metadata, field)?.ok_or_else(|| SnowexError::IncompleteHeader {
        missing: vec![field.to_string()],
    })
}

/// Offset for the file's local times: header `timezone`, else the default
fn file_offset(metadata: &Metadata, options: &NormalizeOptions) -> Result<FixedOffset> {
    match metadata.get("timezone") {
        None => Ok(options.default_offset),
        Some(header) => {
            let text = header.value.as_text().unwrap_or(header.raw.as_str());
            time::parse_timezone(text)
                .ok_or_else(|| SnowexError::invalid_value("timezone", text, "unrecognized timezone"))
        }
    }
}

/// Observation time from `datetime`, or `date` plus optional `time`
fn header_datetime(
    metadata: &Metadata,
    options: &NormalizeOptions,
    lineage: &mut Lineage,
) -> Result<Option<DateTime<Utc>>> {
    let fallback = file_offset(metadata, options)?;

    let local = if let Some(HeaderValue::DateTime(dt)) = metadata.value("datetime") {
        *dt
    } else {
        match metadata.value("date") {
            None => return Ok(None),
            Some(HeaderValue::DateTime(dt)) => *dt,
            Some(HeaderValue::Date(date)) => {
                let (clock, offset) = header_time(metadata)?;
                time::LocalDateTime {
                    naive: date.and_time(clock),
                    offset,
                }
            }
            Some(_) => {
                let raw = metadata.get("date").map(|f| f.raw.as_str()).unwrap_or("");
                return Err(SnowexError::invalid_value("date", raw, "unrecognized date"));
            }
        }
    };

    let offset = local.offset.unwrap_or(fallback);
    lineage.utc_offset = Some(offset.to_string());
    local.to_utc(fallback).map(Some).ok_or_else(|| {
        SnowexError::invalid_value("datetime", local.naive.to_string(), "not a valid local time")
    })
}

/// Time of day from the `time` field, with a zone when it carried one
fn header_time(metadata: &Metadata) -> Result<(NaiveTime, Option<FixedOffset>)> {
    match metadata.value("time") {
        None => Ok((NaiveTime::MIN, None)),
        Some(HeaderValue::Time(t)) => Ok((*t, None)),
        Some(HeaderValue::Text(text)) => text
            .rsplit_once(char::is_whitespace)
            .and_then(|(clock, zone)| Some((time::parse_time(clock)?, time::parse_timezone(zone)?)))
            .map(|(clock, zone)| (clock, Some(zone)))
            .ok_or_else(|| SnowexError::invalid_value("time", text, "unrecognized time")),
        Some(other) => Err(SnowexError::invalid_value(
            "time",
            other.render(),
            "unrecognized time",
        )),
    }
}

/// Declared CRS from `epsg` or `utm_zone`
fn declared_crs(metadata: &Metadata, options: &NormalizeOptions) -> Result<Option<SourceCrs>> {
    if let Some(code) = header_number(metadata, "epsg")? {
        return crs::crs_from_epsg(code as u32).map(Some);
    }
    if let Some(header) = metadata.get("utm_zone") {
        let text = header.value.as_text().unwrap_or(header.raw.as_str());
        let zone = crs::parse_utm_zone(text, options.northern_hemisphere)?;
        return Ok(Some(SourceCrs::utm(zone)));
    }
    Ok(None)
}

/// Convert an (x, y) pair to canonical coordinates, inferring the CRS when
/// the header declares none
fn locate(
    x: f64,
    y: f64,
    declared: Option<SourceCrs>,
    lineage: &mut Lineage,
) -> Result<GeoPoint> {
    let crs = match declared {
        Some(crs) => crs,
        None => match infer_xy(x, y) {
            Some(CoordinateShape::Geographic) => SourceCrs::Geographic,
            Some(CoordinateShape::Projected) => {
                return Err(SnowexError::coordinate(format!(
                    "projected coordinates ({}, {}) without a UTM zone or EPSG code",
                    x, y
                )));
            }
            None => {
                return Err(SnowexError::coordinate(format!(
                    "coordinates ({}, {}) are neither geographic nor UTM",
                    x, y
                )));
            }
        },
    };
    lineage.source_epsg = Some(crs.epsg());
    crs.to_canonical(x, y)
}

/// Shape of an (x, y) = (lon, lat) or (easting, northing) pair
fn infer_xy(x: f64, y: f64) -> Option<CoordinateShape> {
    match crs::infer_shape(y, x) {
        Some(CoordinateShape::Geographic) => Some(CoordinateShape::Geographic),
        _ => crs::infer_shape(x, y).filter(|s| *s == CoordinateShape::Projected),
    }
}
