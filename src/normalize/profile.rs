//! Profile files: point identity from the header, measurements from the rows.

use super::units::{self, Dimension, Unit};
use super::{Lineage, NormalizeOptions, crs, time};
use crate::constants::is_missing_token;
use crate::error::{Result, SnowexError};
use crate::header::{ColumnRole, ColumnSpec, DataRow, Metadata, ParsedFile};
use crate::models::{
    GeoPoint, Measurement, MeasurementValue, NewProfile, PointDraft, ProfileIndex, SiteDraft,
};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

pub(super) fn normalize_profiles(
    parsed: &ParsedFile,
    options: &NormalizeOptions,
    lineage: &mut Lineage,
) -> Result<(SiteDraft, PointDraft, Vec<NewProfile>)> {
    let metadata = &parsed.metadata;

    let location = point_location(metadata, options, lineage)?;
    let observed_at = super::header_datetime(metadata, options, lineage)?.ok_or_else(|| {
        SnowexError::IncompleteHeader {
            missing: vec!["date".to_string()],
        }
    })?;
    let elevation_m = super::header_quantity(metadata, "elevation", Dimension::Length, "m", lineage)?;

    let site = super::site_draft(metadata, Some(location)).ok_or_else(|| {
        SnowexError::IncompleteHeader {
            missing: vec!["site_name".to_string()],
        }
    })?;
    let point = PointDraft {
        location,
        elevation_m,
        observed_at,
        label: metadata.text("pit_id").map(str::to_string),
    };

    let offset = super::file_offset(metadata, options)?;
    let profiles = build_profiles(parsed, offset, lineage)?;

    Ok((site, point, profiles))
}

/// Point coordinates from lat/lon or easting/northing header fields
fn point_location(
    metadata: &Metadata,
    options: &NormalizeOptions,
    lineage: &mut Lineage,
) -> Result<GeoPoint> {
    let declared = super::declared_crs(metadata, options)?;
    let latitude = super::header_number(metadata, "latitude")?;
    let longitude = super::header_number(metadata, "longitude")?;

    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        // Lat/lon values win over a declared projection when they look geographic
        if crs::infer_shape(lat, lon) == Some(crs::CoordinateShape::Geographic) {
            lineage.source_epsg = Some(crs::SourceCrs::Geographic.epsg());
            return crs::validate_geographic(lat, lon);
        }
        // Some sheets put northing/easting under the lat/lon keys
        return super::locate(lon, lat, declared, lineage);
    }

    let easting = super::header_quantity(metadata, "easting", Dimension::Length, "m", lineage)?;
    let northing = super::header_quantity(metadata, "northing", Dimension::Length, "m", lineage)?;
    match (easting, northing) {
        (Some(x), Some(y)) => super::locate(x, y, declared, lineage),
        _ => Err(SnowexError::IncompleteHeader {
            missing: vec!["latitude".to_string(), "longitude".to_string()],
        }),
    }
}

/// One measurement with all its sample columns
struct MeasurementGroup<'a> {
    name: &'a str,
    role: ColumnRole,
    /// Each sample column with its own resolved unit
    columns: Vec<(&'a ColumnSpec, Option<Unit>)>,
    /// Unit reported for the profile; samples share its dimension
    unit: Option<Unit>,
}

/// How rows are positioned within the profile
enum RowIndex<'a> {
    Depth {
        top: &'a ColumnSpec,
        bottom: Option<&'a ColumnSpec>,
        unit: Unit,
    },
    Time {
        datetime: Option<&'a ColumnSpec>,
        date: Option<&'a ColumnSpec>,
        time: Option<&'a ColumnSpec>,
    },
}

fn build_profiles(
    parsed: &ParsedFile,
    offset: FixedOffset,
    lineage: &mut Lineage,
) -> Result<Vec<NewProfile>> {
    let index = row_index(&parsed.columns, lineage)?;
    let groups = measurement_groups(&parsed.columns, lineage)?;

    let metadata = &parsed.metadata;
    let instrument = metadata.text("instrument").map(str::to_string);
    let observers = metadata
        .value("observers")
        .and_then(|v| v.as_list())
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    let note_columns: Vec<&ColumnSpec> = parsed
        .columns
        .iter()
        .filter(|c| c.role == ColumnRole::Comments)
        .collect();

    let mut profiles: Vec<NewProfile> = groups
        .iter()
        .map(|group| NewProfile {
            measurement_type: group.name.to_string(),
            unit: group.unit.map(|u| u.canonical_symbol().to_string()),
            measurements: Vec::with_capacity(parsed.rows.len()),
            instrument: instrument.clone(),
            observers: observers.clone(),
            comments: None,
        })
        .collect();

    // Header comments first, then per-layer notes in row order
    let mut notes: Vec<String> = metadata
        .text("comments")
        .map(str::to_string)
        .into_iter()
        .collect();
    for row in &parsed.rows {
        let position = row_position(&index, row, offset)?;
        notes.extend(row_note(&index, &note_columns, row));
        for (group, profile) in groups.iter().zip(profiles.iter_mut()) {
            profile.measurements.push(Measurement {
                index: position.clone(),
                value: group_value(group, row)?,
            });
        }
    }

    let comments = (!notes.is_empty()).then(|| notes.join("; "));
    for profile in &mut profiles {
        profile.comments = comments.clone();
    }

    debug!(
        "Built {} profiles over {} rows",
        profiles.len(),
        parsed.rows.len()
    );
    Ok(profiles)
}

fn row_index<'a>(columns: &'a [ColumnSpec], lineage: &mut Lineage) -> Result<RowIndex<'a>> {
    let find = move |role: ColumnRole| columns.iter().find(|c| c.role == role);

    let top = find(ColumnRole::DepthTop);
    let bottom = find(ColumnRole::DepthBottom);
    if let Some(top) = top.or(bottom) {
        let unit = column_unit(top, Some(Dimension::Length), lineage)?
            .unwrap_or_else(|| Dimension::Length.canonical_unit());
        if let Some(bottom) = bottom.filter(|b| b.index != top.index) {
            column_unit(bottom, Some(Dimension::Length), lineage)?;
        }
        return Ok(RowIndex::Depth {
            top,
            bottom: bottom.filter(|b| b.index != top.index),
            unit,
        });
    }

    let datetime = find(ColumnRole::DateTime);
    let date = find(ColumnRole::Date);
    if datetime.is_none() && date.is_none() {
        return Err(SnowexError::unknown_format(
            "column header has no depth or date column to index the profile",
        ));
    }
    Ok(RowIndex::Time {
        datetime,
        date,
        time: find(ColumnRole::Time),
    })
}

/// Group measurement columns by canonical name, keeping header order
fn measurement_groups<'a>(
    columns: &'a [ColumnSpec],
    lineage: &mut Lineage,
) -> Result<Vec<MeasurementGroup<'a>>> {
    let mut groups: Vec<MeasurementGroup<'a>> = Vec::new();

    for column in columns {
        if !column.role.is_measurement() {
            continue;
        }

        let unit = match column.role {
            ColumnRole::NumericMeasurement => {
                let expected = column
                    .default_unit
                    .and_then(|u| units::parse_unit(&column.name, u).ok())
                    .map(|u| u.dimension);
                column_unit(column, expected, lineage)?
            }
            _ => {
                if let Some(unit) = &column.unit {
                    lineage.column_units.insert(column.raw.clone(), unit.clone());
                }
                None
            }
        };

        if let Some(group) = groups.iter_mut().find(|g| g.name == column.name) {
            match (group.unit, unit) {
                (Some(shared), Some(own)) if shared.dimension != own.dimension => {
                    return Err(SnowexError::UnsupportedUnit {
                        field: column.raw.clone(),
                        unit: column.effective_unit().unwrap_or(own.symbol).to_string(),
                    });
                }
                (None, Some(own)) => group.unit = Some(own),
                _ => {}
            }
            group.columns.push((column, unit));
            continue;
        }

        groups.push(MeasurementGroup {
            name: &column.name,
            role: column.role,
            columns: vec![(column, unit)],
            unit,
        });
    }

    Ok(groups)
}

/// Resolve a column's unit and check it measures `expected`
fn column_unit(
    column: &ColumnSpec,
    expected: Option<Dimension>,
    lineage: &mut Lineage,
) -> Result<Option<Unit>> {
    let Some(unit) = units::resolve_unit(&column.name, column.unit.as_deref(), column.default_unit)?
    else {
        return Ok(None);
    };
    if expected.is_some_and(|d| d != unit.dimension) {
        return Err(SnowexError::UnsupportedUnit {
            field: column.raw.clone(),
            unit: column.effective_unit().unwrap_or(unit.symbol).to_string(),
        });
    }
    lineage
        .column_units
        .insert(column.raw.clone(), unit.symbol.to_string());
    Ok(Some(unit))
}

fn cell<'r>(row: &'r DataRow, column: &ColumnSpec) -> Option<&'r str> {
    row.cells
        .get(column.index)
        .map(|c| c.trim())
        .filter(|c| !is_missing_token(c))
}

fn parse_number(row: &DataRow, column: &ColumnSpec, text: &str) -> Result<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(row, column, text))
}

fn malformed(row: &DataRow, column: &ColumnSpec, value: &str) -> SnowexError {
    SnowexError::MalformedData {
        line: row.line,
        column: column.raw.clone(),
        value: value.to_string(),
    }
}

fn row_position(index: &RowIndex<'_>, row: &DataRow, offset: FixedOffset) -> Result<ProfileIndex> {
    match index {
        RowIndex::Depth { top, bottom, unit } => {
            let text = cell(row, top).ok_or_else(|| malformed(row, top, ""))?;
            let top_m = unit.to_canonical(parse_number(row, top, text)?);
            let bottom_m = match bottom {
                Some(column) => match cell(row, column) {
                    Some(text) => {
                        let bottom_unit = units::resolve_unit(
                            &column.name,
                            column.unit.as_deref(),
                            column.default_unit,
                        )?
                        .unwrap_or(*unit);
                        Some(bottom_unit.to_canonical(parse_number(row, column, text)?))
                    }
                    None => None,
                },
                None => None,
            };
            Ok(ProfileIndex::Depth { top_m, bottom_m })
        }
        RowIndex::Time {
            datetime,
            date,
            time: clock,
        } => Ok(ProfileIndex::Time {
            at: row_time(row, *datetime, *date, *clock, offset)?,
        }),
    }
}

fn row_time(
    row: &DataRow,
    datetime: Option<&ColumnSpec>,
    date: Option<&ColumnSpec>,
    clock: Option<&ColumnSpec>,
    offset: FixedOffset,
) -> Result<DateTime<Utc>> {
    let local = match (datetime, date) {
        (Some(column), _) => {
            let text = cell(row, column).ok_or_else(|| malformed(row, column, ""))?;
            time::parse_datetime(text).ok_or_else(|| malformed(row, column, text))?
        }
        (None, Some(column)) => {
            let text = cell(row, column).ok_or_else(|| malformed(row, column, ""))?;
            let day = time::parse_date(text).ok_or_else(|| malformed(row, column, text))?;
            let at = match clock {
                Some(column) => match cell(row, column) {
                    Some(text) => time::parse_time(text).ok_or_else(|| malformed(row, column, text))?,
                    None => chrono::NaiveTime::MIN,
                },
                None => chrono::NaiveTime::MIN,
            };
            time::LocalDateTime {
                naive: day.and_time(at),
                offset: None,
            }
        }
        (None, None) => {
            return Err(SnowexError::unknown_format("profile has no time column"));
        }
    };
    let column = datetime.or(date).map(|c| c.raw.as_str()).unwrap_or("");
    local.to_utc(offset).ok_or_else(|| SnowexError::MalformedData {
        line: row.line,
        column: column.to_string(),
        value: local.naive.to_string(),
    })
}

/// Value of one measurement in a row; samples are converted, then averaged
fn group_value(group: &MeasurementGroup<'_>, row: &DataRow) -> Result<Option<MeasurementValue>> {
    match group.role {
        ColumnRole::NumericMeasurement => {
            let mut sum = 0.0;
            let mut present = 0usize;
            for (column, unit) in &group.columns {
                if let Some(text) = cell(row, column) {
                    let value = parse_number(row, column, text)?;
                    sum += unit.map_or(value, |u| u.to_canonical(value));
                    present += 1;
                }
            }
            Ok((present > 0).then(|| MeasurementValue::Number(sum / present as f64)))
        }
        _ => {
            let texts: Vec<&str> = group
                .columns
                .iter()
                .filter_map(|(c, _)| cell(row, c))
                .collect();
            Ok((!texts.is_empty()).then(|| MeasurementValue::Text(texts.join("; "))))
        }
    }
}

/// Free text from the comments columns, tagged with the row's index cells
fn row_note(index: &RowIndex<'_>, notes: &[&ColumnSpec], row: &DataRow) -> Option<String> {
    let texts: Vec<&str> = notes.iter().filter_map(|c| cell(row, c)).collect();
    if texts.is_empty() {
        return None;
    }
    let index_cells: Vec<&str> = match index {
        RowIndex::Depth { top, bottom, .. } => [Some(*top), *bottom]
            .into_iter()
            .flatten()
            .filter_map(|c| cell(row, c))
            .collect(),
        RowIndex::Time {
            datetime,
            date,
            time: clock,
        } => [*datetime, *date, *clock]
            .into_iter()
            .flatten()
            .filter_map(|c| cell(row, c))
            .collect(),
    };
    let label = if index_cells.is_empty() {
        format!("line {}", row.line)
    } else {
        index_cells.join("-")
    };
    Some(format!("{}: {}", label, texts.join("; ")))
}
