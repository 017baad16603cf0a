//! Grid metadata for raster sidecars and UAVSAR annotations.

use super::crs::{self, SourceCrs};
use super::{Lineage, NormalizeOptions, RasterDraft};
use crate::constants::CANONICAL_EPSG;
use crate::error::{Result, SnowexError};
use crate::header::Metadata;
use crate::models::{Extent, GridMetadata};
use std::path::Path;

/// UAVSAR product suffixes in file names and the raster type they carry
const UAVSAR_PRODUCTS: &[(&str, &str)] = &[
    ("unw", "insar unwrapped phase"),
    ("int", "insar interferogram"),
    ("amp1", "insar amplitude"),
    ("amp2", "insar amplitude"),
    ("amp", "insar amplitude"),
    ("cor", "insar correlation"),
];

pub(super) fn normalize_sidecar(
    metadata: &Metadata,
    options: &NormalizeOptions,
    source_name: &str,
    lineage: &mut Lineage,
) -> Result<RasterDraft> {
    let columns = super::required_number(metadata, "ncols")? as usize;
    let rows = super::required_number(metadata, "nrows")? as usize;
    let cellsize = super::required_number(metadata, "cellsize")?;
    if !(cellsize.is_finite() && cellsize > 0.0) {
        return Err(SnowexError::invalid_value(
            "cellsize",
            cellsize.to_string(),
            "must be positive",
        ));
    }

    // Cell-centre origins sit half a cell inside the corner
    let min_x = match super::header_number(metadata, "xllcorner")? {
        Some(x) => x,
        None => super::required_number(metadata, "xllcenter")? - cellsize / 2.0,
    };
    let min_y = match super::header_number(metadata, "yllcorner")? {
        Some(y) => y,
        None => super::required_number(metadata, "yllcenter")? - cellsize / 2.0,
    };
    let native_extent = Extent {
        min_x,
        min_y,
        max_x: min_x + columns as f64 * cellsize,
        max_y: min_y + rows as f64 * cellsize,
    };

    let declared = super::declared_crs(metadata, options)?;
    let source = match declared {
        Some(crs) => crs,
        None => match super::infer_xy(min_x, min_y) {
            Some(crs::CoordinateShape::Geographic) => SourceCrs::Geographic,
            _ => {
                return Err(SnowexError::coordinate(format!(
                    "grid origin ({}, {}) needs an EPSG code or UTM zone",
                    min_x, min_y
                )));
            }
        },
    };
    lineage.source_epsg = Some(source.epsg());
    let canonical_extent = reproject(&native_extent, source)?;

    let bands = super::header_number(metadata, "bands")?.map_or(1, |b| b as usize);
    let raster_type = metadata
        .text("raster_type")
        .map(str::to_string)
        .unwrap_or_else(|| raster_type_from_name(source_name, "raster"));

    Ok(RasterDraft {
        raster_type,
        grid: GridMetadata {
            rows,
            columns,
            bands,
            resolution_x: cellsize,
            resolution_y: cellsize,
            native_epsg: source.epsg(),
            native_extent,
            canonical_extent,
            nodata: super::header_number(metadata, "nodata_value")?,
        },
        acquired_at: super::header_datetime(metadata, options, lineage)?,
        units: metadata.text("units").map(str::to_string),
        description: metadata.text("description").map(str::to_string),
    })
}

pub(super) fn normalize_annotation(
    metadata: &Metadata,
    options: &NormalizeOptions,
    source_name: &str,
    lineage: &mut Lineage,
) -> Result<RasterDraft> {
    let rows = super::required_number(metadata, "nrows")? as usize;
    let columns = super::required_number(metadata, "ncols")? as usize;
    let origin_lat = super::required_number(metadata, "grid_origin_latitude")?;
    let origin_lon = super::required_number(metadata, "grid_origin_longitude")?;
    let spacing_lat = super::required_number(metadata, "grid_spacing_latitude")?;
    let spacing_lon = super::required_number(metadata, "grid_spacing_longitude")?;

    // The origin is the first sample; spacing carries the direction
    let far_lat = origin_lat + rows as f64 * spacing_lat;
    let far_lon = origin_lon + columns as f64 * spacing_lon;
    crs::validate_geographic(origin_lat, origin_lon)?;
    crs::validate_geographic(far_lat, far_lon)?;

    let extent = Extent {
        min_x: origin_lon.min(far_lon),
        min_y: origin_lat.min(far_lat),
        max_x: origin_lon.max(far_lon),
        max_y: origin_lat.max(far_lat),
    };
    lineage.source_epsg = Some(CANONICAL_EPSG);

    let fallback = super::file_offset(metadata, options)?;
    let acquired_at = match metadata.value("acquisition_start") {
        Some(crate::header::HeaderValue::DateTime(local)) => {
            let offset = local.offset.unwrap_or(fallback);
            lineage.utc_offset = Some(offset.to_string());
            Some(local.to_utc(fallback).ok_or_else(|| {
                SnowexError::invalid_value(
                    "acquisition_start",
                    local.naive.to_string(),
                    "not a valid local time",
                )
            })?)
        }
        _ => None,
    };

    Ok(RasterDraft {
        raster_type: raster_type_from_name(source_name, "insar"),
        grid: GridMetadata {
            rows,
            columns,
            bands: super::header_number(metadata, "bands")?.map_or(1, |b| b as usize),
            resolution_x: spacing_lon.abs(),
            resolution_y: spacing_lat.abs(),
            native_epsg: CANONICAL_EPSG,
            native_extent: extent,
            canonical_extent: extent,
            nodata: super::header_number(metadata, "nodata_value")?,
        },
        acquired_at,
        units: metadata.text("units").map(str::to_string),
        description: metadata.text("description").map(str::to_string),
    })
}

/// Reproject the four corners and take their bounding box
fn reproject(extent: &Extent, source: SourceCrs) -> Result<Extent> {
    if source == SourceCrs::Geographic {
        crs::validate_geographic(extent.min_y, extent.min_x)?;
        crs::validate_geographic(extent.max_y, extent.max_x)?;
        return Ok(*extent);
    }

    let corners = [
        (extent.min_x, extent.min_y),
        (extent.min_x, extent.max_y),
        (extent.max_x, extent.min_y),
        (extent.max_x, extent.max_y),
    ];
    let mut out = Extent {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };
    for (x, y) in corners {
        let point = source.to_canonical(x, y)?;
        out.min_x = out.min_x.min(point.longitude);
        out.min_y = out.min_y.min(point.latitude);
        out.max_x = out.max_x.max(point.longitude);
        out.max_y = out.max_y.max(point.latitude);
    }
    Ok(out)
}

/// Raster type encoded in a file name, e.g. `grmesa_..._HH_01.int.grd.ann`
pub fn raster_type_from_name(source_name: &str, fallback: &str) -> String {
    let file_name = Path::new(source_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| source_name.to_lowercase());

    let parts: Vec<&str> = file_name.split(['.', '_']).collect();
    for (suffix, raster_type) in UAVSAR_PRODUCTS {
        if parts.contains(suffix) {
            return raster_type.to_string();
        }
    }
    fallback.to_string()
}
