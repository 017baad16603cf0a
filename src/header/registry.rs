//! Static registry of header fields and data columns.
//!
//! Header keys and column names are first standardized (lowercase, units in
//! parentheses split off, punctuation folded to `_`) and then looked up here.
//! Each header field carries the canonicalizer that coerces its raw value.

use super::values::{self, Canonicalizer};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// A known header field
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub canonicalize: Canonicalizer,
}

const fn field(
    name: &'static str,
    aliases: &'static [&'static str],
    canonicalize: Canonicalizer,
) -> FieldSpec {
    FieldSpec {
        name,
        aliases,
        canonicalize,
    }
}

const HEADER_FIELDS: &[FieldSpec] = &[
    // Identity
    field("site_name", &["site", "location", "site_name", "study_area", "site_description"], values::text),
    field("site_id", &["site_id", "siteid"], values::text),
    field("pit_id", &["pitid", "pit_id", "pit", "pit_name", "point_id"], values::text),
    field("campaign", &["campaign", "project"], values::text),
    field("description", &["description", "site_details"], values::text),
    // Location
    field("latitude", &["lat", "latitude", "lat_deg"], values::coordinate),
    field("longitude", &["lon", "long", "longitude", "lon_deg", "long_deg"], values::coordinate),
    field("easting", &["easting", "utm_e", "utm_easting"], values::number),
    field("northing", &["northing", "utm_n", "utm_northing"], values::number),
    field("utm_zone", &["utm_zone", "utmzone", "zone"], values::text),
    field("epsg", &["epsg", "epsg_code", "crs"], values::epsg),
    field("elevation", &["elevation", "elev", "elev_m", "elevation_m", "altitude"], values::number),
    // Time
    field("date", &["date", "obs_date", "survey_date", "date_local"], values::date),
    field("time", &["time", "time_start", "start_time"], values::time),
    field("datetime", &["datetime", "date_time", "timestamp", "date_local_standard_time"], values::datetime),
    field("timezone", &["timezone", "time_zone", "tz"], values::text),
    // Context
    field("observers", &["observers", "observer", "operator", "operators", "surveyors", "surveyor", "observer_s"], values::list),
    field("instrument", &["instrument", "measurement_tool", "smp_serial_number", "instrument_model", "tool"], values::text),
    field("comments", &["comments", "comment", "pit_comments"], values::text),
    field("site_notes", &["notes", "site_notes"], values::text),
    field("flags", &["flags", "flag"], values::text),
    field("slope", &["slope", "slope_angle"], values::angle),
    field("aspect", &["aspect"], values::aspect),
    field("air_temperature", &["air_temp", "air_temperature"], values::number),
    field("total_depth", &["total_depth", "total_snow_depth"], values::number),
    field("weather", &["weather", "weather_description"], values::text),
    field("precipitation", &["precip", "precipitation"], values::text),
    field("sky_cover", &["sky", "sky_cover"], values::text),
    field("wind", &["wind"], values::text),
    field("ground_condition", &["ground_condition"], values::text),
    field("ground_roughness", &["ground_roughness"], values::text),
    field("ground_vegetation", &["ground_vegetation"], values::list),
    field("vegetation_height", &["vegetation_height"], values::text),
    field("tree_canopy", &["tree_canopy"], values::text),
    // Raster grid
    field("ncols", &["ncols", "ground_range_data_longitude_samples"], values::count),
    field("nrows", &["nrows", "ground_range_data_latitude_lines"], values::count),
    field("xllcorner", &["xllcorner"], values::number),
    field("yllcorner", &["yllcorner"], values::number),
    field("xllcenter", &["xllcenter"], values::number),
    field("yllcenter", &["yllcenter"], values::number),
    field("cellsize", &["cellsize", "cell_size"], values::number),
    field("nodata_value", &["nodata_value", "nodata", "no_data"], values::number),
    field("bands", &["bands", "nbands", "band_count"], values::count),
    field("raster_type", &["type", "raster_type", "product"], values::text),
    field("units", &["units", "unit"], values::text),
    // UAVSAR annotation
    field("grid_origin_latitude", &["ground_range_data_starting_latitude"], values::number),
    field("grid_origin_longitude", &["ground_range_data_starting_longitude"], values::number),
    field("grid_spacing_latitude", &["ground_range_data_latitude_spacing"], values::number),
    field("grid_spacing_longitude", &["ground_range_data_longitude_spacing"], values::number),
    field("acquisition_start", &["start_time_of_acquisition_for_pass_1", "acquisition_start"], values::datetime),
    field("acquisition_stop", &["stop_time_of_acquisition_for_pass_1", "acquisition_stop"], values::datetime),
];

static FIELD_REGISTRY: LazyLock<HashMap<&'static str, &'static FieldSpec>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for spec in HEADER_FIELDS {
        map.insert(spec.name, spec);
        for alias in spec.aliases {
            map.insert(*alias, spec);
        }
    }
    map
});

/// Look up a header field by its standardized key
pub fn header_field(key: &str) -> Option<&'static FieldSpec> {
    FIELD_REGISTRY.get(key).copied()
}

/// What a data column contributes to a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Top of a depth layer, or the depth of a point sample
    DepthTop,
    DepthBottom,
    DateTime,
    Date,
    Time,
    NumericMeasurement,
    TextMeasurement,
    /// Free text attached to the profile
    Comments,
    /// Recognized but carried nowhere
    Ignored,
}

impl ColumnRole {
    /// Can place a row within the profile on its own; a clock time
    /// needs a date beside it
    pub fn positions_rows(&self) -> bool {
        matches!(
            self,
            ColumnRole::DepthTop
                | ColumnRole::DepthBottom
                | ColumnRole::DateTime
                | ColumnRole::Date
        )
    }

    pub fn is_measurement(&self) -> bool {
        matches!(
            self,
            ColumnRole::NumericMeasurement | ColumnRole::TextMeasurement
        )
    }
}

#[derive(Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub role: ColumnRole,
    /// Unit assumed when the column header declares none
    pub default_unit: Option<&'static str>,
}

const fn column(
    name: &'static str,
    aliases: &'static [&'static str],
    role: ColumnRole,
    default_unit: Option<&'static str>,
) -> ColumnDef {
    ColumnDef {
        name,
        aliases,
        role,
        default_unit,
    }
}

const COLUMNS: &[ColumnDef] = &[
    column("depth", &["depth", "top", "height", "sample_top_height", "hs", "depth_m", "snow_depth", "top_depth"], ColumnRole::DepthTop, Some("cm")),
    column("bottom_depth", &["bottom", "bottom_depth"], ColumnRole::DepthBottom, Some("cm")),
    column("datetime", &["datetime", "date_time", "timestamp", "date_local_standard_time"], ColumnRole::DateTime, None),
    column("date", &["date"], ColumnRole::Date, None),
    column("time", &["time"], ColumnRole::Time, None),
    column("density", &["density", "avg_density", "avgdensity", "density_mean", "rho"], ColumnRole::NumericMeasurement, Some("kg/m3")),
    column("temperature", &["temperature", "temp", "snow_temperature"], ColumnRole::NumericMeasurement, Some("degC")),
    column("permittivity", &["permittivity", "dielectric_constant"], ColumnRole::NumericMeasurement, None),
    column("lwc_vol", &["lwc_vol", "lwc", "liquid_water_content"], ColumnRole::NumericMeasurement, Some("%")),
    column("specific_surface_area", &["specific_surface_area", "ssa"], ColumnRole::NumericMeasurement, Some("m2/kg")),
    column("equivalent_diameter", &["equivalent_diameter", "deq"], ColumnRole::NumericMeasurement, Some("mm")),
    column("grain_size", &["grain_size"], ColumnRole::TextMeasurement, None),
    column("grain_type", &["grain_type"], ColumnRole::TextMeasurement, None),
    column("hand_hardness", &["hand_hardness"], ColumnRole::TextMeasurement, None),
    column("manual_wetness", &["manual_wetness"], ColumnRole::TextMeasurement, None),
    column("force", &["force"], ColumnRole::NumericMeasurement, Some("N")),
    column("reflectance", &["reflectance"], ColumnRole::NumericMeasurement, None),
    column("sample_signal", &["sample_signal"], ColumnRole::NumericMeasurement, None),
    column("two_way_travel", &["two_way_travel", "twt", "twt_ns"], ColumnRole::NumericMeasurement, Some("ns")),
    column("swe", &["swe", "swe_mm"], ColumnRole::NumericMeasurement, Some("mm")),
    column("comments", &["comments", "comment", "notes"], ColumnRole::Comments, None),
    column("flags", &["flags", "flag"], ColumnRole::Ignored, None),
    column("original_index", &["original_index", "index", "id"], ColumnRole::Ignored, None),
];

static COLUMN_REGISTRY: LazyLock<HashMap<&'static str, &'static ColumnDef>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for def in COLUMNS {
        map.insert(def.name, def);
        for alias in def.aliases {
            map.insert(*alias, def);
        }
    }
    map
});

/// A column name resolved against the registry
#[derive(Debug, Clone, Copy)]
pub struct ColumnMatch {
    pub def: &'static ColumnDef,
    /// Sample letter for multi-sample columns such as `density_b`
    pub sample: Option<char>,
}

/// Look up a standardized column name, recognizing `<measurement>_<letter>` samples
pub fn column_def(key: &str) -> Option<ColumnMatch> {
    if let Some(def) = COLUMN_REGISTRY.get(key) {
        return Some(ColumnMatch { def, sample: None });
    }

    let (stem, suffix) = key.rsplit_once('_')?;
    let mut chars = suffix.chars();
    let letter = chars.next().filter(|c| c.is_ascii_lowercase())?;
    if chars.next().is_some() {
        return None;
    }
    let stem = stem.strip_suffix("_sample").unwrap_or(stem);
    COLUMN_REGISTRY
        .get(stem)
        .filter(|def| def.role.is_measurement())
        .map(|def| ColumnMatch {
            def,
            sample: Some(letter),
        })
}

static UNIT_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]*)\)|\[([^\]]*)\]").expect("unit group pattern is valid")
});

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern is valid"));

/// Standardize a raw key or column name into (key, unit)
///
/// `"# Elevation (ft)"` becomes `("elevation", Some("ft"))`,
/// `"Date/Time"` becomes `("date_time", None)`.
pub fn standardize_key(raw: &str) -> (String, Option<String>) {
    let trimmed = raw
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches('"')
        .trim();

    let unit = UNIT_GROUP
        .captures_iter(trimmed)
        .last()
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty());

    let without_units = UNIT_GROUP.replace_all(trimmed, " ");
    let lowered = without_units.to_lowercase();
    let key = NON_WORD
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string();

    (key, unit)
}
