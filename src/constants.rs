//! Application constants for SnowEx ingestion
//!
//! Default values, sentinel tokens and geodetic constants used throughout
//! the pipeline.

// =============================================================================
// Versioning
// =============================================================================

/// Recorded on every provenance record so lineage can be tied to parser behaviour
pub const PARSER_VERSION: &str = concat!("snowex_ingest/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Parsing
// =============================================================================

/// Cell and header values that mean "no value"
pub const MISSING_VALUE_TOKENS: &[&str] = &["", "nan", "na", "n/a", "-9999", "-9999.0", "none", "null"];

/// Header comment prefix for CSV profile files
pub const COMMENT_PREFIX: char = '#';

/// Lines inspected when guessing the family of a file without a hint
pub const DETECTION_SCAN_LINES: usize = 200;

/// Minimum annotation-style `key = value` lines before a file counts as UAVSAR
pub const MIN_ANNOTATION_LINES: usize = 3;

/// Check if a raw token means "missing"
pub fn is_missing_token(value: &str) -> bool {
    let trimmed = value.trim().trim_matches('"');
    MISSING_VALUE_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

// =============================================================================
// Spatial reference
// =============================================================================

/// Canonical CRS: WGS84 geographic
pub const CANONICAL_EPSG: u32 = 4326;

/// Mean earth radius used for great-circle distances (IUGG)
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Easting range accepted when inferring UTM from coordinate magnitudes
pub const UTM_EASTING_RANGE: (f64, f64) = (100_000.0, 900_000.0);

/// Northing range accepted when inferring UTM from coordinate magnitudes
pub const UTM_NORTHING_RANGE: (f64, f64) = (0.0, 10_000_000.0);

// =============================================================================
// Batch defaults
// =============================================================================

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PERSISTENCE_TIMEOUT_SECS: u64 = 10;

/// Database file name under the user data directory
pub const DEFAULT_DB_FILE: &str = "snowex.db";
pub const APP_DIR_NAME: &str = "snowex-ingest";
