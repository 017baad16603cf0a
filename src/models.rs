//! Core data structures shared across the ingestion pipeline.
//!
//! Defines the file families, canonical entity records, store references,
//! and the per-batch report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ErrorKind;

/// Closed set of file families the header parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileFamily {
    /// Snow pit / instrument profile CSV with a free-form preamble
    CsvProfile,
    /// ESRI ASCII grid style header describing a raster
    RasterSidecar,
    /// UAVSAR `.ann` annotation file
    UavsarAnnotation,
}

impl FileFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFamily::CsvProfile => "csv-profile",
            FileFamily::RasterSidecar => "raster-sidecar",
            FileFamily::UavsarAnnotation => "uavsar-annotation",
        }
    }

    /// Weak hint from the file extension, used only to order detection attempts
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(FileFamily::CsvProfile),
            "asc" | "hdr" => Some(FileFamily::RasterSidecar),
            "ann" => Some(FileFamily::UavsarAnnotation),
            _ => None,
        }
    }
}

impl fmt::Display for FileFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "csv-profile" | "csv" | "profile" => Ok(FileFamily::CsvProfile),
            "raster-sidecar" | "raster" | "sidecar" => Ok(FileFamily::RasterSidecar),
            "uavsar-annotation" | "uavsar" | "ann" => Ok(FileFamily::UavsarAnnotation),
            other => Err(format!(
                "unknown file family '{}' (expected csv-profile, raster-sidecar or uavsar-annotation)",
                other
            )),
        }
    }
}

/// A location in the canonical CRS (WGS84 geographic, EPSG:4326)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

macro_rules! entity_ref {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_ref!(SiteRef);
entity_ref!(PointRef);
entity_ref!(ProfileRef);
entity_ref!(RasterRef);
entity_ref!(ProvenanceRef);

/// A persisted study site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteRef,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub description: Option<String>,
}

/// Site identity as extracted from a header, before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDraft {
    pub name: String,
    pub location: Option<GeoPoint>,
    pub description: Option<String>,
}

/// A persisted observation location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointRef,
    pub site: SiteRef,
    pub location: GeoPoint,
    pub elevation_m: Option<f64>,
    pub observed_at: DateTime<Utc>,
    pub label: Option<String>,
}

/// Point identity as extracted from a header, before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDraft {
    pub location: GeoPoint,
    pub elevation_m: Option<f64>,
    pub observed_at: DateTime<Utc>,
    pub label: Option<String>,
}

/// Position of one measurement within a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileIndex {
    /// Depth layer in metres; `bottom_m` set for layered observations
    Depth { top_m: f64, bottom_m: Option<f64> },
    /// Time-indexed series at a fixed point
    Time { at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Number(f64),
    Text(String),
}

impl MeasurementValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MeasurementValue::Number(v) => Some(*v),
            MeasurementValue::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub index: ProfileIndex,
    /// `None` when every sample for this layer was a missing-value token
    pub value: Option<MeasurementValue>,
}

/// Profile content ready for insertion, all values in canonical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub measurement_type: String,
    pub unit: Option<String>,
    pub measurements: Vec<Measurement>,
    pub instrument: Option<String>,
    pub observers: Vec<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: ProfileRef,
    pub point: PointRef,
    pub provenance: ProvenanceRef,
    pub profile: NewProfile,
}

/// Axis-aligned bounding box; x/y are easting/northing or lon/lat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    pub rows: usize,
    pub columns: usize,
    pub bands: usize,
    pub resolution_x: f64,
    pub resolution_y: f64,
    /// EPSG code of the grid as delivered
    pub native_epsg: u32,
    pub native_extent: Extent,
    /// Extent reprojected to WGS84 longitude/latitude
    pub canonical_extent: Extent,
    pub nodata: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRaster {
    pub raster_type: String,
    pub grid: GridMetadata,
    pub checksum: String,
    pub acquired_at: Option<DateTime<Utc>>,
    pub units: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRaster {
    pub id: RasterRef,
    pub site: Option<SiteRef>,
    pub provenance: ProvenanceRef,
    pub raster: NewRaster,
}

/// Lineage for one successful file ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProvenance {
    pub source: String,
    pub checksum: String,
    pub uploader: String,
    pub ingested_at: DateTime<Utc>,
    pub parser_version: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: ProvenanceRef,
    #[serde(flatten)]
    pub record: NewProvenance,
}

/// Row counts per entity table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub sites: usize,
    pub points: usize,
    pub profiles: usize,
    pub rasters: usize,
    pub provenance: usize,
}

/// What happened to a single file in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested {
        family: FileFamily,
        site: Option<SiteRef>,
        point: Option<PointRef>,
        profiles: Vec<ProfileRef>,
        raster: Option<RasterRef>,
        provenance: ProvenanceRef,
    },
    AlreadyIngested {
        provenance: ProvenanceRef,
    },
    Failed {
        kind: ErrorKind,
        detail: String,
        attempts: u32,
    },
    /// Not started because the batch was cancelled
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub source: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Batch summary, file detail kept in input order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub files: Vec<FileReport>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn from_files(files: Vec<FileReport>, elapsed: Duration) -> Self {
        let mut report = BatchReport {
            elapsed,
            ..Default::default()
        };
        for file in &files {
            match file.outcome {
                FileOutcome::Ingested { .. } => report.ingested += 1,
                FileOutcome::AlreadyIngested { .. } => report.skipped += 1,
                FileOutcome::Failed { .. } => report.failed += 1,
                FileOutcome::Cancelled => report.cancelled += 1,
            }
        }
        report.files = files;
        report
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
