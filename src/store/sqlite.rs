//! SQLite-backed store.
//!
//! Each transaction opens its own connection and starts with
//! `BEGIN IMMEDIATE`, so writers from concurrent workers queue on the
//! database lock (bounded by the busy timeout) rather than interleaving.
//! Timestamps are RFC 3339 text; measurement series, grids and provenance
//! parameters are JSON text.

use super::schema::SCHEMA;
use super::{Store, Transaction};
use crate::error::{Result, SnowexError};
use crate::models::{
    GeoPoint, NewProfile, NewProvenance, NewRaster, Point, PointDraft, PointRef, ProfileRef,
    ProvenanceRecord, ProvenanceRef, RasterRef, Site, SiteDraft, SiteRef, StoreCounts,
    StoredProfile, StoredRaster,
};
use crate::resolver::site_key;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SnowexError::io(parent, e))?;
        }

        let store = Self { path, busy_timeout };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened SQLite store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

pub struct SqliteTx {
    conn: Connection,
    finished: bool,
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Rollback on drop failed: {}", e);
            }
        }
    }
}

impl Transaction for SqliteTx {
    fn sites(&mut self) -> Result<Vec<Site>> {
        query_sites(&self.conn)
    }

    fn insert_site(&mut self, draft: &SiteDraft) -> Result<SiteRef> {
        self.conn.execute(
            "INSERT INTO sites (name, name_key, latitude, longitude, description)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                draft.name.trim(),
                site_key(&draft.name),
                draft.location.map(|l| l.latitude),
                draft.location.map(|l| l.longitude),
                draft.description,
            ],
        )?;
        Ok(SiteRef(self.conn.last_insert_rowid()))
    }

    fn set_site_description(&mut self, site: SiteRef, description: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sites SET description = ?1 WHERE site_id = ?2",
            params![description, site.0],
        )?;
        if changed == 0 {
            return Err(SnowexError::fatal(format!("no site {}", site)));
        }
        Ok(())
    }

    fn points_in_site(&mut self, site: SiteRef) -> Result<Vec<Point>> {
        query_points(&self.conn, site)
    }

    fn insert_point(&mut self, site: SiteRef, draft: &PointDraft) -> Result<PointRef> {
        self.conn.execute(
            "INSERT INTO points (site_id, latitude, longitude, elevation_m, observed_at, label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                site.0,
                draft.location.latitude,
                draft.location.longitude,
                draft.elevation_m,
                draft.observed_at.to_rfc3339(),
                draft.label,
            ],
        )?;
        Ok(PointRef(self.conn.last_insert_rowid()))
    }

    fn insert_profile(
        &mut self,
        point: PointRef,
        profile: &NewProfile,
        provenance: ProvenanceRef,
    ) -> Result<ProfileRef> {
        self.conn.execute(
            "INSERT INTO profiles (point_id, provenance_id, measurement_type, unit,
                                   instrument, observers, comments, measurements)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                point.0,
                provenance.0,
                profile.measurement_type,
                profile.unit,
                profile.instrument,
                encode_json("observers", &profile.observers)?,
                profile.comments,
                encode_json("measurements", &profile.measurements)?,
            ],
        )?;
        Ok(ProfileRef(self.conn.last_insert_rowid()))
    }

    fn insert_raster(
        &mut self,
        site: Option<SiteRef>,
        raster: &NewRaster,
        provenance: ProvenanceRef,
    ) -> Result<RasterRef> {
        self.conn.execute(
            "INSERT INTO rasters (site_id, provenance_id, raster_type, checksum,
                                  acquired_at, units, description, grid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                site.map(|s| s.0),
                provenance.0,
                raster.raster_type,
                raster.checksum,
                raster.acquired_at.map(|t| t.to_rfc3339()),
                raster.units,
                raster.description,
                encode_json("grid", &raster.grid)?,
            ],
        )?;
        Ok(RasterRef(self.conn.last_insert_rowid()))
    }

    fn find_provenance_by_checksum(&mut self, checksum: &str) -> Result<Option<ProvenanceRef>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT provenance_id FROM provenance WHERE checksum = ?1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(ProvenanceRef))
    }

    fn insert_provenance(&mut self, record: &NewProvenance) -> Result<ProvenanceRef> {
        self.conn.execute(
            "INSERT INTO provenance (source, checksum, uploader, ingested_at,
                                     parser_version, parameters)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.source,
                record.checksum,
                record.uploader,
                record.ingested_at.to_rfc3339(),
                record.parser_version,
                encode_json("parameters", &record.parameters)?,
            ],
        )?;
        Ok(ProvenanceRef(self.conn.last_insert_rowid()))
    }

    fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx;

    fn begin(&self) -> Result<SqliteTx> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTx {
            conn,
            finished: false,
        })
    }

    fn describe(&self) -> String {
        format!("SQLite store at {}", self.path.display())
    }

    fn sites(&self) -> Result<Vec<Site>> {
        query_sites(&self.connect()?)
    }

    fn points(&self, site: SiteRef) -> Result<Vec<Point>> {
        query_points(&self.connect()?, site)
    }

    fn profiles(&self, point: PointRef) -> Result<Vec<StoredProfile>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT profile_id, point_id, provenance_id, measurement_type, unit,
                    instrument, observers, comments, measurements
             FROM profiles WHERE point_id = ?1 ORDER BY profile_id",
        )?;
        let rows = stmt.query_map(params![point.0], |row| {
            Ok(StoredProfile {
                id: ProfileRef(row.get(0)?),
                point: PointRef(row.get(1)?),
                provenance: ProvenanceRef(row.get(2)?),
                profile: NewProfile {
                    measurement_type: row.get(3)?,
                    unit: row.get(4)?,
                    instrument: row.get(5)?,
                    observers: json_column(row, 6)?,
                    comments: row.get(7)?,
                    measurements: json_column(row, 8)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn rasters(&self) -> Result<Vec<StoredRaster>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT raster_id, site_id, provenance_id, raster_type, checksum,
                    acquired_at, units, description, grid
             FROM rasters ORDER BY raster_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredRaster {
                id: RasterRef(row.get(0)?),
                site: row.get::<_, Option<i64>>(1)?.map(SiteRef),
                provenance: ProvenanceRef(row.get(2)?),
                raster: NewRaster {
                    raster_type: row.get(3)?,
                    checksum: row.get(4)?,
                    acquired_at: optional_time_column(row, 5)?,
                    units: row.get(6)?,
                    description: row.get(7)?,
                    grid: json_column(row, 8)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn find_provenance(&self, checksum: &str) -> Result<Option<ProvenanceRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT provenance_id, source, checksum, uploader, ingested_at,
                        parser_version, parameters
                 FROM provenance WHERE checksum = ?1",
                params![checksum],
                |row| {
                    Ok(ProvenanceRecord {
                        id: ProvenanceRef(row.get(0)?),
                        record: NewProvenance {
                            source: row.get(1)?,
                            checksum: row.get(2)?,
                            uploader: row.get(3)?,
                            ingested_at: time_column(row, 4)?,
                            parser_version: row.get(5)?,
                            parameters: json_column(row, 6)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn counts(&self) -> Result<StoreCounts> {
        let conn = self.connect()?;
        let counts = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM sites),
                    (SELECT COUNT(*) FROM points),
                    (SELECT COUNT(*) FROM profiles),
                    (SELECT COUNT(*) FROM rasters),
                    (SELECT COUNT(*) FROM provenance)",
            [],
            |row| {
                Ok(StoreCounts {
                    sites: row.get::<_, i64>(0)? as usize,
                    points: row.get::<_, i64>(1)? as usize,
                    profiles: row.get::<_, i64>(2)? as usize,
                    rasters: row.get::<_, i64>(3)? as usize,
                    provenance: row.get::<_, i64>(4)? as usize,
                })
            },
        )?;
        Ok(counts)
    }
}

// ---- shared queries ---------------------------------------------------------

fn query_sites(conn: &Connection) -> Result<Vec<Site>> {
    let mut stmt = conn.prepare(
        "SELECT site_id, name, latitude, longitude, description
         FROM sites ORDER BY site_id",
    )?;
    let rows = stmt.query_map([], |row| {
        let latitude: Option<f64> = row.get(2)?;
        let longitude: Option<f64> = row.get(3)?;
        Ok(Site {
            id: SiteRef(row.get(0)?),
            name: row.get(1)?,
            location: latitude
                .zip(longitude)
                .map(|(lat, lon)| GeoPoint::new(lat, lon)),
            description: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn query_points(conn: &Connection, site: SiteRef) -> Result<Vec<Point>> {
    let mut stmt = conn.prepare(
        "SELECT point_id, site_id, latitude, longitude, elevation_m, observed_at, label
         FROM points WHERE site_id = ?1 ORDER BY point_id",
    )?;
    let rows = stmt.query_map(params![site.0], |row| {
        Ok(Point {
            id: PointRef(row.get(0)?),
            site: SiteRef(row.get(1)?),
            location: GeoPoint::new(row.get(2)?, row.get(3)?),
            elevation_m: row.get(4)?,
            observed_at: time_column(row, 5)?,
            label: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---- column codecs ----------------------------------------------------------

fn encode_json<T: Serialize + ?Sized>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| SnowexError::fatal(format!("cannot encode {}: {}", column, e)))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_time(idx, &text)
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_time(idx, &t)).transpose()
}
