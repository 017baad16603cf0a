//! SQL schema for the SQLite store.
//!
//! Executed on every open; every statement is idempotent.

/// Current schema version, written to `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sites (
    site_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    name_key     TEXT NOT NULL UNIQUE,  -- lowercased, whitespace folded
    latitude     REAL,
    longitude    REAL,
    description  TEXT,
    CHECK ((latitude IS NULL) = (longitude IS NULL))
);

CREATE TABLE IF NOT EXISTS points (
    point_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id      INTEGER NOT NULL REFERENCES sites(site_id),
    latitude     REAL NOT NULL,
    longitude    REAL NOT NULL,
    elevation_m  REAL,
    observed_at  TEXT NOT NULL,         -- RFC 3339, UTC
    label        TEXT
);

-- One row per ingested file; never updated.
CREATE TABLE IF NOT EXISTS provenance (
    provenance_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    source         TEXT NOT NULL,
    checksum       TEXT NOT NULL UNIQUE, -- SHA-256, hex
    uploader       TEXT NOT NULL,
    ingested_at    TEXT NOT NULL,
    parser_version TEXT NOT NULL,
    parameters     TEXT NOT NULL         -- JSON object
);

CREATE TABLE IF NOT EXISTS profiles (
    profile_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    point_id         INTEGER NOT NULL REFERENCES points(point_id),
    provenance_id    INTEGER NOT NULL REFERENCES provenance(provenance_id),
    measurement_type TEXT NOT NULL,
    unit             TEXT,
    instrument       TEXT,
    observers        TEXT NOT NULL DEFAULT '[]',
    comments         TEXT,
    measurements     TEXT NOT NULL       -- JSON array, canonical units
);

CREATE TABLE IF NOT EXISTS rasters (
    raster_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id        INTEGER REFERENCES sites(site_id),
    provenance_id  INTEGER NOT NULL REFERENCES provenance(provenance_id),
    raster_type    TEXT NOT NULL,
    checksum       TEXT NOT NULL,
    acquired_at    TEXT,
    units          TEXT,
    description    TEXT,
    grid           TEXT NOT NULL         -- JSON GridMetadata
);

CREATE INDEX IF NOT EXISTS points_site_idx      ON points(site_id);
CREATE INDEX IF NOT EXISTS profiles_point_idx   ON profiles(point_id);
CREATE INDEX IF NOT EXISTS rasters_checksum_idx ON rasters(checksum);

PRAGMA user_version = 1;
";
