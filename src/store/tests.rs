//! Behaviour both store implementations must share.

use super::*;
use crate::models::{
    Extent, GeoPoint, GridMetadata, Measurement, MeasurementValue, ProfileIndex,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const GM: GeoPoint = GeoPoint {
    latitude: 39.05,
    longitude: -108.06,
};

fn tolerances() -> Tolerances {
    Tolerances::new(500.0, 5.0, 3600.0)
}

fn site_draft(name: &str) -> SiteDraft {
    SiteDraft {
        name: name.to_string(),
        location: Some(GM),
        description: None,
    }
}

fn point_draft(minutes: i64) -> PointDraft {
    PointDraft {
        location: GM,
        elevation_m: Some(3048.0),
        observed_at: Utc.with_ymd_and_hms(2020, 2, 1, 20, 20, 0).unwrap()
            + ChronoDuration::minutes(minutes),
        label: Some("pit 1".to_string()),
    }
}

fn provenance(checksum: &str) -> NewProvenance {
    NewProvenance {
        source: format!("{}.csv", checksum),
        checksum: checksum.to_string(),
        uploader: "tests".to_string(),
        ingested_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        parser_version: crate::constants::PARSER_VERSION.to_string(),
        parameters: json!({"family": "csv-profile", "source_epsg": 4326}),
    }
}

fn density_profile() -> NewProfile {
    NewProfile {
        measurement_type: "density".to_string(),
        unit: Some("kg/m^3".to_string()),
        measurements: vec![
            Measurement {
                index: ProfileIndex::Depth {
                    top_m: 0.95,
                    bottom_m: Some(0.85),
                },
                value: Some(MeasurementValue::Number(210.0)),
            },
            Measurement {
                index: ProfileIndex::Depth {
                    top_m: 0.85,
                    bottom_m: Some(0.75),
                },
                value: None,
            },
        ],
        instrument: Some("cutter".to_string()),
        observers: vec!["A. Observer".to_string(), "B. Observer".to_string()],
        comments: None,
    }
}

fn raster(checksum: &str) -> NewRaster {
    let extent = Extent {
        min_x: -108.2,
        min_y: 39.0,
        max_x: -108.1,
        max_y: 39.1,
    };
    NewRaster {
        raster_type: "insar amplitude".to_string(),
        grid: GridMetadata {
            rows: 10,
            columns: 20,
            bands: 1,
            resolution_x: 0.005,
            resolution_y: 0.01,
            native_epsg: 4326,
            native_extent: extent,
            canonical_extent: extent,
            nodata: Some(-9999.0),
        },
        checksum: checksum.to_string(),
        acquired_at: Some(Utc.with_ymd_and_hms(2020, 2, 1, 18, 46, 22).unwrap()),
        units: Some("dB".to_string()),
        description: None,
    }
}

// ---- store-agnostic checks ----------------------------------------------------

fn check_round_trip<S: Store>(store: &S) {
    let mut tx = store.begin().unwrap();
    let prov = tx.insert_provenance(&provenance("aaa")).unwrap();
    let site = tx.find_or_create_site(&site_draft("Grand Mesa"), &tolerances()).unwrap();
    let point = tx.find_or_create_point(site, &point_draft(0), &tolerances()).unwrap();
    tx.insert_profile(point, &density_profile(), prov).unwrap();
    tx.insert_raster(Some(site), &raster("aaa"), prov).unwrap();
    tx.commit().unwrap();

    let sites = store.sites().unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].name, "Grand Mesa");
    assert_eq!(sites[0].location, Some(GM));

    let points = store.points(site).unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].observed_at, point_draft(0).observed_at);
    assert_eq!(points[0].label.as_deref(), Some("pit 1"));

    let profiles = store.profiles(point).unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].profile, density_profile());
    assert_eq!(profiles[0].provenance, prov);

    let rasters = store.rasters().unwrap();
    assert_eq!(rasters.len(), 1);
    assert_eq!(rasters[0].raster, raster("aaa"));
    assert_eq!(rasters[0].site, Some(site));

    let record = store.find_provenance("aaa").unwrap().unwrap();
    assert_eq!(record.id, prov);
    assert_eq!(record.record, provenance("aaa"));
    assert!(store.find_provenance("bbb").unwrap().is_none());

    assert_eq!(
        store.counts().unwrap(),
        StoreCounts {
            sites: 1,
            points: 1,
            profiles: 1,
            rasters: 1,
            provenance: 1,
        }
    );
}

fn check_drop_discards<S: Store>(store: &S) {
    {
        let mut tx = store.begin().unwrap();
        tx.insert_provenance(&provenance("dropped")).unwrap();
        tx.find_or_create_site(&site_draft("Grand Mesa"), &tolerances()).unwrap();
    }
    assert_eq!(store.counts().unwrap(), StoreCounts::default());

    let mut tx = store.begin().unwrap();
    tx.find_or_create_site(&site_draft("Grand Mesa"), &tolerances()).unwrap();
    tx.rollback().unwrap();
    assert!(store.sites().unwrap().is_empty());
}

fn check_find_or_create_reuses<S: Store>(store: &S) {
    let policy = tolerances();

    let mut tx = store.begin().unwrap();
    let site = tx.find_or_create_site(&site_draft("Grand Mesa"), &policy).unwrap();
    let point = tx.find_or_create_point(site, &point_draft(0), &policy).unwrap();
    tx.commit().unwrap();

    let mut tx = store.begin().unwrap();
    let again = tx.find_or_create_site(&site_draft("grand  mesa"), &policy).unwrap();
    let same_point = tx.find_or_create_point(again, &point_draft(30), &policy).unwrap();
    let later_point = tx.find_or_create_point(again, &point_draft(120), &policy).unwrap();
    tx.commit().unwrap();

    assert_eq!(again, site);
    assert_eq!(same_point, point);
    assert_ne!(later_point, point);
    assert_eq!(store.points(site).unwrap().len(), 2);
}

fn check_description_enrichment<S: Store>(store: &S) {
    let policy = tolerances();

    let mut tx = store.begin().unwrap();
    let site = tx.find_or_create_site(&site_draft("Grand Mesa"), &policy).unwrap();
    tx.commit().unwrap();

    let described = SiteDraft {
        description: Some("Flat open meadow".to_string()),
        ..site_draft("Grand Mesa")
    };
    let mut tx = store.begin().unwrap();
    assert_eq!(tx.find_or_create_site(&described, &policy).unwrap(), site);
    tx.commit().unwrap();

    let sites = store.sites().unwrap();
    assert_eq!(sites[0].description.as_deref(), Some("Flat open meadow"));

    // An existing description is left alone
    let other = SiteDraft {
        description: Some("Something else".to_string()),
        ..site_draft("Grand Mesa")
    };
    let mut tx = store.begin().unwrap();
    tx.find_or_create_site(&other, &policy).unwrap();
    tx.commit().unwrap();
    assert_eq!(
        store.sites().unwrap()[0].description.as_deref(),
        Some("Flat open meadow")
    );
}

fn check_checksum_unique<S: Store>(store: &S) {
    let mut tx = store.begin().unwrap();
    tx.insert_provenance(&provenance("dup")).unwrap();
    tx.commit().unwrap();

    let mut tx = store.begin().unwrap();
    assert!(tx.find_provenance_by_checksum("dup").unwrap().is_some());
    let err = tx.insert_provenance(&provenance("dup")).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceFatalError);
}

fn check_ambiguous_site<S: Store>(store: &S) {
    let policy = Tolerances::new(1_000.0, 5.0, 3600.0);
    let north = GeoPoint::new(GM.latitude + 0.002, GM.longitude);
    let south = GeoPoint::new(GM.latitude - 0.002, GM.longitude);

    let mut tx = store.begin().unwrap();
    tx.insert_site(&SiteDraft {
        location: Some(north),
        ..site_draft("North")
    })
    .unwrap();
    tx.insert_site(&SiteDraft {
        location: Some(south),
        ..site_draft("South")
    })
    .unwrap();
    tx.commit().unwrap();

    let mut tx = store.begin().unwrap();
    let err = tx.find_or_create_site(&site_draft("Middle"), &policy).unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::AmbiguousEntityMatch);
    drop(tx);
    assert_eq!(store.sites().unwrap().len(), 2);
}

fn sqlite() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("snowex.db"), Duration::from_secs(5)).unwrap();
    (dir, store)
}

macro_rules! store_tests {
    ($($name:ident => $check:ident),* $(,)?) => {
        mod memory_store {
            use super::*;
            $(
                #[test]
                fn $name() {
                    $check(&MemoryStore::new());
                }
            )*
        }

        mod sqlite_store {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let (_dir, store) = sqlite();
                    $check(&store);
                }
            )*
        }
    };
}

store_tests! {
    test_round_trip => check_round_trip,
    test_drop_discards => check_drop_discards,
    test_find_or_create_reuses => check_find_or_create_reuses,
    test_description_enrichment => check_description_enrichment,
    test_checksum_unique => check_checksum_unique,
    test_ambiguous_site => check_ambiguous_site,
}
