//! Tests for header extraction across families

use super::*;
use crate::error::{ErrorKind, SnowexError};
use crate::header::{ColumnRole, FieldSource, HeaderValue, parse_content};
use crate::models::FileFamily;
use std::collections::BTreeMap;

fn parse(content: &str) -> crate::error::Result<crate::header::ParsedFile> {
    parse_content(content.as_bytes(), None, &BTreeMap::new())
}

#[test]
fn test_pit_profile_metadata() {
    let parsed = parse(&pit_profile_csv()).unwrap();

    assert_eq!(parsed.family, FileFamily::CsvProfile);
    assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa"));
    assert_eq!(parsed.metadata.text("site_id"), Some("GM-01"));
    assert_eq!(parsed.metadata.text("pit_id"), Some("COGM1N20_20200201"));
    assert_eq!(parsed.metadata.text("timezone"), Some("MST"));
    assert_eq!(parsed.metadata.number("latitude"), Some((39.05, Some("deg"))));
    assert_eq!(
        parsed.metadata.number("elevation"),
        Some((10000.0, Some("ft")))
    );
    assert_eq!(
        parsed.metadata.value("observers"),
        Some(&HeaderValue::List(vec![
            "Chris Hiemstra".to_string(),
            "Hans Lievens".to_string()
        ]))
    );
    assert_eq!(parsed.metadata.number("aspect"), Some((202.5, Some("deg"))));
    assert_eq!(parsed.metadata.number("slope"), Some((5.0, Some("deg"))));
    assert!(matches!(
        parsed.metadata.value("datetime"),
        Some(HeaderValue::DateTime(_))
    ));
    // Empty values are absent, not empty strings
    assert!(!parsed.metadata.contains("flags"));
}

#[test]
fn test_pit_profile_columns_and_rows() {
    let parsed = parse(&pit_profile_csv()).unwrap();

    let names: Vec<&str> = parsed.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["depth", "bottom_depth", "density", "density", "density"]);
    assert_eq!(parsed.columns[0].role, ColumnRole::DepthTop);
    assert_eq!(parsed.columns[0].unit.as_deref(), Some("cm"));
    assert_eq!(parsed.columns[3].sample, Some('b'));

    assert_eq!(parsed.data_start_line, 14);
    assert_eq!(parsed.rows.len(), 3);
    assert_eq!(parsed.rows[0].line, 14);
    assert_eq!(parsed.rows[0].cells[2], "184.0");
}

#[test]
fn test_stratigraphy_text_columns() {
    let parsed = parse(&stratigraphy_csv()).unwrap();

    let roles: Vec<ColumnRole> = parsed.columns.iter().map(|c| c.role).collect();
    assert_eq!(
        roles,
        vec![
            ColumnRole::DepthTop,
            ColumnRole::DepthBottom,
            ColumnRole::TextMeasurement,
            ColumnRole::TextMeasurement,
            ColumnRole::TextMeasurement,
            ColumnRole::TextMeasurement,
            ColumnRole::Comments,
        ]
    );
    assert_eq!(parsed.metadata.text("utm_zone"), Some("12N"));
    assert_eq!(parsed.metadata.number("easting"), Some((754423.742, None)));
    assert!(matches!(parsed.metadata.value("date"), Some(HeaderValue::Date(_))));
    assert!(matches!(parsed.metadata.value("time"), Some(HeaderValue::Time(_))));
}

#[test]
fn test_missing_fields_all_named() {
    let content = "# Comments, none of the required fields\n\
                   depth (cm), density (kg/m3)\n\
                   95, 250\n";
    match parse(content).unwrap_err() {
        SnowexError::IncompleteHeader { missing } => {
            assert_eq!(missing, vec!["site_name", "latitude", "longitude", "date"]);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_projected_coordinates_satisfy_requirement() {
    let content = "# Site, Grand Mesa\n# Easting, 754423\n# Date, 2020-02-01\n\
                   depth, density\n95, 250\n";
    match parse(content).unwrap_err() {
        SnowexError::IncompleteHeader { missing } => assert_eq!(missing, vec!["northing"]),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_duplicate_key_last_wins() {
    let content = "# Site, Grand Mesa\n# Lat, 39.00\n# Lat, 39.05\n# Lon, -108.06\n\
                   # Date, 2020-02-01\ndepth, density\n95, 250\n";
    let parsed = parse(content).unwrap();
    assert_eq!(
        parsed.metadata.number("latitude").map(|(value, _)| value),
        Some(39.05)
    );
    assert_eq!(
        parsed.metadata.get("latitude").map(|f| f.source),
        Some(FieldSource::Line(3))
    );
}

#[test]
fn test_location_names_site_and_site_line_is_id() {
    let body = "# Lat, 39.05\n# Lon, -108.06\n# Date, 2020-02-01\ndepth, density\n95, 250\n";
    for preamble in [
        "# Location,Grand Mesa\n# Site,1N20\n",
        "# Site,1N20\n# Location,Grand Mesa\n",
    ] {
        let parsed = parse(&format!("{}{}", preamble, body)).unwrap();
        assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa"), "{}", preamble);
        assert_eq!(parsed.metadata.text("site_id"), Some("1N20"), "{}", preamble);
    }

    // A lone Site line still names the site
    let parsed = parse(&format!("# Site,Grand Mesa\n{}", body)).unwrap();
    assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa"));
    assert_eq!(parsed.metadata.text("site_id"), None);
}

#[test]
fn test_unknown_keys_preserved() {
    let content = "# Site, Grand Mesa\n# Lat, 39.05\n# Lon, -108.06\n# Date, 2020-02-01\n\
                   # Snow Pit Shovel, orange\n# Wind Speed (m/s), 4\n\
                   depth, density\n95, 250\n";
    let parsed = parse(content).unwrap();
    assert_eq!(parsed.metadata.text("snow_pit_shovel"), Some("orange"));
    assert_eq!(parsed.metadata.number("wind_speed"), Some((4.0, Some("m/s"))));
}

#[test]
fn test_invalid_header_value_locates_line() {
    let content = "# Site, Grand Mesa\n# Lat, north-ish\n# Lon, -108.06\n# Date, 2020-02-01\n\
                   depth, density\n95, 250\n";
    let err = parse(content).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedData);
    let message = err.to_string();
    assert!(message.contains("latitude"), "{}", message);
    assert!(message.contains("line 2"), "{}", message);
}

#[test]
fn test_invalid_utf8_names_offset() {
    let mut content = b"# Site, Grand Mesa\n# Lat, 39.05\n# Observer, ".to_vec();
    let offset = content.len();
    content.extend_from_slice(&[0xff, 0xfe]);
    content.extend_from_slice(b"\ndepth, density\n");

    match parse_content(&content, None, &BTreeMap::new()).unwrap_err() {
        SnowexError::Encoding { offset: at, line } => {
            assert_eq!(at, offset);
            assert_eq!(line, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_operator_overrides_win_and_fill_gaps() {
    let content = "# Site, Grand Mesa\n# Lat, 39.05\n# Lon, -108.06\n\
                   depth, density\n95, 250\n";
    let mut overrides = BTreeMap::new();
    overrides.insert("date".to_string(), "2020-02-01".to_string());
    overrides.insert("Site".to_string(), "Grand Mesa West".to_string());

    let parsed = parse_content(content.as_bytes(), None, &overrides).unwrap();
    assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa West"));
    assert_eq!(
        parsed.metadata.get("date").map(|f| f.source),
        Some(FieldSource::Override)
    );
    assert_eq!(parsed.overrides_applied.len(), 2);
}

#[test]
fn test_raster_sidecar_metadata() {
    let parsed = parse(&raster_sidecar()).unwrap();
    assert_eq!(parsed.family, FileFamily::RasterSidecar);
    assert_eq!(parsed.metadata.number("ncols").map(|n| n.0), Some(4.0));
    assert_eq!(parsed.metadata.number("epsg").map(|n| n.0), Some(26912.0));
    assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa"));
    assert_eq!(parsed.metadata.text("raster_type"), Some("depth"));
    assert!(parsed.rows.is_empty());
}

#[test]
fn test_raster_sidecar_without_grid_keys_is_rejected() {
    let err = parse_content(
        b"ncols 4\nnrows 3\nxllcorner 1\n",
        Some(FileFamily::RasterSidecar),
        &BTreeMap::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFormat);
}

#[test]
fn test_uavsar_metadata() {
    let parsed = parse(&uavsar_annotation()).unwrap();
    assert_eq!(parsed.family, FileFamily::UavsarAnnotation);
    assert_eq!(parsed.metadata.number("nrows").map(|n| n.0), Some(100.0));
    assert_eq!(
        parsed.metadata.number("grid_spacing_latitude"),
        Some((-0.0001, Some("deg")))
    );
    assert!(matches!(
        parsed.metadata.value("acquisition_start"),
        Some(HeaderValue::DateTime(_))
    ));
    assert_eq!(parsed.metadata.text("site_name"), Some("Grand Mesa, CO"));
}

#[test]
fn test_uavsar_missing_acquisition_time() {
    let content: String = uavsar_annotation()
        .lines()
        .filter(|l| !l.starts_with("Start Time"))
        .map(|l| format!("{}\n", l))
        .collect();
    match parse(&content).unwrap_err() {
        SnowexError::IncompleteHeader { missing } => {
            assert_eq!(missing, vec!["acquisition_start"]);
        }
        other => panic!("unexpected error {:?}", other),
    }
}
