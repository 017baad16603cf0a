//! Tests for family detection and hint validation

use super::*;
use crate::error::ErrorKind;
use crate::header::family::{Signature, detect_family, matches_family};
use crate::header::parse_content;
use crate::models::FileFamily;
use std::collections::BTreeMap;

#[test]
fn test_detects_each_family() {
    assert_eq!(detect_family(&pit_profile_csv()).unwrap(), FileFamily::CsvProfile);
    assert_eq!(detect_family(&stratigraphy_csv()).unwrap(), FileFamily::CsvProfile);
    assert_eq!(detect_family(&raster_sidecar()).unwrap(), FileFamily::RasterSidecar);
    assert_eq!(
        detect_family(&uavsar_annotation()).unwrap(),
        FileFamily::UavsarAnnotation
    );
}

#[test]
fn test_unknown_format_when_nothing_matches() {
    let err = detect_family("hello world\nthis is not data\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFormat);
}

#[test]
fn test_clock_time_alone_is_not_a_column_header() {
    use crate::header::csv_profile::column_header_tokens;

    assert!(column_header_tokens("time, density (kg/m3)").is_none());
    assert!(column_header_tokens("date, time, density (kg/m3)").is_some());
    assert!(column_header_tokens("# top (cm), density").is_some());

    let content = "# Site, Grand Mesa\n# Lat, 39.05\n# Lon, -108.06\n# Date, 2020-02-01\n\
                   time, density\n12:00, 250\n";
    let err = parse_content(content.as_bytes(), None, &BTreeMap::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFormat);
}

#[test]
fn test_hint_must_match_structure() {
    assert!(matches_family(&raster_sidecar(), FileFamily::RasterSidecar));
    assert!(!matches_family(&raster_sidecar(), FileFamily::CsvProfile));

    let err = parse_content(
        pit_profile_csv().as_bytes(),
        Some(FileFamily::UavsarAnnotation),
        &BTreeMap::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFormat);
}

#[test]
fn test_signature_counts() {
    let signature = Signature::scan(&uavsar_annotation());
    assert!(signature.annotation_lines >= 8);
    assert!(signature.ground_range_keys >= 6);
    assert!(signature.column_header.is_none());

    let signature = Signature::scan(&pit_profile_csv());
    assert_eq!(signature.column_header, Some(12));
}
