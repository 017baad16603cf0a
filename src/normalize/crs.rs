//! Coordinate reference system handling.
//!
//! The canonical CRS is WGS84 geographic. Projected input is UTM, either
//! WGS84 (EPSG 326xx/327xx) or NAD83 (EPSG 269xx); the two datums differ by
//! less than a metre and are converted with the same ellipsoid.
//!
//! Conversion uses the Krüger series truncated as in the widely used `utm`
//! libraries.

use crate::constants::{
    CANONICAL_EPSG, EARTH_MEAN_RADIUS_M, UTM_EASTING_RANGE, UTM_NORTHING_RANGE,
};
use crate::error::{Result, SnowexError};
use crate::models::GeoPoint;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

const K0: f64 = 0.9996;
const E: f64 = 0.00669438;
const E2: f64 = E * E;
const E3: f64 = E2 * E;
const E_P2: f64 = E / (1.0 - E);
const R: f64 = 6_378_137.0;

const M1: f64 = 1.0 - E / 4.0 - 3.0 * E2 / 64.0 - 5.0 * E3 / 256.0;
const M2: f64 = 3.0 * E / 8.0 + 3.0 * E2 / 32.0 + 45.0 * E3 / 1024.0;
const M3: f64 = 15.0 * E2 / 256.0 + 45.0 * E3 / 1024.0;
const M4: f64 = 35.0 * E3 / 3072.0;

const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Series coefficients for the footpoint latitude
struct FootpointCoefficients {
    p2: f64,
    p3: f64,
    p4: f64,
    p5: f64,
}

fn footpoint_coefficients() -> FootpointCoefficients {
    let sqrt_e = (1.0 - E).sqrt();
    let e1 = (1.0 - sqrt_e) / (1.0 + sqrt_e);
    let e2 = e1 * e1;
    let e3 = e2 * e1;
    let e4 = e3 * e1;
    let e5 = e4 * e1;
    FootpointCoefficients {
        p2: 3.0 / 2.0 * e1 - 27.0 / 32.0 * e3 + 269.0 / 512.0 * e5,
        p3: 21.0 / 16.0 * e2 - 55.0 / 32.0 * e4,
        p4: 151.0 / 96.0 * e3 - 417.0 / 128.0 * e5,
        p5: 1097.0 / 512.0 * e4,
    }
}

/// A UTM zone with its hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmZone {
    pub number: u8,
    pub northern: bool,
}

impl UtmZone {
    pub fn new(number: u8, northern: bool) -> Result<Self> {
        if !(1..=60).contains(&number) {
            return Err(SnowexError::coordinate(format!(
                "UTM zone {} is outside 1..=60",
                number
            )));
        }
        Ok(Self { number, northern })
    }

    pub fn central_longitude(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// WGS84 UTM EPSG code for this zone
    pub fn epsg(&self) -> u32 {
        let base = if self.northern { 32600 } else { 32700 };
        base + self.number as u32
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, if self.northern { 'N' } else { 'S' })
    }
}

/// Spatial reference a file's coordinates are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceCrs {
    Geographic,
    Utm { zone: UtmZone, epsg: u32 },
}

impl SourceCrs {
    pub fn epsg(&self) -> u32 {
        match self {
            SourceCrs::Geographic => CANONICAL_EPSG,
            SourceCrs::Utm { epsg, .. } => *epsg,
        }
    }

    pub fn utm(zone: UtmZone) -> Self {
        SourceCrs::Utm {
            zone,
            epsg: zone.epsg(),
        }
    }

    /// Convert an (x, y) pair in this CRS to canonical longitude/latitude
    pub fn to_canonical(&self, x: f64, y: f64) -> Result<GeoPoint> {
        match self {
            SourceCrs::Geographic => validate_geographic(y, x),
            SourceCrs::Utm { zone, .. } => utm_to_wgs84(x, y, *zone),
        }
    }
}

impl fmt::Display for SourceCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Interpret a declared EPSG code
pub fn crs_from_epsg(code: u32) -> Result<SourceCrs> {
    let zone = match code {
        4326 => return Ok(SourceCrs::Geographic),
        26901..=26923 => UtmZone::new((code - 26900) as u8, true)?,
        32601..=32660 => UtmZone::new((code - 32600) as u8, true)?,
        32701..=32760 => UtmZone::new((code - 32700) as u8, false)?,
        _ => {
            return Err(SnowexError::coordinate(format!(
                "unsupported EPSG code {} (expected 4326, 269xx, 326xx or 327xx)",
                code
            )));
        }
    };
    Ok(SourceCrs::Utm { zone, epsg: code })
}

/// Parse `12`, `12N`, `12S`, `12 T` or `Zone 12N`
///
/// A trailing letter other than N/S is treated as a latitude band (C..X);
/// bands from N upward are northern.
pub fn parse_utm_zone(text: &str, default_northern: bool) -> Result<UtmZone> {
    let cleaned: String = text
        .trim()
        .to_uppercase()
        .trim_start_matches("ZONE")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let digits: String = cleaned.chars().take_while(|c| c.is_ascii_digit()).collect();
    let suffix = &cleaned[digits.len()..];

    let number: u8 = digits
        .parse()
        .map_err(|_| SnowexError::coordinate(format!("invalid UTM zone '{}'", text.trim())))?;

    let northern = match suffix {
        "" => default_northern,
        "N" => true,
        "S" => false,
        band if band.len() == 1 => {
            let letter = band.chars().next().unwrap_or('N');
            if !('C'..='X').contains(&letter) || letter == 'I' || letter == 'O' {
                return Err(SnowexError::coordinate(format!(
                    "invalid UTM zone '{}'",
                    text.trim()
                )));
            }
            letter >= 'N'
        }
        _ => {
            return Err(SnowexError::coordinate(format!(
                "invalid UTM zone '{}'",
                text.trim()
            )));
        }
    };

    UtmZone::new(number, northern)
}

/// Shape of a coordinate pair judged from magnitudes alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateShape {
    Geographic,
    Projected,
}

/// Infer whether a (first, second) pair is lat/lon or easting/northing
pub fn infer_shape(first: f64, second: f64) -> Option<CoordinateShape> {
    if first.abs() <= 90.0 && second.abs() <= 180.0 {
        return Some(CoordinateShape::Geographic);
    }
    let (e_min, e_max) = UTM_EASTING_RANGE;
    let (n_min, n_max) = UTM_NORTHING_RANGE;
    if (e_min..=e_max).contains(&first) && (n_min..=n_max).contains(&second) {
        return Some(CoordinateShape::Projected);
    }
    None
}

pub fn validate_geographic(latitude: f64, longitude: f64) -> Result<GeoPoint> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(SnowexError::coordinate(format!(
            "latitude {} is outside -90..=90",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(SnowexError::coordinate(format!(
            "longitude {} is outside -180..=180",
            longitude
        )));
    }
    Ok(GeoPoint::new(latitude, longitude))
}

fn mod_angle(value: f64) -> f64 {
    (value + PI).rem_euclid(2.0 * PI) - PI
}

/// UTM zone containing a location, including the Norway and Svalbard exceptions
pub fn zone_number_for(latitude: f64, longitude: f64) -> u8 {
    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }
    if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 {
        if longitude < 9.0 {
            return 31;
        } else if longitude < 21.0 {
            return 33;
        } else if longitude < 33.0 {
            return 35;
        } else if longitude < 42.0 {
            return 37;
        }
    }
    if longitude >= 180.0 {
        return 60;
    }
    (((longitude + 180.0) / 6.0).floor() as i64).rem_euclid(60) as u8 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone: UtmZone,
}

/// Project WGS84 latitude/longitude to UTM, optionally forcing the zone
pub fn wgs84_to_utm(latitude: f64, longitude: f64, force_zone: Option<u8>) -> Result<UtmCoordinate> {
    if !(-80.0..=84.0).contains(&latitude) {
        return Err(SnowexError::coordinate(format!(
            "latitude {} is outside the UTM range -80..=84",
            latitude
        )));
    }
    validate_geographic(latitude, longitude)?;

    let number = match force_zone {
        Some(number) => number,
        None => zone_number_for(latitude, longitude),
    };
    let zone = UtmZone::new(number, latitude >= 0.0)?;

    let lat_rad = latitude.to_radians();
    let lat_sin = lat_rad.sin();
    let lat_cos = lat_rad.cos();
    let lat_tan = lat_sin / lat_cos;
    let lat_tan2 = lat_tan * lat_tan;
    let lat_tan4 = lat_tan2 * lat_tan2;

    let central_lon_rad = zone.central_longitude().to_radians();

    let n = R / (1.0 - E * lat_sin * lat_sin).sqrt();
    let c = E_P2 * lat_cos * lat_cos;

    let a = lat_cos * mod_angle(longitude.to_radians() - central_lon_rad);
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = R
        * (M1 * lat_rad - M2 * (2.0 * lat_rad).sin() + M3 * (4.0 * lat_rad).sin()
            - M4 * (6.0 * lat_rad).sin());

    let easting = K0
        * n
        * (a + a3 / 6.0 * (1.0 - lat_tan2 + c)
            + a5 / 120.0 * (5.0 - 18.0 * lat_tan2 + lat_tan4 + 72.0 * c - 58.0 * E_P2))
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * lat_tan
            * (a2 / 2.0
                + a4 / 24.0 * (5.0 - lat_tan2 + 9.0 * c + 4.0 * c * c)
                + a6 / 720.0 * (61.0 - 58.0 * lat_tan2 + lat_tan4 + 600.0 * c - 330.0 * E_P2)));

    if latitude < 0.0 {
        northing += FALSE_NORTHING_SOUTH;
    }

    Ok(UtmCoordinate {
        easting,
        northing,
        zone,
    })
}

/// Inverse projection from UTM to WGS84 latitude/longitude
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: UtmZone) -> Result<GeoPoint> {
    if !easting.is_finite() || !(100_000.0..1_000_000.0).contains(&easting) {
        return Err(SnowexError::coordinate(format!(
            "easting {} is outside 100000..1000000",
            easting
        )));
    }
    if !northing.is_finite() || !(0.0..=10_000_000.0).contains(&northing) {
        return Err(SnowexError::coordinate(format!(
            "northing {} is outside 0..=10000000",
            northing
        )));
    }

    let fp = footpoint_coefficients();

    let x = easting - FALSE_EASTING;
    let y = if zone.northern {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let m = y / K0;
    let mu = m / (R * M1);

    let p_rad = mu
        + fp.p2 * (2.0 * mu).sin()
        + fp.p3 * (4.0 * mu).sin()
        + fp.p4 * (6.0 * mu).sin()
        + fp.p5 * (8.0 * mu).sin();

    let p_sin = p_rad.sin();
    let p_cos = p_rad.cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - E * p_sin * p_sin;
    let n = R / ep_sin.sqrt();
    let r = (1.0 - E) / ep_sin;

    let c = E_P2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * K0);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * E_P2)
                + d6 / 720.0
                    * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4 - 252.0 * E_P2 - 3.0 * c2));

    let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
        + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * E_P2 + 24.0 * p_tan4))
        / p_cos;
    let longitude = mod_angle(longitude + zone.central_longitude().to_radians());

    validate_geographic(latitude.to_degrees(), longitude.to_degrees())
}

/// Great-circle distance in metres
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reference_vector() {
        let utm = wgs84_to_utm(39.039, -108.003, None).unwrap();
        assert_eq!(utm.zone, UtmZone::new(12, true).unwrap());
        assert!((utm.easting - 759_397.644).abs() < 1e-3, "{}", utm.easting);
        assert!((utm.northing - 4_325_379.675).abs() < 1e-3, "{}", utm.northing);
    }

    #[test]
    fn test_inverse_reference_vector() {
        let zone = UtmZone::new(12, true).unwrap();
        let point = utm_to_wgs84(759_397.644, 4_325_379.675, zone).unwrap();
        assert!((point.latitude - 39.039).abs() < 1e-7);
        assert!((point.longitude + 108.003).abs() < 1e-7);
    }

    #[test]
    fn test_round_trip_southern_hemisphere() {
        let utm = wgs84_to_utm(-33.9, 151.2, None).unwrap();
        assert_eq!(utm.zone.number, 56);
        assert!(!utm.zone.northern);
        let back = utm_to_wgs84(utm.easting, utm.northing, utm.zone).unwrap();
        assert!((back.latitude + 33.9).abs() < 1e-7);
        assert!((back.longitude - 151.2).abs() < 1e-7);
    }

    #[test]
    fn test_forced_zone_round_trip() {
        let utm = wgs84_to_utm(39.05, -108.06, Some(13)).unwrap();
        assert_eq!(utm.zone.number, 13);
        let back = utm_to_wgs84(utm.easting, utm.northing, utm.zone).unwrap();
        assert!((back.latitude - 39.05).abs() < 1e-7);
        assert!((back.longitude + 108.06).abs() < 1e-7);
    }

    #[test]
    fn test_zone_exceptions() {
        assert_eq!(zone_number_for(60.0, 5.0), 32);
        assert_eq!(zone_number_for(75.0, 10.0), 33);
        assert_eq!(zone_number_for(39.0, -108.0), 12);
        assert_eq!(zone_number_for(0.0, 180.0), 60);
        assert_eq!(zone_number_for(0.0, -180.0), 1);
    }

    #[test]
    fn test_epsg_codes() {
        assert_eq!(crs_from_epsg(4326).unwrap(), SourceCrs::Geographic);
        match crs_from_epsg(26912).unwrap() {
            SourceCrs::Utm { zone, epsg } => {
                assert_eq!(zone.number, 12);
                assert!(zone.northern);
                assert_eq!(epsg, 26912);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(crs_from_epsg(32713).unwrap().epsg(), 32713);
        assert!(crs_from_epsg(3857).is_err());
    }

    #[test]
    fn test_parse_zone_forms() {
        assert_eq!(parse_utm_zone("12", true).unwrap(), UtmZone::new(12, true).unwrap());
        assert_eq!(parse_utm_zone("12N", false).unwrap(), UtmZone::new(12, true).unwrap());
        assert_eq!(parse_utm_zone("12s", true).unwrap(), UtmZone::new(12, false).unwrap());
        assert_eq!(parse_utm_zone("Zone 13", true).unwrap().number, 13);
        assert_eq!(parse_utm_zone("12 T", false).unwrap(), UtmZone::new(12, true).unwrap());
        assert!(parse_utm_zone("61", true).is_err());
        assert!(parse_utm_zone("0", true).is_err());
        assert!(parse_utm_zone("twelve", true).is_err());
    }

    #[test]
    fn test_out_of_range_fails() {
        let zone = UtmZone::new(12, true).unwrap();
        assert!(utm_to_wgs84(50_000.0, 4_325_379.0, zone).is_err());
        assert!(utm_to_wgs84(759_397.0, -5.0, zone).is_err());
        assert!(wgs84_to_utm(85.0, 10.0, None).is_err());
        assert!(validate_geographic(91.0, 0.0).is_err());
    }

    #[test]
    fn test_infer_shape() {
        assert_eq!(infer_shape(39.05, -108.06), Some(CoordinateShape::Geographic));
        assert_eq!(infer_shape(754_423.7, 4_326_439.5), Some(CoordinateShape::Projected));
        assert_eq!(infer_shape(50_000.0, 1e8), None);
    }

    #[test]
    fn test_haversine() {
        let a = GeoPoint::new(39.05, -108.06);
        assert_eq!(haversine_m(a, a), 0.0);
        // One degree of latitude on the mean sphere
        let b = GeoPoint::new(40.05, -108.06);
        let expected = EARTH_MEAN_RADIUS_M * PI / 180.0;
        assert!((haversine_m(a, b) - expected).abs() < 1e-6);
    }
}
