//! Fixtures shared by the header parser tests

mod family_tests;
mod parser_tests;

/// Snow pit density profile with a typical field-sheet preamble
pub fn pit_profile_csv() -> String {
    r#"# Location,Grand Mesa
# Site ID,GM-01
# PitID,COGM1N20_20200201
# Date/Time,2020-02-01T13:20
# TimeZone,MST
# Lat (deg),39.05
# Long (deg),-108.06
# Elevation (ft),10000
# Operator,Chris Hiemstra; Hans Lievens
# Aspect,S/SW
# Slope,5°
# Flags,
# top (cm),bottom (cm),density_a (kg/m3),density_b (kg/m3),density_c (kg/m3)
95.0,85.0,184.0,190.0,-9999
85.0,75.0,200.0,210.0,220.0
75.0,65.0,NaN,,
"#
    .to_string()
}

/// Stratigraphy profile with text-valued columns and UTM coordinates
pub fn stratigraphy_csv() -> String {
    r#"# Location,Grand Mesa
# Date,02/01/2020
# Time,13:20
# UTM Zone,12N
# Easting,754423.742
# Northing,4326439.534
# Comments,wind crust near the surface
# top (cm),bottom (cm),grain_size,grain_type,hand_hardness,manual_wetness,comments
95,85,< 1 mm,DF,F,D,
85,60,1-2 mm,FC,4F,D,faceted
"#
    .to_string()
}

pub fn raster_sidecar() -> String {
    "ncols         4\n\
     nrows         3\n\
     xllcorner     743000.0\n\
     yllcorner     4321000.0\n\
     cellsize      3.0\n\
     NODATA_value  -9999\n\
     # site: Grand Mesa\n\
     # epsg: 26912\n\
     # type: depth\n\
     # units: m\n\
     # date: 2020-02-01\n"
        .to_string()
}

pub fn uavsar_annotation() -> String {
    "; UAVSAR annotation file\n\
     Site Description                           (&)    = Grand Mesa, CO ; site\n\
     Start Time of Acquisition for Pass 1       (&)    = 01-FEB-2020 18:46:22 UTC\n\
     Stop Time of Acquisition for Pass 1        (&)    = 01-FEB-2020 18:51:10 UTC\n\
     Ground Range Data Latitude Lines           (-)    = 100 ; rows\n\
     Ground Range Data Longitude Samples        (-)    = 200 ; columns\n\
     Ground Range Data Starting Latitude        (deg)  = 39.2 ; top edge\n\
     Ground Range Data Starting Longitude       (deg)  = -108.3 ; left edge\n\
     Ground Range Data Latitude Spacing         (deg)  = -0.0001\n\
     Ground Range Data Longitude Spacing        (deg)  = 0.0001\n"
        .to_string()
}
