//! Unit registry and conversion to canonical units.
//!
//! Every supported unit is a linear map onto the canonical unit of its
//! dimension: `canonical = value * scale + offset`. The offset only matters
//! for temperatures.

use crate::error::{Result, SnowexError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Length,
    Temperature,
    Density,
    SpecificSurfaceArea,
    Force,
    Time,
    Angle,
    Percent,
    Dimensionless,
}

impl Dimension {
    pub fn canonical_symbol(&self) -> &'static str {
        match self {
            Dimension::Length => "m",
            Dimension::Temperature => "degC",
            Dimension::Density => "kg/m3",
            Dimension::SpecificSurfaceArea => "m2/kg",
            Dimension::Force => "N",
            Dimension::Time => "s",
            Dimension::Angle => "deg",
            Dimension::Percent => "%",
            Dimension::Dimensionless => "unitless",
        }
    }

    pub fn canonical_unit(&self) -> Unit {
        Unit::linear(self.canonical_symbol(), *self, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Unit {
    /// Registry spelling of this unit
    pub symbol: &'static str,
    pub dimension: Dimension,
    scale: f64,
    offset: f64,
}

impl Unit {
    const fn linear(symbol: &'static str, dimension: Dimension, scale: f64) -> Self {
        Self {
            symbol,
            dimension,
            scale,
            offset: 0.0,
        }
    }

    const fn affine(symbol: &'static str, dimension: Dimension, scale: f64, offset: f64) -> Self {
        Self {
            symbol,
            dimension,
            scale,
            offset,
        }
    }

    pub fn to_canonical(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }

    pub fn from_canonical(&self, value: f64) -> f64 {
        (value - self.offset) / self.scale
    }

    pub fn is_canonical(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }

    pub fn canonical_symbol(&self) -> &'static str {
        self.dimension.canonical_symbol()
    }
}

/// Every unit the normalizer accepts, with all accepted spellings
const UNIT_TABLE: &[(Unit, &[&str])] = &[
    // Length
    (Unit::linear("m", Dimension::Length, 1.0), &["m", "meter", "meters", "metre", "metres"]),
    (Unit::linear("cm", Dimension::Length, 0.01), &["cm", "centimeter", "centimeters", "centimetre", "centimetres"]),
    (Unit::linear("mm", Dimension::Length, 0.001), &["mm", "millimeter", "millimeters", "millimetre", "millimetres"]),
    (Unit::linear("km", Dimension::Length, 1000.0), &["km", "kilometer", "kilometers", "kilometre", "kilometres"]),
    (Unit::linear("in", Dimension::Length, 0.0254), &["in", "inch", "inches"]),
    (Unit::linear("ft", Dimension::Length, 0.3048), &["ft", "foot", "feet"]),
    // Temperature
    (Unit::linear("degC", Dimension::Temperature, 1.0), &["c", "degc", "deg c", "°c", "celsius", "deg_c"]),
    (
        Unit::affine("degF", Dimension::Temperature, 5.0 / 9.0, -160.0 / 9.0),
        &["f", "degf", "deg f", "°f", "fahrenheit", "deg_f"],
    ),
    (Unit::affine("K", Dimension::Temperature, 1.0, -273.15), &["k", "kelvin"]),
    // Density
    (Unit::linear("kg/m3", Dimension::Density, 1.0), &["kg/m3", "kg/m^3", "kg m-3", "kgm-3", "kg/m³", "kg/cubic m"]),
    (Unit::linear("g/cm3", Dimension::Density, 1000.0), &["g/cm3", "g/cm^3", "g cm-3", "g/cm³"]),
    // Specific surface area
    (Unit::linear("m2/kg", Dimension::SpecificSurfaceArea, 1.0), &["m2/kg", "m^2/kg", "m2 kg-1", "m²/kg"]),
    (Unit::linear("cm2/g", Dimension::SpecificSurfaceArea, 0.1), &["cm2/g", "cm^2/g", "cm2 g-1", "cm²/g"]),
    // Force
    (Unit::linear("N", Dimension::Force, 1.0), &["n", "newton", "newtons"]),
    (Unit::linear("mN", Dimension::Force, 0.001), &["mn", "millinewton", "millinewtons"]),
    // Time interval
    (Unit::linear("s", Dimension::Time, 1.0), &["s", "sec", "secs", "second", "seconds"]),
    (Unit::linear("ms", Dimension::Time, 1e-3), &["ms", "millisecond", "milliseconds"]),
    (Unit::linear("us", Dimension::Time, 1e-6), &["us", "µs", "microsecond", "microseconds"]),
    (Unit::linear("ns", Dimension::Time, 1e-9), &["ns", "nanosecond", "nanoseconds"]),
    // Angle
    (Unit::linear("deg", Dimension::Angle, 1.0), &["deg", "degree", "degrees", "°", "decimal degrees", "dd"]),
    (Unit::linear("rad", Dimension::Angle, 180.0 / std::f64::consts::PI), &["rad", "radian", "radians"]),
    // Percent and dimensionless
    (Unit::linear("%", Dimension::Percent, 1.0), &["%", "percent", "pct", "% by volume", "vol %"]),
    (Unit::linear("fraction", Dimension::Percent, 100.0), &["fraction", "frac"]),
    (Unit::linear("unitless", Dimension::Dimensionless, 1.0), &["unitless", "dimensionless", "-", "1", "none"]),
];

static UNIT_REGISTRY: LazyLock<HashMap<&'static str, Unit>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (unit, spellings) in UNIT_TABLE {
        for spelling in *spellings {
            map.insert(*spelling, *unit);
        }
    }
    map
});

fn normalize_token(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c| c == '(' || c == ')' || c == '[' || c == ']')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Look up a unit token; `field` is only used to locate the error
pub fn parse_unit(field: &str, token: &str) -> Result<Unit> {
    let key = normalize_token(token);
    UNIT_REGISTRY
        .get(key.as_str())
        .copied()
        .ok_or_else(|| SnowexError::UnsupportedUnit {
            field: field.to_string(),
            unit: token.trim().to_string(),
        })
}

/// Resolve the unit for a value: explicit token, else the field's default
pub fn resolve_unit(
    field: &str,
    token: Option<&str>,
    default: Option<&'static str>,
) -> Result<Option<Unit>> {
    match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => parse_unit(field, token).map(Some),
        None => match default {
            Some(default) => parse_unit(field, default).map(Some),
            None => Ok(None),
        },
    }
}

/// Iterate every supported unit once
pub fn supported_units() -> impl Iterator<Item = &'static Unit> {
    UNIT_TABLE.iter().map(|(unit, _)| unit)
}
