//! Typed header values and the canonicalizers that produce them.

use crate::normalize::time::{self as timeparse, LocalDateTime};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

/// Coerces a raw header value; the second argument is the unit declared on the key
pub type Canonicalizer = fn(&str, Option<&str>) -> Result<HeaderValue, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    /// Number with the unit from the key or trailing the value
    Number { value: f64, unit: Option<String> },
    /// Decimal degrees with hemisphere already applied
    Coordinate(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(LocalDateTime),
    List(Vec<String>),
}

impl HeaderValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<(f64, Option<&str>)> {
        match self {
            HeaderValue::Number { value, unit } => Some((*value, unit.as_deref())),
            HeaderValue::Coordinate(value) => Some((*value, None)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            HeaderValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Human readable rendering, used in logs and provenance
    pub fn render(&self) -> String {
        match self {
            HeaderValue::Text(s) => s.clone(),
            HeaderValue::Number { value, unit: Some(u) } => format!("{} {}", value, u),
            HeaderValue::Number { value, unit: None } => value.to_string(),
            HeaderValue::Coordinate(value) => value.to_string(),
            HeaderValue::Date(d) => d.to_string(),
            HeaderValue::Time(t) => t.to_string(),
            HeaderValue::DateTime(dt) => match dt.offset {
                Some(offset) => format!("{} {}", dt.naive, offset),
                None => dt.naive.to_string(),
            },
            HeaderValue::List(items) => items.join(", "),
        }
    }
}

static NUMBER_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*(.*)$")
        .expect("number pattern is valid")
});

static DMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([-+]?\d+(?:\.\d+)?)\s*°\s*(?:(\d+(?:\.\d+)?)\s*['′]\s*)?(?:(\d+(?:\.\d+)?)\s*(?:"|″|''))?\s*([NSEWnsew])?$"#)
        .expect("dms pattern is valid")
});

fn clean(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

pub fn text(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw).split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(HeaderValue::Text(cleaned))
}

pub fn number(raw: &str, key_unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);
    let caps = NUMBER_WITH_UNIT
        .captures(cleaned)
        .ok_or_else(|| "not a number".to_string())?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| "not a number".to_string())?;
    let trailing = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty());
    let unit = trailing.or(key_unit).map(str::to_string);
    Ok(HeaderValue::Number { value, unit })
}

/// Non-negative integer such as a grid dimension
pub fn count(raw: &str, key_unit: Option<&str>) -> Result<HeaderValue, String> {
    match number(raw, key_unit)? {
        HeaderValue::Number { value, unit } if value >= 0.0 && value.fract() == 0.0 => {
            Ok(HeaderValue::Number { value, unit })
        }
        _ => Err("expected a whole non-negative number".to_string()),
    }
}

pub fn epsg(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);
    let digits = cleaned
        .strip_prefix("EPSG:")
        .or_else(|| cleaned.strip_prefix("epsg:"))
        .unwrap_or(cleaned)
        .trim();
    digits
        .parse::<u32>()
        .map(|code| HeaderValue::Number {
            value: code as f64,
            unit: None,
        })
        .map_err(|_| "expected an EPSG code".to_string())
}

/// Latitude or longitude: decimal, decimal with hemisphere, or degrees-minutes-seconds
pub fn coordinate(raw: &str, key_unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);

    if let Some(caps) = DMS.captures(cleaned) {
        let degrees: f64 = caps[1].parse().map_err(|_| "invalid degrees".to_string())?;
        let minutes: f64 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0.0))
            .unwrap_or(0.0);
        let seconds: f64 = caps
            .get(3)
            .map(|m| m.as_str().parse().unwrap_or(0.0))
            .unwrap_or(0.0);
        if minutes >= 60.0 || seconds >= 60.0 {
            return Err("minutes and seconds must be below 60".to_string());
        }
        let magnitude = degrees.abs() + minutes / 60.0 + seconds / 3600.0;
        let negative = degrees < 0.0
            || caps
                .get(4)
                .is_some_and(|h| matches!(h.as_str(), "S" | "s" | "W" | "w"));
        return Ok(HeaderValue::Coordinate(if negative { -magnitude } else { magnitude }));
    }

    // Decimal with a hemisphere letter: "108.06 W"
    if let Some((body, hemisphere)) = cleaned.rsplit_once(char::is_whitespace) {
        if matches!(hemisphere, "N" | "S" | "E" | "W" | "n" | "s" | "e" | "w") {
            let value: f64 = body
                .trim()
                .parse()
                .map_err(|_| "not a coordinate".to_string())?;
            let negative = matches!(hemisphere, "S" | "s" | "W" | "w");
            return Ok(HeaderValue::Coordinate(if negative {
                -value.abs()
            } else {
                value.abs()
            }));
        }
    }

    number(cleaned, key_unit)
}

/// Slope-style angle; strips degree symbols
pub fn angle(raw: &str, key_unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw).replace('°', "");
    let unit = key_unit.or(Some("deg"));
    number(cleaned.trim(), unit)
}

const CARDINAL_POINTS: &[&str] = &[
    "n", "nne", "ne", "ene", "e", "ese", "se", "sse", "s", "ssw", "sw", "wsw", "w", "wnw", "nw",
    "nnw",
];

/// Aspect as degrees from north, or a cardinal direction (`N`, `S/SW`, `West`)
pub fn aspect(raw: &str, key_unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);
    if let Ok(value) = angle(cleaned, key_unit) {
        return Ok(value);
    }

    let folded = cleaned
        .to_lowercase()
        .replace("north", "n")
        .replace("south", "s")
        .replace("east", "e")
        .replace("west", "w")
        .replace(['/', '-', ' '], "");

    CARDINAL_POINTS
        .iter()
        .position(|p| *p == folded)
        .map(|i| HeaderValue::Number {
            value: i as f64 * 22.5,
            unit: Some("deg".to_string()),
        })
        .ok_or_else(|| "expected degrees or a cardinal direction".to_string())
}

pub fn date(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);
    if let Some(d) = timeparse::parse_date(cleaned) {
        return Ok(HeaderValue::Date(d));
    }
    // Some sheets put the full timestamp in the date field
    timeparse::parse_datetime(cleaned)
        .map(HeaderValue::DateTime)
        .ok_or_else(|| "unrecognized date".to_string())
}

pub fn time(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    let cleaned = clean(raw);
    if let Some(t) = timeparse::parse_time(cleaned) {
        return Ok(HeaderValue::Time(t));
    }
    // "10:00 MST": keep the zone by promoting to text the normalizer can split
    if let Some((body, zone)) = cleaned.rsplit_once(char::is_whitespace) {
        if timeparse::parse_time(body).is_some() && timeparse::parse_timezone(zone).is_some() {
            return Ok(HeaderValue::Text(cleaned.to_string()));
        }
    }
    Err("unrecognized time".to_string())
}

pub fn datetime(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    timeparse::parse_datetime(clean(raw))
        .map(HeaderValue::DateTime)
        .ok_or_else(|| "unrecognized date/time".to_string())
}

/// Comma, semicolon or `&` separated names
pub fn list(raw: &str, _unit: Option<&str>) -> Result<HeaderValue, String> {
    let items: Vec<String> = clean(raw)
        .split([',', ';', '&'])
        .flat_map(|part| part.split(" and "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Ok(HeaderValue::List(items))
}

/// Best-effort coercion for keys not in the registry
pub fn untyped(raw: &str, key_unit: Option<&str>) -> HeaderValue {
    let cleaned = clean(raw);
    match cleaned.parse::<f64>() {
        Ok(value) => HeaderValue::Number {
            value,
            unit: key_unit.map(str::to_string),
        },
        Err(_) => HeaderValue::Text(cleaned.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_keeps_units() {
        assert_eq!(
            number("3048 m", None).unwrap(),
            HeaderValue::Number {
                value: 3048.0,
                unit: Some("m".to_string())
            }
        );
        assert_eq!(
            number("10000", Some("ft")).unwrap(),
            HeaderValue::Number {
                value: 10000.0,
                unit: Some("ft".to_string())
            }
        );
        assert!(number("tall", None).is_err());
    }

    #[test]
    fn test_coordinate_forms() {
        assert_eq!(coordinate("39.05", None).unwrap().as_number().unwrap().0, 39.05);
        assert_eq!(
            coordinate("108.06 W", None).unwrap(),
            HeaderValue::Coordinate(-108.06)
        );
        match coordinate("39°03'00\"N", None).unwrap() {
            HeaderValue::Coordinate(v) => assert!((v - 39.05).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        match coordinate("108° 3' 36\" W", None).unwrap() {
            HeaderValue::Coordinate(v) => assert!((v + 108.06).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cardinal_aspect() {
        let deg = |raw: &str| aspect(raw, None).unwrap().as_number().unwrap().0;
        assert_eq!(deg("N"), 0.0);
        assert_eq!(deg("S"), 180.0);
        assert_eq!(deg("S/SW"), 202.5);
        assert_eq!(deg("West"), 270.0);
        assert_eq!(deg("NE"), 45.0);
        assert_eq!(deg("225°"), 225.0);
        assert!(aspect("uphill", None).is_err());
    }

    #[test]
    fn test_slope_strips_degree_symbol() {
        assert_eq!(
            angle("25°", None).unwrap(),
            HeaderValue::Number {
                value: 25.0,
                unit: Some("deg".to_string())
            }
        );
    }

    #[test]
    fn test_observer_lists() {
        assert_eq!(
            list("Chris Hiemstra, Hans Lievens; Ella Moss & Tom Bradley", None).unwrap(),
            HeaderValue::List(vec![
                "Chris Hiemstra".to_string(),
                "Hans Lievens".to_string(),
                "Ella Moss".to_string(),
                "Tom Bradley".to_string(),
            ])
        );
    }

    #[test]
    fn test_untyped_values() {
        assert_eq!(
            untyped("12.5", None),
            HeaderValue::Number {
                value: 12.5,
                unit: None
            }
        );
        assert_eq!(untyped("\"clear\"", None), HeaderValue::Text("clear".to_string()));
    }
}
