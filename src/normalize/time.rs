//! Date, time and timezone parsing for header values.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%y", "%m/%d/%Y", "%d-%b-%y", "%d-%b-%Y", "%d %b %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%H:%M:%S%.f", "%I:%M %p", "%I:%M:%S %p"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d-%H:%M",
    "%Y-%m-%d-%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S%.f",
    "%d-%b-%y %H:%M",
];

/// Parse a calendar date in any of the accepted layouts
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return Some(date);
    }
    // MMDDYY, as used in pit identifiers and older field sheets
    if text.len() == 6 && text.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(text, "%m%d%y").ok();
    }
    None
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    if let Some(time) = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
    {
        return Some(time);
    }
    // HHMM without separator
    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        return NaiveTime::parse_from_str(text, "%H%M").ok();
    }
    None
}

/// A parsed date and time with the offset it declared, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDateTime {
    pub naive: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

impl LocalDateTime {
    /// Resolve to UTC using the declared offset, else `fallback`
    pub fn to_utc(&self, fallback: FixedOffset) -> Option<DateTime<Utc>> {
        let offset = self.offset.unwrap_or(fallback);
        offset
            .from_local_datetime(&self.naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Parse a combined date-time, with an optional trailing or inline offset
pub fn parse_datetime(text: &str) -> Option<LocalDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(LocalDateTime {
            naive: dt.naive_local(),
            offset: Some(*dt.offset()),
        });
    }

    if let Some(naive) = parse_naive_datetime(text) {
        return Some(LocalDateTime {
            naive,
            offset: None,
        });
    }

    // Trailing timezone token: "20-Feb-2020 19:28:03 UTC", "2020-02-01 10:00 MST"
    let (body, zone) = text.rsplit_once(char::is_whitespace)?;
    let offset = parse_timezone(zone)?;
    let naive = parse_naive_datetime(body.trim())?;
    Some(LocalDateTime {
        naive,
        offset: Some(offset),
    })
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Parse a timezone name or numeric offset
pub fn parse_timezone(text: &str) -> Option<FixedOffset> {
    let upper = text.trim().to_uppercase();
    let hours = match upper.as_str() {
        "UTC" | "GMT" | "Z" | "UT" => Some(0),
        "MST" => Some(-7),
        "MDT" => Some(-6),
        "PST" => Some(-8),
        "PDT" => Some(-7),
        "CST" => Some(-6),
        "CDT" => Some(-5),
        "EST" => Some(-5),
        "EDT" => Some(-4),
        "AKST" => Some(-9),
        "AKDT" => Some(-8),
        _ => None,
    };
    if let Some(hours) = hours {
        return FixedOffset::east_opt(hours * 3600);
    }

    let numeric = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    parse_numeric_offset(numeric)
}

/// `+HH:MM`, `-HHMM`, `-7`, `+05:30`
fn parse_numeric_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.chars().next()? {
        '+' => (1, &text[1..]),
        '-' => (-1, &text[1..]),
        _ => return None,
    };

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if rest.len() == 4 {
        let (h, m) = (rest.get(..2)?, rest.get(2..)?);
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else {
        (rest.parse::<i32>().ok()?, 0)
    };

    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Offset in minutes east of UTC as a `FixedOffset`
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
}
