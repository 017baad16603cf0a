//! CSV profile files: `key, value` preamble, column header line, data rows.

use super::registry;
use super::{ColumnSpec, DataRow, FieldSource, Metadata, ParsedFile};
use crate::constants::{COMMENT_PREFIX, is_missing_token};
use crate::error::{Result, SnowexError};
use crate::models::FileFamily;
use csv::{ReaderBuilder, Trim};
use tracing::debug;

/// Resolve every comma-separated token of a line as a known column.
///
/// Returns `None` unless all tokens are known, there are at least two,
/// and at least one of them positions rows (depth, date or datetime).
pub fn column_header_tokens(line: &str) -> Option<Vec<(String, registry::ColumnMatch, Option<String>)>> {
    let line = line
        .trim()
        .trim_start_matches(COMMENT_PREFIX)
        .trim()
        .trim_end_matches(',');
    let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
    if tokens.len() < 2 {
        return None;
    }

    let mut resolved = Vec::with_capacity(tokens.len());
    for token in tokens {
        let (key, unit) = registry::standardize_key(token);
        if key.is_empty() {
            return None;
        }
        let found = registry::column_def(&key)?;
        resolved.push((token.to_string(), found, unit));
    }

    resolved
        .iter()
        .any(|(_, m, _)| m.def.role.positions_rows())
        .then_some(resolved)
}

/// 0-based index of the column header line
pub fn find_column_header(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .position(|line| column_header_tokens(line).is_some())
}

/// Split a preamble line into key and value at the first `,` or `:`
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let at = line.find([',', ':'])?;
    Some((&line[..at], &line[at + 1..]))
}

pub fn parse(text: &str) -> Result<ParsedFile> {
    let lines: Vec<&str> = text.lines().collect();
    let header_index = find_column_header(&lines)
        .ok_or_else(|| SnowexError::unknown_format("no column header line found"))?;

    let mut metadata = Metadata::new();
    for (i, line) in lines[..header_index].iter().enumerate() {
        let line_no = i + 1;
        let body = line.trim().trim_start_matches(COMMENT_PREFIX).trim();
        if body.is_empty() {
            continue;
        }
        let Some((raw_key, raw_value)) = split_key_value(body) else {
            debug!("Line {}: no key/value separator, ignoring '{}'", line_no, body);
            continue;
        };
        let (key, key_unit) = registry::standardize_key(raw_key);
        if key.is_empty() {
            continue;
        }
        // Trailing empty cells from spreadsheet exports: "Site,Grand Mesa,,,"
        let value = raw_value.trim().trim_end_matches(',').trim();
        if is_missing_token(value) {
            debug!("Line {}: '{}' has no value", line_no, key);
            continue;
        }
        metadata.set_raw(&key, key_unit, value, FieldSource::Line(line_no))?;
    }

    let columns = build_columns(lines[header_index]);
    let data_start_line = header_index + 2;
    let rows = read_rows(&lines[header_index + 1..], data_start_line)?;

    Ok(ParsedFile {
        family: FileFamily::CsvProfile,
        metadata,
        columns,
        data_start_line,
        rows,
        overrides_applied: Vec::new(),
    })
}

fn build_columns(header_line: &str) -> Vec<ColumnSpec> {
    column_header_tokens(header_line)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, (raw, found, unit))| ColumnSpec {
            index,
            raw,
            name: found.def.name.to_string(),
            role: found.def.role,
            unit,
            default_unit: found.def.default_unit,
            sample: found.sample,
        })
        .collect()
}

/// Read data rows with the csv crate; `first_line` is the 1-based line of `lines[0]`
fn read_rows(lines: &[&str], first_line: usize) -> Result<Vec<DataRow>> {
    let body = lines.join("\n");
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(COMMENT_PREFIX as u8))
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e
                .position()
                .map(|p| p.line() as usize + first_line - 1)
                .unwrap_or(first_line);
            SnowexError::MalformedData {
                line,
                column: String::new(),
                value: e.to_string(),
            }
        })?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line() as usize + first_line - 1)
            .unwrap_or(first_line);
        rows.push(DataRow {
            line,
            cells: record.iter().map(str::to_string).collect(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_header_requires_known_tokens() {
        assert!(column_header_tokens("# depth (cm), density (kg/m3)").is_some());
        assert!(column_header_tokens("top,bottom,grain_type,hand_hardness").is_some());
        assert!(column_header_tokens("Site, Grand Mesa").is_none());
        // A single token is never a column header line
        assert!(column_header_tokens("depth (cm)").is_none());
        // Known names but nothing to index the profile by
        assert!(column_header_tokens("Comments, notes").is_none());
    }

    #[test]
    fn test_split_key_value() {
        assert_eq!(split_key_value("Site, Grand Mesa"), Some(("Site", " Grand Mesa")));
        assert_eq!(
            split_key_value("Date/Time: 2020-01-31T15:10"),
            Some(("Date/Time", " 2020-01-31T15:10"))
        );
        assert_eq!(split_key_value("no separator here"), None);
    }

    #[test]
    fn test_row_line_numbers() {
        let rows = read_rows(&["95, 250", "", "85,\"260\""], 7).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 7);
        assert_eq!(rows[1].line, 9);
        assert_eq!(rows[1].cells, vec!["85".to_string(), "260".to_string()]);
    }
}
