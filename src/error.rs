//! Error handling for SnowEx ingestion.
//!
//! Every failure a single file can hit maps onto one [`ErrorKind`], which is
//! what ends up in the batch report next to a human-readable detail string.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnowexError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown file format: {reason}")]
    UnknownFormat { reason: String },

    #[error("Incomplete header: missing {}", .missing.join(", "))]
    IncompleteHeader { missing: Vec<String> },

    #[error("Invalid UTF-8 at byte {offset} (line {line})")]
    Encoding { offset: usize, line: usize },

    #[error("Unsupported unit '{unit}' for field '{field}'")]
    UnsupportedUnit { field: String, unit: String },

    #[error("Coordinate conversion failed: {reason}")]
    CoordinateConversion { reason: String },

    #[error("Ambiguous {entity} match: {} candidates within tolerance (ids {})", .candidates.len(), join_ids(.candidates))]
    AmbiguousEntityMatch { entity: String, candidates: Vec<i64> },

    #[error("Malformed data at line {line}, column '{column}': '{value}'")]
    MalformedData {
        line: usize,
        column: String,
        value: String,
    },

    #[error("Invalid header value for '{field}': '{value}' ({reason})")]
    InvalidHeaderValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Timed out after {elapsed:?} during {operation}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("Transient persistence error: {message}")]
    PersistenceTransient { message: String },

    #[error("Persistence error: {message}")]
    PersistenceFatal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Stable classification of a failure, as listed in the batch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    UnknownFormat,
    IncompleteHeader,
    EncodingError,
    UnsupportedUnit,
    CoordinateConversionError,
    AmbiguousEntityMatch,
    MalformedData,
    Io,
    Timeout,
    PersistenceTransientError,
    PersistenceFatalError,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownFormat => "UnknownFormat",
            ErrorKind::IncompleteHeader => "IncompleteHeader",
            ErrorKind::EncodingError => "EncodingError",
            ErrorKind::UnsupportedUnit => "UnsupportedUnit",
            ErrorKind::CoordinateConversionError => "CoordinateConversionError",
            ErrorKind::AmbiguousEntityMatch => "AmbiguousEntityMatch",
            ErrorKind::MalformedData => "MalformedData",
            ErrorKind::Io => "Io",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::PersistenceTransientError => "PersistenceTransientError",
            ErrorKind::PersistenceFatalError => "PersistenceFatalError",
            ErrorKind::Configuration => "Configuration",
        };
        f.write_str(name)
    }
}

impl SnowexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnowexError::Io { .. } => ErrorKind::Io,
            SnowexError::UnknownFormat { .. } => ErrorKind::UnknownFormat,
            SnowexError::IncompleteHeader { .. } => ErrorKind::IncompleteHeader,
            SnowexError::Encoding { .. } => ErrorKind::EncodingError,
            SnowexError::UnsupportedUnit { .. } => ErrorKind::UnsupportedUnit,
            SnowexError::CoordinateConversion { .. } => ErrorKind::CoordinateConversionError,
            SnowexError::AmbiguousEntityMatch { .. } => ErrorKind::AmbiguousEntityMatch,
            // A header value that cannot be coerced is a data problem in the preamble
            SnowexError::MalformedData { .. } | SnowexError::InvalidHeaderValue { .. } => {
                ErrorKind::MalformedData
            }
            SnowexError::Timeout { .. } => ErrorKind::Timeout,
            SnowexError::PersistenceTransient { .. } => ErrorKind::PersistenceTransientError,
            SnowexError::PersistenceFatal { .. } => ErrorKind::PersistenceFatalError,
            SnowexError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SnowexError::Timeout { .. } | SnowexError::PersistenceTransient { .. }
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unknown_format(reason: impl Into<String>) -> Self {
        Self::UnknownFormat {
            reason: reason.into(),
        }
    }

    pub fn coordinate(reason: impl Into<String>) -> Self {
        Self::CoordinateConversion {
            reason: reason.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidHeaderValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::PersistenceFatal {
            message: message.into(),
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<rusqlite::Error> for SnowexError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                SnowexError::PersistenceTransient {
                    message: error.to_string(),
                }
            }
            _ => SnowexError::PersistenceFatal {
                message: error.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SnowexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_header_names_every_field() {
        let err = SnowexError::IncompleteHeader {
            missing: vec!["site_name".to_string(), "latitude".to_string()],
        };
        assert_eq!(err.kind(), ErrorKind::IncompleteHeader);
        assert_eq!(
            err.to_string(),
            "Incomplete header: missing site_name, latitude"
        );
    }

    #[test]
    fn test_transient_classification() {
        let timeout = SnowexError::Timeout {
            operation: "store lock".to_string(),
            elapsed: Duration::from_millis(10),
        };
        assert!(timeout.is_transient());
        assert!(!SnowexError::fatal("constraint").is_transient());
        assert!(!SnowexError::unknown_format("nope").is_transient());
    }

    #[test]
    fn test_ambiguous_message_lists_ids() {
        let err = SnowexError::AmbiguousEntityMatch {
            entity: "point".to_string(),
            candidates: vec![3, 7],
        };
        assert!(err.to_string().contains("ids 3, 7"));
        assert_eq!(err.kind().to_string(), "AmbiguousEntityMatch");
    }
}
