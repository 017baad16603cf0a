//! File sources and provenance records.
//!
//! Every ingested file is identified by the SHA-256 of its content. The
//! [`ProvenanceRecorder`] turns a source, its checksum and the normalizer's
//! lineage into the [`NewProvenance`] attached to every entity the file
//! produces.

use crate::config::{IngestConfig, Tolerances};
use crate::constants::PARSER_VERSION;
use crate::error::{Result, SnowexError};
use crate::models::{FileFamily, NewProvenance, ProvenanceRef};
use crate::normalize::Lineage;
use crate::store::Transaction;
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Hex-encoded SHA-256 of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
enum Origin {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// One input file: a path on disk or content already in memory
#[derive(Debug, Clone)]
pub struct SourceFile {
    id: String,
    origin: Origin,
    hint: Option<FileFamily>,
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.display().to_string(),
            origin: Origin::Path(path),
            hint: None,
        }
    }

    /// In-memory content under a caller-chosen identifier
    pub fn from_bytes(id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            origin: Origin::Memory(Arc::from(content.into())),
            hint: None,
        }
    }

    pub fn with_hint(mut self, family: FileFamily) -> Self {
        self.hint = Some(family);
        self
    }

    /// Stable identifier recorded as the provenance source
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hint(&self) -> Option<FileFamily> {
        self.hint
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Path(path) => Some(path),
            Origin::Memory(_) => None,
        }
    }

    /// File name part of the identifier
    pub fn name(&self) -> &str {
        Path::new(&self.id)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.id)
    }

    /// Read the full content
    pub async fn read(&self) -> Result<Vec<u8>> {
        match &self.origin {
            Origin::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| SnowexError::io(path.clone(), e)),
            Origin::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// SHA-256 of the content, hex encoded
    pub async fn checksum(&self) -> Result<String> {
        Ok(sha256_hex(&self.read().await?))
    }
}

/// Builds provenance records for one batch
#[derive(Debug, Clone)]
pub struct ProvenanceRecorder {
    uploader: String,
    tolerances: Tolerances,
    default_utc_offset_minutes: i32,
    header_overrides: BTreeMap<String, String>,
}

impl ProvenanceRecorder {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            uploader: config.uploader.clone(),
            tolerances: config.tolerances,
            default_utc_offset_minutes: config.default_utc_offset_minutes,
            header_overrides: config.header_overrides.clone(),
        }
    }

    /// Existing record for this content, if the file was ingested before
    pub fn already_ingested<T: Transaction + ?Sized>(
        tx: &mut T,
        checksum: &str,
    ) -> Result<Option<ProvenanceRef>> {
        tx.find_provenance_by_checksum(checksum)
    }

    pub fn record(
        &self,
        source: &SourceFile,
        checksum: &str,
        family: FileFamily,
        lineage: &Lineage,
    ) -> NewProvenance {
        let overrides: BTreeMap<&str, &str> = self
            .header_overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let parameters = json!({
            "family": family.as_str(),
            "tolerances": self.tolerances,
            "default_utc_offset_minutes": self.default_utc_offset_minutes,
            "timezone": lineage.utc_offset,
            "source_epsg": lineage.source_epsg,
            "column_units": lineage.column_units,
            "header_units": lineage.header_units,
            "overrides": overrides,
            "overridden_fields": lineage.overrides,
        });
        debug!("Provenance parameters for {}: {}", source.id(), parameters);

        NewProvenance {
            source: source.id().to_string(),
            checksum: checksum.to_string(),
            uploader: self.uploader.clone(),
            ingested_at: Utc::now(),
            parser_version: PARSER_VERSION.to_string(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_path_and_memory_sources_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"# Site, Grand Mesa\n").unwrap();

        let on_disk = SourceFile::from_path(file.path());
        let in_memory = SourceFile::from_bytes("pit.csv", b"# Site, Grand Mesa\n".to_vec());

        assert_eq!(on_disk.checksum().await.unwrap(), in_memory.checksum().await.unwrap());
        assert_eq!(in_memory.name(), "pit.csv");
        assert!(in_memory.path().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = SourceFile::from_path("/definitely/not/here.csv");
        let err = source.read().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }

    #[test]
    fn test_record_carries_lineage() {
        let config = IngestConfig::new(Tolerances::new(500.0, 5.0, 3600.0), "field-team")
            .with_header_override("timezone", "MST");
        let recorder = ProvenanceRecorder::new(&config);

        let mut lineage = Lineage {
            source_epsg: Some(26912),
            utc_offset: Some("-07:00".to_string()),
            overrides: vec!["timezone".to_string()],
            ..Default::default()
        };
        lineage
            .column_units
            .insert("depth (cm)".to_string(), "cm".to_string());

        let source = SourceFile::from_bytes("data/pit.csv", Vec::new());
        let record = recorder.record(&source, "abc123", FileFamily::CsvProfile, &lineage);

        assert_eq!(record.source, "data/pit.csv");
        assert_eq!(record.uploader, "field-team");
        assert_eq!(record.parser_version, PARSER_VERSION);
        assert_eq!(record.parameters["family"], "csv-profile");
        assert_eq!(record.parameters["source_epsg"], 26912);
        assert_eq!(record.parameters["column_units"]["depth (cm)"], "cm");
        assert_eq!(record.parameters["overrides"]["timezone"], "MST");
        assert_eq!(record.parameters["tolerances"]["point_radius_m"], 5.0);
    }
}
