//! Batch loader
//!
//! Drives each file through parse, normalize, resolve and record, and
//! commits everything one file produces in a single transaction. Failures
//! stay with their file; the rest of the batch carries on.

pub mod progress;
pub mod retry;

#[cfg(test)]
mod tests;

use crate::config::IngestConfig;
use crate::error::{Result, SnowexError};
use crate::header;
use crate::models::{BatchReport, FileOutcome, FileReport, ProvenanceRef};
use crate::normalize::{self, NormalizeOptions, NormalizedContent, NormalizedFile};
use crate::provenance::{ProvenanceRecorder, SourceFile, sha256_hex};
use crate::resolver::Resolver;
use crate::store::{Store, Transaction};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::retry::retry_transient;

/// Parsed and normalized content waiting to be committed
enum Prepared {
    Already(ProvenanceRef),
    Ready {
        checksum: String,
        normalized: Arc<NormalizedFile>,
    },
}

pub struct BatchLoader<S> {
    store: Arc<S>,
    config: Arc<IngestConfig>,
    options: NormalizeOptions,
    recorder: ProvenanceRecorder,
    cancellation: CancellationToken,
}

impl<S: Store + 'static> BatchLoader<S> {
    pub fn new(store: Arc<S>, config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let options = NormalizeOptions::from_config(&config)?;
        let recorder = ProvenanceRecorder::new(&config);
        Ok(Self {
            store,
            config: Arc::new(config),
            options,
            recorder,
            cancellation: CancellationToken::new(),
        })
    }

    /// Use `token` to stop the batch; files not yet started are reported
    /// as cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Ingest every source; per-file results come back in input order
    pub async fn ingest(&self, sources: Vec<SourceFile>) -> BatchReport {
        let started = Instant::now();
        let total = sources.len();
        info!(
            "Ingesting {} files into {} with {} workers",
            total,
            self.store.describe(),
            self.config.workers
        );

        let progress = (self.config.show_progress && total > 0)
            .then(|| progress::create_progress_bar(total as u64, "Ingesting files"));

        let mut results: Vec<(usize, FileReport)> = stream::iter(sources.into_iter().enumerate())
            .map(|(index, source)| {
                let progress = progress.clone();
                async move {
                    let report = self.ingest_one(source, progress.as_ref()).await;
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    (index, report)
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        let files = results.into_iter().map(|(_, report)| report).collect();
        let report = BatchReport::from_files(files, started.elapsed());

        if let Some(pb) = progress {
            pb.finish_with_message(format!(
                "{} ingested, {} skipped, {} failed",
                report.ingested, report.skipped, report.failed
            ));
        }
        info!(
            "Batch finished in {:?}: {} ingested, {} already ingested, {} failed, {} cancelled",
            report.elapsed, report.ingested, report.skipped, report.failed, report.cancelled
        );
        report
    }

    /// Ingest a single source
    pub async fn ingest_one(&self, source: SourceFile, progress: Option<&ProgressBar>) -> FileReport {
        let id = source.id().to_string();
        if self.cancellation.is_cancelled() {
            debug!("Skipping {} after cancellation", id);
            return FileReport {
                source: id,
                outcome: FileOutcome::Cancelled,
            };
        }
        if let Some(pb) = progress {
            pb.set_message(format!("Processing: {}", source.name()));
        }

        let mut attempts = 0;
        let outcome = match self.process(&source, &mut attempts).await {
            Ok(outcome) => {
                match &outcome {
                    FileOutcome::AlreadyIngested { provenance } => {
                        info!("{} already ingested (provenance {})", id, provenance)
                    }
                    FileOutcome::Ingested {
                        family, profiles, ..
                    } => info!("Ingested {} as {} ({} profiles)", id, family, profiles.len()),
                    _ => {}
                }
                outcome
            }
            Err(e) => {
                error!("Failed to ingest {}: {}", id, e);
                FileOutcome::Failed {
                    kind: e.kind(),
                    detail: e.to_string(),
                    attempts: attempts.max(1),
                }
            }
        };

        FileReport {
            source: id,
            outcome,
        }
    }

    async fn process(&self, source: &SourceFile, attempts: &mut u32) -> Result<FileOutcome> {
        let content = retry_transient(&self.config.retry, "read", attempts, || {
            self.read_with_timeout(source)
        })
        .await?;

        let prepared = retry_transient(&self.config.retry, "prepare", attempts, || {
            self.prepare(source, content.clone())
        })
        .await?;

        let (checksum, normalized) = match prepared {
            Prepared::Already(provenance) => {
                return Ok(FileOutcome::AlreadyIngested { provenance });
            }
            Prepared::Ready {
                checksum,
                normalized,
            } => (checksum, normalized),
        };

        retry_transient(&self.config.retry, "commit", attempts, || {
            self.commit(source, &checksum, &normalized)
        })
        .await
    }

    async fn read_with_timeout(&self, source: &SourceFile) -> Result<Arc<Vec<u8>>> {
        let limit = self.config.io_timeout;
        match tokio::time::timeout(limit, source.read()).await {
            Ok(content) => Ok(Arc::new(content?)),
            Err(_) => Err(SnowexError::Timeout {
                operation: format!("reading {}", source.id()),
                elapsed: limit,
            }),
        }
    }

    /// Checksum, skip check, parse and normalize on a blocking thread
    async fn prepare(&self, source: &SourceFile, content: Arc<Vec<u8>>) -> Result<Prepared> {
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let options = self.options;
        let hint = source.hint();
        let name = source.name().to_string();

        task::spawn_blocking(move || {
            let checksum = sha256_hex(&content);
            if let Some(existing) = store.find_provenance(&checksum)? {
                return Ok(Prepared::Already(existing.id));
            }

            let parsed = header::parse_content(&content, hint, &config.header_overrides)?;
            for field in &parsed.overrides_applied {
                warn!("{}: header field {} replaced by operator override", name, field);
            }
            let normalized = normalize::normalize(&parsed, &options, &name)?;
            Ok(Prepared::Ready {
                checksum,
                normalized: Arc::new(normalized),
            })
        })
        .await
        .map_err(|e| SnowexError::fatal(format!("worker task failed: {}", e)))?
    }

    /// Resolve entities and write the file's graph in one transaction
    async fn commit(
        &self,
        source: &SourceFile,
        checksum: &str,
        normalized: &Arc<NormalizedFile>,
    ) -> Result<FileOutcome> {
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let recorder = self.recorder.clone();
        let source = source.clone();
        let checksum = checksum.to_string();
        let normalized = Arc::clone(normalized);

        task::spawn_blocking(move || {
            let mut tx = store.begin()?;
            let outcome = write_file(&mut tx, &config, &recorder, &source, &checksum, &normalized)?;
            match outcome {
                FileOutcome::Ingested { .. } => tx.commit()?,
                _ => tx.rollback()?,
            }
            Ok(outcome)
        })
        .await
        .map_err(|e| SnowexError::fatal(format!("worker task failed: {}", e)))?
    }
}

/// Writes for one file; the caller commits or rolls back
fn write_file<T: Transaction>(
    tx: &mut T,
    config: &IngestConfig,
    recorder: &ProvenanceRecorder,
    source: &SourceFile,
    checksum: &str,
    normalized: &NormalizedFile,
) -> Result<FileOutcome> {
    // Another worker may have committed the same content since the pre-check
    if let Some(existing) = ProvenanceRecorder::already_ingested(tx, checksum)? {
        return Ok(FileOutcome::AlreadyIngested {
            provenance: existing,
        });
    }

    let mut resolver = Resolver::new(&config.tolerances);
    let site = match &normalized.site {
        Some(draft) => Some(resolver.resolve_site(tx, draft)?),
        None => None,
    };

    let record = recorder.record(source, checksum, normalized.family, &normalized.lineage);
    let provenance = tx.insert_provenance(&record)?;

    match &normalized.content {
        NormalizedContent::Profiles { point, profiles } => {
            let site = site.ok_or_else(|| {
                SnowexError::fatal(format!("{} has profiles but no site", source.id()))
            })?;
            let point = resolver.resolve_point(tx, site, point)?;
            let profiles = profiles
                .iter()
                .map(|profile| tx.insert_profile(point, profile, provenance))
                .collect::<Result<Vec<_>>>()?;
            Ok(FileOutcome::Ingested {
                family: normalized.family,
                site: Some(site),
                point: Some(point),
                profiles,
                raster: None,
                provenance,
            })
        }
        NormalizedContent::Raster(draft) => {
            let raster = tx.insert_raster(site, &draft.clone().into_raster(checksum), provenance)?;
            Ok(FileOutcome::Ingested {
                family: normalized.family,
                site,
                point: None,
                profiles: Vec::new(),
                raster: Some(raster),
                provenance,
            })
        }
    }
}
