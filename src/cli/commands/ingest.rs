//! Ingest command implementation
//!
//! Collects inputs, opens the store (SQLite, or in-memory for a dry run),
//! runs the batch loader and prints the summary.

use super::shared::{default_db_path, load_configuration, print_report, setup_logging};
use crate::cli::args::IngestArgs;
use crate::cli::input::collect_inputs;
use crate::config::IngestConfig;
use crate::loader::BatchLoader;
use crate::models::{BatchReport, StoreCounts};
use crate::provenance::SourceFile;
use crate::store::{MemoryStore, SqliteStore, Store};
use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returns `true` when no file failed
pub async fn run_ingest(args: IngestArgs, cancellation: CancellationToken) -> Result<bool> {
    setup_logging(args.get_log_level(), args.quiet)?;
    debug!("Command line arguments: {:?}", args);

    args.validate()?;
    let config = load_configuration(&args)?;

    let files = collect_inputs(&args.inputs)?;
    if files.is_empty() {
        warn!("No input files found");
        if !args.quiet {
            println!("{}", "No input files found".bright_yellow());
        }
        return Ok(true);
    }
    info!("Collected {} input files", files.len());

    let sources: Vec<SourceFile> = files
        .into_iter()
        .map(|path| {
            let source = SourceFile::from_path(path);
            match args.family {
                Some(family) => source.with_hint(family),
                None => source,
            }
        })
        .collect();

    let (report, counts) = if args.dry_run {
        info!("Dry run: ingesting into an in-memory store");
        let store = Arc::new(MemoryStore::with_lock_timeout(config.persistence_timeout));
        ingest_into(store, config, sources, cancellation).await?
    } else {
        let db = match &args.db {
            Some(path) => path.clone(),
            None => default_db_path()?,
        };
        let store = SqliteStore::open(&db, config.persistence_timeout)
            .with_context(|| format!("Failed to open database {}", db.display()))?;
        ingest_into(Arc::new(store), config, sources, cancellation).await?
    };

    if !args.quiet || report.has_failures() {
        print_report(&report, &counts, args.output_format, args.dry_run)?;
    }
    Ok(!report.has_failures())
}

async fn ingest_into<S: Store + 'static>(
    store: Arc<S>,
    config: IngestConfig,
    sources: Vec<SourceFile>,
    cancellation: CancellationToken,
) -> Result<(BatchReport, StoreCounts)> {
    let loader = BatchLoader::new(Arc::clone(&store), config)?.with_cancellation(cancellation);
    let report = loader.ingest(sources).await;

    let counts = tokio::task::spawn_blocking(move || store.counts())
        .await
        .context("Store task failed")??;
    Ok((report, counts))
}
