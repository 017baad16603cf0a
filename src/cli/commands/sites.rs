//! Sites command implementation

use super::shared::{default_db_path, setup_logging};
use crate::cli::args::{OutputFormat, SitesArgs};
use crate::constants::DEFAULT_PERSISTENCE_TIMEOUT_SECS;
use crate::models::Site;
use crate::store::{SqliteStore, Store};
use anyhow::{Context, Result, bail};
use colored::*;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SiteSummary {
    #[serde(flatten)]
    site: Site,
    points: usize,
}

pub async fn run_sites(args: SitesArgs) -> Result<bool> {
    setup_logging(args.get_log_level(), false)?;

    let db = match &args.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    if !db.exists() {
        bail!("No database at {}; run `snowex-ingest ingest` first", db.display());
    }

    let summaries = tokio::task::spawn_blocking(move || -> Result<Vec<SiteSummary>> {
        let store = SqliteStore::open(&db, Duration::from_secs(DEFAULT_PERSISTENCE_TIMEOUT_SECS))
            .with_context(|| format!("Failed to open database {}", db.display()))?;
        let mut summaries = Vec::new();
        for site in store.sites()? {
            let points = store.points(site.id)?.len();
            summaries.push(SiteSummary { site, points });
        }
        Ok(summaries)
    })
    .await
    .context("Store task failed")??;
    debug!("Loaded {} sites", summaries.len());

    match args.output_format {
        OutputFormat::Human => print_sites(&summaries),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialize sites")?
        ),
    }
    Ok(true)
}

fn print_sites(summaries: &[SiteSummary]) {
    if summaries.is_empty() {
        println!("{}", "No sites stored yet".bright_yellow());
        return;
    }

    println!("{}", format!("{} sites", summaries.len()).bright_green().bold());
    for SiteSummary { site, points } in summaries {
        let location = match site.location {
            Some(l) => format!("({:.5}, {:.5})", l.latitude, l.longitude),
            None => "(no location)".to_string(),
        };
        println!(
            "  {} {} {} {}",
            format!("{:>4}", site.id.0).bright_yellow(),
            site.name.bright_cyan(),
            location.bright_black(),
            format!("{} points", points).bright_white()
        );
        if let Some(description) = &site.description {
            println!("       {}", description);
        }
    }
}
