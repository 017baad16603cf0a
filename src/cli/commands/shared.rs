//! Shared components for CLI commands
//!
//! Logging setup, configuration layering, default locations and report
//! printing used by more than one command.

use crate::cli::args::{IngestArgs, OutputFormat};
use crate::config::{ConfigFile, IngestConfig};
use crate::models::{BatchReport, FileOutcome, StoreCounts};
use anyhow::{Context, Result};
use colored::*;
use indicatif::HumanDuration;
use std::path::PathBuf;
use tracing::{debug, info};

const APP_DIR: &str = "snowex-ingest";

/// Set up structured logging on stderr
pub fn setup_logging(log_level: &str, quiet: bool) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("snowex_ingest={}", log_level)));

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
            .context("Failed to initialise logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to initialise logging")?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// `snowex-ingest/snowex.db` under the user data directory
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine user data directory")?;
    Ok(data_dir.join(APP_DIR).join("snowex.db"))
}

/// `snowex-ingest/config.toml` under the user config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Login name of the operator, recorded when no uploader is configured
pub fn default_uploader() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Load configuration: config file, then command-line flags
pub fn load_configuration(args: &IngestArgs) -> Result<IngestConfig> {
    let config_path = match &args.config_file {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.exists()),
    };

    let file = match &config_path {
        Some(path) => {
            info!("Using config file: {}", path.display());
            ConfigFile::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?
        }
        None => {
            info!("No config file found, using command-line settings");
            ConfigFile::default()
        }
    };

    let mut config = file.into_config(&args.tolerance_flags(), &default_uploader())?;
    apply_cli_overrides(&mut config, args);
    config.validate()?;
    debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

/// Apply command-line flags over the file configuration
pub fn apply_cli_overrides(config: &mut IngestConfig, args: &IngestArgs) {
    if let Some(uploader) = &args.uploader {
        config.uploader = uploader.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(minutes) = args.utc_offset_minutes {
        config.default_utc_offset_minutes = minutes;
    }
    for (key, value) in &args.meta {
        config.header_overrides.insert(key.clone(), value.clone());
    }
    config.show_progress = args.show_progress();
}

/// Print the batch outcome
pub fn print_report(
    report: &BatchReport,
    counts: &StoreCounts,
    format: OutputFormat,
    dry_run: bool,
) -> Result<()> {
    match format {
        OutputFormat::Human => {
            print_human_report(report, counts, dry_run);
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "dry_run": dry_run,
                "report": report,
                "store": counts,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialize report")?
            );
            Ok(())
        }
    }
}

fn print_human_report(report: &BatchReport, counts: &StoreCounts, dry_run: bool) {
    let title = if dry_run {
        "Ingestion Summary (dry run, nothing written)"
    } else {
        "Ingestion Summary"
    };
    println!("\n{}", title.bright_green().bold());
    println!(
        "  {} {}",
        "Time elapsed:".bright_cyan(),
        HumanDuration(report.elapsed).to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Ingested:".bright_cyan(),
        report.ingested.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Already ingested:".bright_cyan(),
        report.skipped.to_string().bright_white()
    );
    if report.cancelled > 0 {
        println!(
            "  {} {}",
            "Cancelled:".bright_yellow(),
            report.cancelled.to_string().bright_yellow().bold()
        );
    }
    if report.failed > 0 {
        println!(
            "  {} {}",
            "Failed:".bright_red(),
            report.failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {} sites, {} points, {} profiles, {} rasters, {} provenance records",
        "Store:".bright_cyan(),
        counts.sites,
        counts.points,
        counts.profiles,
        counts.rasters,
        counts.provenance
    );

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("\n{}", "Failed files".bright_red().bold());
        for file in failures {
            if let FileOutcome::Failed {
                kind,
                detail,
                attempts,
            } = &file.outcome
            {
                let tries = if *attempts > 1 {
                    format!(" after {} attempts", attempts)
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {}{}",
                    file.source.bright_white(),
                    format!("[{:?}]", kind).bright_red(),
                    detail,
                    tries.bright_black()
                );
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Args, Commands};
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ingest_args(extra: &[&str]) -> IngestArgs {
        let mut argv = vec!["snowex-ingest", "ingest", "a.csv"];
        argv.extend_from_slice(extra);
        match Args::parse_from(argv).command {
            Some(Commands::Ingest(args)) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_layer_over_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "uploader = \"file-team\"\nworkers = 2\n\n[tolerances]\nsite_radius_m = 800.0\npoint_radius_m = 10.0\ntime_window_secs = 1800.0"
        )
        .unwrap();
        let path = file.path().display().to_string();

        let args = ingest_args(&[
            "--config",
            &path,
            "--point-radius",
            "3",
            "--uploader",
            "cli-team",
            "--meta",
            "timezone=MST",
        ]);
        let config = load_configuration(&args).unwrap();

        assert_eq!(config.tolerances.site_radius_m, 800.0);
        assert_eq!(config.tolerances.point_radius_m, 3.0);
        assert_eq!(config.uploader, "cli-team");
        assert_eq!(config.workers, 2);
        assert_eq!(config.header_overrides.get("timezone").map(String::as_str), Some("MST"));
    }

    #[test]
    fn test_missing_tolerances_are_a_configuration_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[tolerances]\nsite_radius_m = 800.0").unwrap();
        let path = file.path().display().to_string();

        let args = ingest_args(&["--config", &path]);
        let err = load_configuration(&args).unwrap_err();
        assert!(err.to_string().contains("point_radius_m"), "{}", err);
    }
}
