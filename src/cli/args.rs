//! Command-line argument definitions for snowex-ingest
//!
//! Defines the CLI surface using the clap derive API.

use crate::config::ToleranceOverrides;
use crate::error::{Result, SnowexError};
use crate::models::FileFamily;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ingest SnowEx field and remote-sensing files into a provenance-tracked store
#[derive(Debug, Clone, Parser)]
#[command(
    name = "snowex-ingest",
    version,
    about = "Ingest SnowEx field and remote-sensing files into a provenance-tracked store",
    long_about = "Reads snow pit CSV profiles, raster sidecar headers and UAVSAR annotation files, \
                  normalizes units, coordinates and times, links every file to its Site and Point, \
                  and records where each value came from. Each file is committed atomically; \
                  re-ingesting the same content is skipped."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Ingest files, directories or glob patterns
    Ingest(IngestArgs),
    /// List the sites in a store
    Sites(SitesArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct IngestArgs {
    /// Files, directories (searched recursively) or glob patterns
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Treat every input as this family instead of detecting it
    #[arg(long = "family", value_name = "FAMILY")]
    pub family: Option<FileFamily>,

    /// Identity recorded on every provenance record
    #[arg(short = 'u', long = "uploader", value_name = "NAME")]
    pub uploader: Option<String>,

    /// SQLite database to ingest into
    ///
    /// Defaults to snowex-ingest/snowex.db under the user data directory.
    #[arg(long = "db", value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// TOML configuration file
    ///
    /// If not specified, ~/.config/snowex-ingest/config.toml is used when present.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Radius in metres within which a header location matches an existing site
    #[arg(long = "site-radius", value_name = "METRES")]
    pub site_radius_m: Option<f64>,

    /// Radius in metres within which a location matches an existing point
    #[arg(long = "point-radius", value_name = "METRES")]
    pub point_radius_m: Option<f64>,

    /// Seconds either side of an observation time that still match a point
    #[arg(long = "time-window", value_name = "SECONDS")]
    pub time_window_secs: Option<f64>,

    /// Offset for header times without a timezone, in minutes east of UTC
    #[arg(long = "utc-offset", value_name = "MINUTES", allow_hyphen_values = true)]
    pub utc_offset_minutes: Option<i32>,

    /// Header value override, applied to every file (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,

    /// Files processed concurrently
    #[arg(short = 'j', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Run against an in-memory store; nothing is written
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(long = "output-format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct SitesArgs {
    /// SQLite database to read
    #[arg(long = "db", value_name = "FILE")]
    pub db: Option<PathBuf>,

    #[arg(long = "format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON for scripting
    Json,
}

/// Parse a `key=value` header override
pub fn parse_meta(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl IngestArgs {
    pub fn validate(&self) -> Result<()> {
        if let Some(config_file) = &self.config_file {
            if !config_file.exists() {
                return Err(SnowexError::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }
        if self.workers == Some(0) {
            return Err(SnowexError::configuration(
                "Number of workers must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn tolerance_flags(&self) -> ToleranceOverrides {
        ToleranceOverrides {
            site_radius_m: self.site_radius_m,
            point_radius_m: self.point_radius_m,
            time_window_secs: self.time_window_secs,
        }
    }

    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            log_level(self.verbose)
        }
    }

    /// Progress bars only for interactive human output
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.output_format == OutputFormat::Human
    }
}

impl SitesArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose)
    }
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
