//! Command implementations for the snowex-ingest CLI
//!
//! Each subcommand lives in its own module:
//! - `ingest`: run a batch into the store
//! - `sites`: list stored sites

pub mod ingest;
pub mod shared;
pub mod sites;

use crate::cli::args::{Args, Commands};
use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;

/// Dispatch to the subcommand; `Ok(false)` means the command ran but
/// reported failures
pub async fn run(args: Args, cancellation: CancellationToken) -> Result<bool> {
    match args.command {
        Some(Commands::Ingest(ingest_args)) => ingest::run_ingest(ingest_args, cancellation).await,
        Some(Commands::Sites(sites_args)) => sites::run_sites(sites_args).await,
        None => bail!("No command given"),
    }
}
