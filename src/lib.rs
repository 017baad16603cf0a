//! SnowEx Ingest Library
//!
//! Header-driven ingestion of SnowEx field and remote-sensing files into a
//! provenance-tracked spatial store.
//!
//! This library provides tools for:
//! - Detecting the file family and parsing free-form metadata headers
//! - Normalizing units, coordinate systems and timestamps to canonical form
//! - Resolving headers to existing Sites and Points within explicit tolerances
//! - Recording provenance for every ingested file, keyed by content checksum
//! - Loading batches concurrently with one atomic transaction per file

pub mod config;
pub mod constants;
pub mod error;
pub mod header;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod provenance;
pub mod resolver;
pub mod store;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
    pub mod input;
}

// Re-export commonly used types
pub use config::{ConfigFile, IngestConfig, RetryPolicy, ToleranceOverrides, Tolerances};
pub use error::{ErrorKind, Result, SnowexError};
pub use loader::BatchLoader;
pub use models::{BatchReport, FileFamily, FileOutcome, FileReport};
pub use provenance::SourceFile;
pub use store::{MemoryStore, SqliteStore, Store, Transaction};
