//! Configuration management and validation.
//!
//! [`IngestConfig`] carries everything a batch run needs. It is assembled in
//! layers: a TOML [`ConfigFile`] first, then command-line flags. Matching
//! tolerances have no built-in defaults and must come from one of the layers.

use crate::constants::{
    DEFAULT_IO_TIMEOUT_SECS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_PERSISTENCE_TIMEOUT_SECS, DEFAULT_RETRY_BACKOFF_MS,
};
use crate::error::{Result, SnowexError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Entity matching tolerances, all bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Great-circle radius for proximity site matching
    pub site_radius_m: f64,
    /// Great-circle radius for point matching within a site
    pub point_radius_m: f64,
    /// Maximum |Δt| between observation times of the same point
    pub time_window_secs: f64,
}

impl Tolerances {
    pub fn new(site_radius_m: f64, point_radius_m: f64, time_window_secs: f64) -> Self {
        Self {
            site_radius_m,
            point_radius_m,
            time_window_secs,
        }
    }

    pub fn time_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.time_window_secs * 1000.0).round() as i64)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("site_radius_m", self.site_radius_m),
            ("point_radius_m", self.point_radius_m),
            ("time_window_secs", self.time_window_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SnowexError::configuration(format!(
                    "tolerance {} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Partially specified tolerances from one configuration layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToleranceOverrides {
    pub site_radius_m: Option<f64>,
    pub point_radius_m: Option<f64>,
    pub time_window_secs: Option<f64>,
}

impl ToleranceOverrides {
    /// Overlay `self` on top of `base`; every field must end up set
    pub fn layer_over(&self, base: &ToleranceOverrides) -> Result<Tolerances> {
        let site = self.site_radius_m.or(base.site_radius_m);
        let point = self.point_radius_m.or(base.point_radius_m);
        let window = self.time_window_secs.or(base.time_window_secs);

        let mut missing = Vec::new();
        if site.is_none() {
            missing.push("site_radius_m");
        }
        if point.is_none() {
            missing.push("point_radius_m");
        }
        if window.is_none() {
            missing.push("time_window_secs");
        }

        match (site, point, window) {
            (Some(s), Some(p), Some(w)) => Ok(Tolerances::new(s, p, w)),
            _ => Err(SnowexError::configuration(format!(
                "matching tolerances have no defaults; missing {} (set them in [tolerances] or on the command line)",
                missing.join(", ")
            ))),
        }
    }
}

/// Retry behaviour for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(20);
        let delay = self.backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Main configuration for an ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub tolerances: Tolerances,

    /// Files processed concurrently
    pub workers: usize,

    /// Identity recorded on every provenance record
    pub uploader: String,

    pub retry: RetryPolicy,

    /// Timeout for reading one file
    pub io_timeout: Duration,

    /// Timeout for acquiring the store's write lock
    pub persistence_timeout: Duration,

    /// Offset applied to header times without a timezone, in minutes east of UTC
    pub default_utc_offset_minutes: i32,

    /// Hemisphere assumed for a bare UTM zone number
    pub northern_hemisphere: bool,

    /// Operator-supplied header values; these win over file values
    pub header_overrides: BTreeMap<String, String>,

    /// Show a progress bar while the batch runs
    pub show_progress: bool,
}

impl IngestConfig {
    pub fn new(tolerances: Tolerances, uploader: impl Into<String>) -> Self {
        Self {
            tolerances,
            workers: num_cpus::get(),
            uploader: uploader.into(),
            retry: RetryPolicy::default(),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            persistence_timeout: Duration::from_secs(DEFAULT_PERSISTENCE_TIMEOUT_SECS),
            default_utc_offset_minutes: 0,
            northern_hemisphere: true,
            header_overrides: BTreeMap::new(),
            show_progress: false,
        }
    }

    /// Set worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_persistence_timeout(mut self, timeout: Duration) -> Self {
        self.persistence_timeout = timeout;
        self
    }

    pub fn with_default_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.default_utc_offset_minutes = minutes;
        self
    }

    pub fn with_southern_hemisphere(mut self) -> Self {
        self.northern_hemisphere = false;
        self
    }

    /// Add an operator header override (`--meta key=value`)
    pub fn with_header_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.tolerances.validate()?;

        if self.workers == 0 {
            return Err(SnowexError::configuration("workers must be at least 1"));
        }
        if self.uploader.trim().is_empty() {
            return Err(SnowexError::configuration("uploader must not be empty"));
        }
        if self.io_timeout.is_zero() || self.persistence_timeout.is_zero() {
            return Err(SnowexError::configuration("timeouts must be greater than zero"));
        }
        if self.default_utc_offset_minutes.abs() > 14 * 60 {
            return Err(SnowexError::configuration(format!(
                "default UTC offset {} minutes is out of range",
                self.default_utc_offset_minutes
            )));
        }
        Ok(())
    }
}

/// On-disk TOML configuration; every field optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigFile {
    pub tolerances: ToleranceOverrides,
    pub uploader: Option<String>,
    pub workers: Option<usize>,
    pub retry: Option<RetryPolicy>,
    pub io_timeout_secs: Option<u64>,
    pub persistence_timeout_secs: Option<u64>,
    pub default_utc_offset_minutes: Option<i32>,
    pub northern_hemisphere: Option<bool>,
    pub header_overrides: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SnowexError::io(path, e))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| SnowexError::configuration(format!("invalid configuration file: {}", e)))
    }

    /// Build the run configuration, with `flags` layered over the file's tolerances
    pub fn into_config(
        self,
        flags: &ToleranceOverrides,
        fallback_uploader: &str,
    ) -> Result<IngestConfig> {
        let tolerances = flags.layer_over(&self.tolerances)?;
        let uploader = self
            .uploader
            .unwrap_or_else(|| fallback_uploader.to_string());

        let mut config = IngestConfig::new(tolerances, uploader);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(retry) = self.retry {
            config = config.with_retry(retry);
        }
        if let Some(secs) = self.io_timeout_secs {
            config = config.with_io_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.persistence_timeout_secs {
            config = config.with_persistence_timeout(Duration::from_secs(secs));
        }
        if let Some(minutes) = self.default_utc_offset_minutes {
            config = config.with_default_utc_offset_minutes(minutes);
        }
        if self.northern_hemisphere == Some(false) {
            config = config.with_southern_hemisphere();
        }
        config.header_overrides = self.header_overrides;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tolerances() -> Tolerances {
        Tolerances::new(1000.0, 10.0, 3600.0)
    }

    #[test]
    fn test_tolerance_validation() {
        assert!(tolerances().validate().is_ok());
        assert!(Tolerances::new(-1.0, 10.0, 60.0).validate().is_err());
        assert!(Tolerances::new(10.0, f64::NAN, 60.0).validate().is_err());
        assert!(Tolerances::new(10.0, 1.0, f64::INFINITY).validate().is_err());
        assert!(Tolerances::new(0.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_tolerances_have_no_defaults() {
        let err = ToleranceOverrides::default()
            .layer_over(&ToleranceOverrides::default())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("site_radius_m"));
        assert!(message.contains("point_radius_m"));
        assert!(message.contains("time_window_secs"));
    }

    #[test]
    fn test_flags_layer_over_file() {
        let file = ConfigFile::from_toml_str(
            r#"
            uploader = "field-team"
            workers = 2

            [tolerances]
            site_radius_m = 5000.0
            point_radius_m = 25.0
            time_window_secs = 7200.0

            [header_overrides]
            instrument = "IS3-SP-15"
            "#,
        )
        .unwrap();

        let flags = ToleranceOverrides {
            point_radius_m: Some(50.0),
            ..Default::default()
        };
        let config = file.into_config(&flags, "nobody").unwrap();

        assert_eq!(config.tolerances, Tolerances::new(5000.0, 50.0, 7200.0));
        assert_eq!(config.uploader, "field-team");
        assert_eq!(config.workers, 2);
        assert_eq!(
            config.header_overrides.get("instrument").map(String::as_str),
            Some("IS3-SP-15")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_config_key_rejected() {
        assert!(ConfigFile::from_toml_str("wokers = 3").is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_retries: 5,
            backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_config_validation() {
        let config = IngestConfig::new(tolerances(), "tester").with_workers(0);
        assert!(config.validate().is_err());

        let config = IngestConfig::new(tolerances(), "  ");
        assert!(config.validate().is_err());

        let config = IngestConfig::new(tolerances(), "tester").with_default_utc_offset_minutes(-420);
        assert!(config.validate().is_ok());
    }
}
