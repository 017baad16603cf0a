//! Fixtures shared by the batch loader tests


use crate::config::{IngestConfig, RetryPolicy, Tolerances};
use crate::provenance::SourceFile;

pub fn config() -> IngestConfig {
    IngestConfig::new(Tolerances::new(500.0, 5.0, 3600.0), "tests")
        .with_workers(4)
        .with_retry(RetryPolicy {
            max_retries: 2,
            backoff_ms: 1,
            max_backoff_ms: 2,
        })
}

/// Minimal pit file; `column` names the single measurement column
pub fn pit(site: &str, date: &str, column: &str, values: &[f64]) -> String {
    let mut content = format!(
        "# Site: {}\n# Lat: 39.05\n# Lon: -108.06\n# Date: {}\ndepth (cm), {}\n",
        site, date, column
    );
    for (i, value) in values.iter().enumerate() {
        content.push_str(&format!("{}, {}\n", 95 - i as i64 * 10, value));
    }
    content
}

/// Pit file whose header lacks coordinates
pub fn pit_without_location(site: &str) -> String {
    format!(
        "# Site: {}\n# Date: 2020-02-01\ndepth (cm), density (kg/m3)\n95, 250\n",
        site
    )
}

pub fn source(name: &str, content: String) -> SourceFile {
    SourceFile::from_bytes(name, content.into_bytes())
}

pub fn raster_sidecar() -> String {
    "ncols         4\n\
     nrows         3\n\
     xllcorner     743000.0\n\
     yllcorner     4321000.0\n\
     cellsize      3.0\n\
     NODATA_value  -9999\n\
     # site: Grand Mesa\n\
     # epsg: 26912\n\
     # type: depth\n\
     # units: m\n\
     # date: 2020-02-01\n"
        .to_string()
}
