//! Input discovery for the ingest command
//!
//! Expands the operator's inputs (files, directories and glob patterns)
//! into a de-duplicated, ordered list of files.

use crate::error::{Result, SnowexError};
use crate::models::FileFamily;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expand inputs into files.
///
/// Directories are walked recursively and keep only files with a known
/// family extension; explicitly named files are kept whatever their
/// extension. Results are sorted and de-duplicated.
pub fn collect_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let found = walk_directory(path);
            debug!("Found {} candidate files under {}", found.len(), path.display());
            files.extend(found);
        } else if path.is_file() {
            files.insert(path.to_path_buf());
        } else if is_pattern(input) {
            let matched = expand_pattern(input)?;
            if matched.is_empty() {
                warn!("Pattern '{}' matched no files", input);
            }
            files.extend(matched);
        } else {
            return Err(SnowexError::configuration(format!(
                "Input does not exist: {}",
                input
            )));
        }
    }

    Ok(files.into_iter().collect())
}

fn walk_directory(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| FileFamily::from_path(p).is_some())
        .collect()
}

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| {
        SnowexError::configuration(format!("Invalid glob pattern '{}': {}", pattern, e))
    })?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path: {}", e),
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, "x").unwrap();
        path
    }

    #[test]
    fn test_directories_are_walked_for_known_extensions() {
        let dir = TempDir::new().unwrap();
        let pit = touch(dir.path(), "pits/2020/pit.csv");
        let ann = touch(dir.path(), "uavsar/grmesa.ann");
        touch(dir.path(), "pits/README.md");

        let files = collect_inputs(&[dir.path().display().to_string()]).unwrap();
        assert_eq!(files, {
            let mut expected = vec![pit, ann];
            expected.sort();
            expected
        });
    }

    #[test]
    fn test_named_files_glob_and_dedup() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.csv");
        let b = touch(dir.path(), "b.csv");
        let notes = touch(dir.path(), "notes.dat");

        let inputs = vec![
            a.display().to_string(),
            dir.path().join("*.csv").display().to_string(),
            notes.display().to_string(),
        ];
        let files = collect_inputs(&inputs).unwrap();
        assert_eq!(files, vec![a, b, notes]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let err = collect_inputs(&["/no/such/input.csv".to_string()]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
