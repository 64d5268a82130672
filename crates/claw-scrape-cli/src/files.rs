//! Reading configuration, job and rule files from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use claw_scrape::{RuleSource, ScrapeConfig};

use crate::error::CliError;

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns `CliError::Read` or `CliError::Json`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = read(path)?;
    serde_json::from_str(&text).map_err(|e| CliError::Json {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Loads scrape settings, falling back to defaults without a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<ScrapeConfig, CliError> {
    match path {
        Some(path) => {
            let config: ScrapeConfig = read_json(path)?;
            debug!(path = %path.display(), "loaded scrape config");
            Ok(config)
        }
        None => Ok(ScrapeConfig::default()),
    }
}

/// Reads every rule file under `dir`.
///
/// Files are named by their path relative to `dir`, with `/` separators, and
/// returned sorted by name. Files without a rule extension are not read.
///
/// # Errors
///
/// Returns `CliError::Read` if a directory or rule file cannot be read.
pub fn read_rule_dir(
    dir: &Path,
    recursive: bool,
    config: &ScrapeConfig,
) -> Result<Vec<RuleSource>, CliError> {
    let mut sources = Vec::new();
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|source| CliError::Read {
            path: current.clone(),
            source,
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
                continue;
            }
            let name = relative_name(dir, &path);
            if !config.is_rule_file(&name) {
                debug!(file = %name, "skipping non-rule file");
                continue;
            }
            sources.push(RuleSource::new(name, read(&path)?));
        }
    }

    sources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sources)
}

fn relative_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
