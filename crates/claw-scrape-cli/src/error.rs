//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

use claw_scrape::ScrapeError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The path being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON input file could not be parsed.
    #[error("invalid JSON in {path}: {reason}")]
    Json {
        /// The file being parsed.
        path: PathBuf,
        /// The parse failure.
        reason: String,
    },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Scrape configuration error.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
