//! Error types for the claw-scrape crate.

use thiserror::Error;

/// Structural problems found while normalizing a raw scrape job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The job specification is not a JSON object.
    #[error("job specification must be a mapping, got {found}")]
    NotAMapping {
        /// The JSON type that was found instead.
        found: String,
    },

    /// The job specification contains a field outside the allow-list.
    #[error("unknown job field: {field}")]
    UnknownField {
        /// The offending field name.
        field: String,
    },

    /// `static_configs` does not have the expected shape.
    #[error("malformed static_configs: {reason}")]
    MalformedStaticConfigs {
        /// What was wrong with it.
        reason: String,
    },

    /// A recognized field carries a value of the wrong type.
    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        /// The field name.
        field: String,
        /// The reason the value was rejected.
        reason: String,
    },

    /// One job in a list failed to validate.
    #[error("job {index}: {source}")]
    InJob {
        /// Position of the job in the input list.
        index: usize,
        /// The underlying validation error.
        #[source]
        source: Box<ValidationError>,
    },
}

/// A rule file that matched neither the multi-group nor the single-rule format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid alert rule file {file}: {reason}")]
pub struct AlertRuleFormatError {
    /// Name of the rule file.
    pub file: String,
    /// Why the file was rejected.
    pub reason: String,
}

/// An expression the selector scanner could not make sense of.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed PromQL at byte {position}: {reason}")]
pub struct PromqlError {
    /// Byte offset in the expression where scanning stopped.
    pub position: usize,
    /// What the scanner expected.
    pub reason: String,
}

impl PromqlError {
    pub(crate) fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while building or merging scrape configuration.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A job specification failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An alert rule file could not be loaded.
    #[error(transparent)]
    AlertRuleFormat(#[from] AlertRuleFormatError),

    /// An alert expression could not be scanned.
    #[error(transparent)]
    Promql(#[from] PromqlError),

    /// Topology information is incomplete.
    #[error("invalid topology: {reason}")]
    InvalidTopology {
        /// The reason the topology was rejected.
        reason: String,
    },

    /// A relation data value could not be decoded.
    #[error("relation data key {key}: {reason}")]
    Codec {
        /// The relation data key being decoded.
        key: String,
        /// The decoding failure.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for scrape operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
