//! Scrape job specifications and their normalization.
//!
//! Producers hand over partial, untyped job specifications. [`normalize_job`]
//! rejects anything outside the supported subset of Prometheus scrape
//! configuration and fills in the defaults, producing a [`ScrapeJobSpec`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ValidationError;
use crate::topology::Labels;

/// Fields a producer may set on a scrape job.
pub const ALLOWED_FIELDS: [&str; 12] = [
    "job_name",
    "metrics_path",
    "static_configs",
    "scrape_interval",
    "scrape_timeout",
    "proxy_url",
    "relabel_configs",
    "metrics_relabel_configs",
    "sample_limit",
    "label_limit",
    "label_name_length_limit",
    "label_value_length_limit",
];

/// Metrics path used when a job does not name one.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Target used when a job declares no static configs: every unit, port 80.
pub const DEFAULT_TARGET: &str = "*:80";

/// A relabel configuration, passed through to Prometheus untouched.
pub type RelabelConfig = Map<String, Value>;

/// One `static_configs` entry: target addresses sharing a label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    /// Target addresses, `host:port`. The host may be the `*` wildcard.
    pub targets: Vec<String>,
    /// Labels applied to every target in this entry.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl StaticConfig {
    /// Creates an entry with the given targets and no labels.
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            labels: Labels::new(),
        }
    }

    /// Adds a shared label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A complete scrape job, ready to be resolved and published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeJobSpec {
    /// Job name; synthesized during aggregation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// HTTP path metrics are scraped from.
    pub metrics_path: String,
    /// Target groups.
    pub static_configs: Vec<StaticConfig>,
    /// Scrape interval, e.g. `30s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
    /// Scrape timeout, e.g. `10s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_timeout: Option<String>,
    /// Proxy URL used for scraping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Target relabeling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabel_configs: Vec<RelabelConfig>,
    /// Sample relabeling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics_relabel_configs: Vec<RelabelConfig>,
    /// Per-scrape sample limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_limit: Option<u64>,
    /// Per-scrape label count limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_limit: Option<u64>,
    /// Maximum label name length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_name_length_limit: Option<u64>,
    /// Maximum label value length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_value_length_limit: Option<u64>,
}

impl Default for ScrapeJobSpec {
    fn default() -> Self {
        Self {
            job_name: None,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            static_configs: vec![StaticConfig::new([DEFAULT_TARGET])],
            scrape_interval: None,
            scrape_timeout: None,
            proxy_url: None,
            relabel_configs: Vec::new(),
            metrics_relabel_configs: Vec::new(),
            sample_limit: None,
            label_limit: None,
            label_name_length_limit: None,
            label_value_length_limit: None,
        }
    }
}

impl ScrapeJobSpec {
    /// Serializes the job as a Prometheus `scrape_configs` entry.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which converts into `ScrapeError`.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Normalizes one raw job specification.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the value is not a mapping, carries an
/// unknown field, has malformed `static_configs`, or a recognized field has
/// the wrong type.
pub fn normalize_job(raw: &Value) -> Result<ScrapeJobSpec, ValidationError> {
    let Some(fields) = raw.as_object() else {
        return Err(ValidationError::NotAMapping {
            found: json_type(raw).to_string(),
        });
    };

    if let Some(unknown) = fields
        .keys()
        .find(|key| !ALLOWED_FIELDS.contains(&key.as_str()))
    {
        return Err(ValidationError::UnknownField {
            field: unknown.clone(),
        });
    }

    let defaults = ScrapeJobSpec::default();

    let static_configs = match fields.get("static_configs").filter(|v| !v.is_null()) {
        Some(value) => {
            check_static_configs(value)?;
            decode_field(value, "static_configs")?
        }
        None => defaults.static_configs,
    };

    let job = ScrapeJobSpec {
        job_name: field::<String>(fields, "job_name")?.filter(|name| !name.is_empty()),
        metrics_path: field(fields, "metrics_path")?.unwrap_or(defaults.metrics_path),
        static_configs,
        scrape_interval: field(fields, "scrape_interval")?,
        scrape_timeout: field(fields, "scrape_timeout")?,
        proxy_url: field(fields, "proxy_url")?,
        relabel_configs: field(fields, "relabel_configs")?.unwrap_or_default(),
        metrics_relabel_configs: field(fields, "metrics_relabel_configs")?.unwrap_or_default(),
        sample_limit: field(fields, "sample_limit")?,
        label_limit: field(fields, "label_limit")?,
        label_name_length_limit: field(fields, "label_name_length_limit")?,
        label_value_length_limit: field(fields, "label_value_length_limit")?,
    };

    debug!(
        job_name = job.job_name.as_deref().unwrap_or("<unnamed>"),
        static_configs = job.static_configs.len(),
        "normalized scrape job"
    );
    Ok(job)
}

/// Normalizes a producer's job list.
///
/// A producer that declares no jobs gets the single default job.
///
/// # Errors
///
/// Returns [`ValidationError::InJob`] for the first job that fails.
pub fn normalize_jobs(raw: &[Value]) -> Result<Vec<ScrapeJobSpec>, ValidationError> {
    if raw.is_empty() {
        return Ok(vec![ScrapeJobSpec::default()]);
    }
    raw.iter()
        .enumerate()
        .map(|(index, job)| {
            normalize_job(job).map_err(|source| ValidationError::InJob {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}

fn check_static_configs(value: &Value) -> Result<(), ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedStaticConfigs { reason };

    let Some(entries) = value.as_array() else {
        return Err(malformed(format!("expected a list, got {}", json_type(value))));
    };

    for (i, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            return Err(malformed(format!(
                "entry {i} must be a mapping, got {}",
                json_type(entry)
            )));
        };

        match entry.get("targets") {
            None => return Err(malformed(format!("entry {i} has no targets"))),
            Some(Value::Array(targets)) => {
                if let Some(bad) = targets.iter().find(|t| !t.is_string()) {
                    return Err(malformed(format!(
                        "entry {i} has a non-string target: {bad}"
                    )));
                }
            }
            Some(other) => {
                return Err(malformed(format!(
                    "entry {i} targets must be a list, got {}",
                    json_type(other)
                )));
            }
        }

        if let Some(labels) = entry.get("labels") {
            let valid = labels
                .as_object()
                .is_some_and(|m| m.values().all(Value::is_string));
            if !valid {
                return Err(malformed(format!(
                    "entry {i} labels must map names to strings"
                )));
            }
        }

        if let Some(extra) = entry.keys().find(|k| *k != "targets" && *k != "labels") {
            return Err(malformed(format!("entry {i} has unexpected key {extra}")));
        }
    }
    Ok(())
}

fn field<T: DeserializeOwned>(
    fields: &Map<String, Value>,
    name: &str,
) -> Result<Option<T>, ValidationError> {
    fields
        .get(name)
        .filter(|v| !v.is_null())
        .map(|v| decode_field(v, name))
        .transpose()
}

fn decode_field<T: DeserializeOwned>(value: &Value, name: &str) -> Result<T, ValidationError> {
    T::deserialize(value).map_err(|e| ValidationError::InvalidField {
        field: name.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
