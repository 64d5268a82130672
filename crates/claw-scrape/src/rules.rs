//! Alert rule types and rule file loading.
//!
//! Two rule file dialects are accepted:
//!
//! - the upstream Prometheus format, a mapping with a `groups` list where each
//!   group has a `name` and a list of `rules`;
//! - a single rule per file, a mapping with at least `alert` and `expr`, which
//!   is wrapped into a one-rule group named after the file.
//!
//! A file that fits neither shape is reported and skipped; it never stops the
//! remaining files from loading.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::config::ScrapeConfig;
use crate::error::AlertRuleFormatError;
use crate::topology::Labels;

/// A single Prometheus alerting rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Alert name.
    pub alert: String,
    /// PromQL expression.
    pub expr: String,
    /// How long the expression must hold before the alert fires.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    /// Labels attached to fired alerts.
    #[serde(
        default,
        skip_serializing_if = "Labels::is_empty",
        deserialize_with = "scalar_map"
    )]
    pub labels: Labels,
    /// Annotations attached to fired alerts.
    #[serde(
        default,
        skip_serializing_if = "Labels::is_empty",
        deserialize_with = "scalar_map"
    )]
    pub annotations: Labels,
}

impl AlertRule {
    /// Creates a rule with no duration, labels or annotations.
    pub fn new(alert: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alert: alert.into(),
            expr: expr.into(),
            for_duration: None,
            labels: Labels::new(),
            annotations: Labels::new(),
        }
    }
}

/// A named group of alert rules evaluated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRuleGroup {
    /// Group name. Empty when the producer did not provide one.
    #[serde(default)]
    pub name: String,
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

impl AlertRuleGroup {
    /// Creates a group.
    pub fn new(name: impl Into<String>, rules: Vec<AlertRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }
}

/// A Prometheus rule file: `{"groups": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    /// Rule groups.
    #[serde(default)]
    pub groups: Vec<AlertRuleGroup>,
}

impl RuleFile {
    /// Wraps a list of groups.
    #[must_use]
    pub const fn new(groups: Vec<AlertRuleGroup>) -> Self {
        Self { groups }
    }

    /// Returns true if the file holds no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// The name and text of one rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSource {
    /// File name, possibly with a relative directory prefix.
    pub name: String,
    /// File contents.
    pub contents: String,
}

impl RuleSource {
    /// Creates a new rule source.
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Outcome of loading a set of rule files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleLoadReport {
    /// Groups from every file that loaded, in file order.
    pub groups: Vec<AlertRuleGroup>,
    /// One entry per file that was rejected.
    pub errors: Vec<AlertRuleFormatError>,
}

impl RuleLoadReport {
    /// Returns true if no file was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Loads alert rule groups from rule file sources.
///
/// Sources whose name does not carry a recognized rule extension are ignored.
#[must_use]
pub fn load_rule_files(sources: &[RuleSource], config: &ScrapeConfig) -> RuleLoadReport {
    let mut report = RuleLoadReport::default();
    for source in sources {
        if !config.is_rule_file(&source.name) {
            debug!(file = %source.name, "ignoring file without rule extension");
            continue;
        }
        match load_rule_file(source) {
            Ok(groups) => {
                debug!(file = %source.name, groups = groups.len(), "loaded alert rules");
                report.groups.extend(groups);
            }
            Err(e) => {
                warn!(file = %source.name, error = %e, "skipping invalid alert rule file");
                report.errors.push(e);
            }
        }
    }
    report
}

/// Parses one rule file in either dialect.
///
/// # Errors
///
/// Returns [`AlertRuleFormatError`] if the text is not YAML or matches
/// neither dialect.
pub fn load_rule_file(source: &RuleSource) -> Result<Vec<AlertRuleGroup>, AlertRuleFormatError> {
    let format_error = |reason: String| AlertRuleFormatError {
        file: source.name.clone(),
        reason,
    };

    let document: Value =
        serde_yaml::from_str(&source.contents).map_err(|e| format_error(e.to_string()))?;
    let Some(mapping) = document.as_mapping() else {
        return Err(format_error("top level must be a mapping".to_string()));
    };

    if mapping.contains_key("groups") {
        parse_groups(mapping).map_err(format_error)
    } else if mapping.contains_key("alert") && mapping.contains_key("expr") {
        let rule: AlertRule =
            serde_yaml::from_value(document.clone()).map_err(|e| format_error(e.to_string()))?;
        Ok(vec![AlertRuleGroup::new(
            group_name_for_file(&source.name),
            vec![rule],
        )])
    } else {
        Err(format_error(
            "expected a groups list or a single rule with alert and expr".to_string(),
        ))
    }
}

fn parse_groups(mapping: &Mapping) -> Result<Vec<AlertRuleGroup>, String> {
    let Some(groups) = mapping.get("groups").and_then(Value::as_sequence) else {
        return Err("groups must be a list".to_string());
    };

    let mut parsed = Vec::with_capacity(groups.len());
    for (i, group) in groups.iter().enumerate() {
        let name = group
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("group {i} has no name"))?;
        let rules = group
            .get("rules")
            .and_then(Value::as_sequence)
            .ok_or_else(|| format!("group {name} has no rules list"))?;

        let rules = rules
            .iter()
            .enumerate()
            .map(|(j, rule)| {
                serde_yaml::from_value::<AlertRule>(rule.clone())
                    .map_err(|e| format!("group {name} rule {j}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        parsed.push(AlertRuleGroup::new(name, rules));
    }
    Ok(parsed)
}

/// Group name for a single-rule file: directories and stem joined by `_`.
fn group_name_for_file(name: &str) -> String {
    let path = Path::new(name);
    let mut parts: Vec<String> = path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if let Some(stem) = path.file_stem() {
        parts.push(stem.to_string_lossy().into_owned());
    }
    parts.join("_")
}

/// Label and annotation values may be written as bare YAML scalars.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<Labels, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Scalar>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.into_string()))
        .collect())
}
