//! Juju topology: the identity of a producer and the labels derived from it.
//!
//! A [`Topology`] names the model, model UUID and application a piece of
//! configuration came from, and optionally the unit. Its label projections
//! are what scopes scrape targets and alert expressions to their source.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ScrapeError};

/// Label name → label value mapping, ordered for stable output.
pub type Labels = BTreeMap<String, String>;

/// Label carrying the model name.
pub const JUJU_MODEL: &str = "juju_model";
/// Label carrying the model UUID.
pub const JUJU_MODEL_UUID: &str = "juju_model_uuid";
/// Label carrying the application name.
pub const JUJU_APPLICATION: &str = "juju_application";
/// Label carrying the unit name.
pub const JUJU_UNIT: &str = "juju_unit";
/// Label carrying the charm name.
pub const JUJU_CHARM: &str = "juju_charm";

/// Identity of a producer instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topology {
    /// Model name.
    pub model: String,
    /// Globally unique model identifier.
    pub model_uuid: String,
    /// Application name.
    pub application: String,
    /// Unit name, only set when describing one unit instance.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub unit: Option<String>,
    /// Charm name, when known.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub charm_name: Option<String>,
}

impl Topology {
    /// Creates an application-level topology.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` if any part is empty.
    pub fn new(
        model: impl Into<String>,
        model_uuid: impl Into<String>,
        application: impl Into<String>,
    ) -> Result<Self> {
        let topology = Self {
            model: model.into(),
            model_uuid: model_uuid.into(),
            application: application.into(),
            unit: None,
            charm_name: None,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Sets the unit name.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into()).filter(|u| !u.is_empty());
        self
    }

    /// Sets the charm name.
    #[must_use]
    pub fn with_charm(mut self, charm_name: impl Into<String>) -> Self {
        self.charm_name = Some(charm_name.into()).filter(|c| !c.is_empty());
        self
    }

    /// Checks that model, model UUID and application are all set.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` naming the first empty part.
    pub fn validate(&self) -> Result<()> {
        for (part, value) in [
            ("model", &self.model),
            ("model_uuid", &self.model_uuid),
            ("application", &self.application),
        ] {
            if value.trim().is_empty() {
                return Err(ScrapeError::InvalidTopology {
                    reason: format!("{part} cannot be empty"),
                });
            }
        }
        Ok(())
    }

    /// The same topology without a unit, as used for application-wide data.
    #[must_use]
    pub fn application_scope(&self) -> Self {
        Self {
            unit: None,
            ..self.clone()
        }
    }

    /// Terse identifier `<model>_<model_uuid>_<application>`.
    ///
    /// Slashes are replaced so the identifier can double as a file name.
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}_{}_{}", self.model, self.model_uuid, self.application).replace('/', "_")
    }

    /// The three matchers injected into alert expressions, in injection order.
    #[must_use]
    pub fn matcher_labels(&self) -> [(&'static str, &str); 3] {
        [
            (JUJU_MODEL, self.model.as_str()),
            (JUJU_MODEL_UUID, self.model_uuid.as_str()),
            (JUJU_APPLICATION, self.application.as_str()),
        ]
    }

    /// All `juju_*` labels this topology carries.
    ///
    /// `juju_charm` and `juju_unit` are only present when known.
    #[must_use]
    pub fn label_set(&self) -> Labels {
        let mut labels: Labels = self
            .matcher_labels()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(charm) = &self.charm_name {
            labels.insert(JUJU_CHARM.to_string(), charm.clone());
        }
        if let Some(unit) = &self.unit {
            labels.insert(JUJU_UNIT.to_string(), unit.clone());
        }
        labels
    }

    /// Comma separated PromQL matcher list, e.g. `juju_model="m", ...`.
    #[must_use]
    pub fn promql_labels(&self) -> String {
        self.matcher_labels()
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.application)?;
        if let Some(unit) = &self.unit {
            write!(f, " ({unit})")?;
        }
        Ok(())
    }
}

/// Escapes a label value for use inside a double-quoted PromQL string.
#[must_use]
pub fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}
