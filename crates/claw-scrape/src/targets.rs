//! Wildcard target resolution.
//!
//! A job target whose host is `*` stands for "every unit of this
//! application". Resolution replaces it with one concrete address per known
//! unit and attaches topology labels to every target, so scraped series can
//! be traced back to the application (and unit) they came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ScrapeConfig;
use crate::job::{RelabelConfig, ScrapeJobSpec, StaticConfig};
use crate::topology::{
    JUJU_APPLICATION, JUJU_MODEL, JUJU_MODEL_UUID, JUJU_UNIT, Labels, Topology,
};

/// Host placeholder expanded to every unit address.
pub const WILDCARD_HOST: &str = "*";

/// A unit name together with the address it published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitAddress {
    /// Unit name, e.g. `app/0`.
    pub name: String,
    /// Host name or IP address of the unit.
    pub address: String,
}

impl UnitAddress {
    /// Creates a new unit address pair.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A concrete scrape target and the labels attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// `host:port` address.
    pub address: String,
    /// Labels attached to the target.
    pub labels: Labels,
}

impl Target {
    /// The unit this target was expanded for, if it came from a wildcard.
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        self.labels.get(JUJU_UNIT).map(String::as_str)
    }
}

/// How a single target string is to be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetSpec<'a> {
    /// Expand per unit, keeping the port if there is one.
    Wildcard(Option<&'a str>),
    /// Use the address as given.
    Literal(&'a str),
}

impl<'a> TargetSpec<'a> {
    fn parse(target: &'a str) -> Self {
        match target.rsplit_once(':') {
            Some((host, port)) if host.trim() == WILDCARD_HOST => {
                Self::Wildcard(Some(port.trim()).filter(|p| !p.is_empty()))
            }
            None if target.trim() == WILDCARD_HOST => Self::Wildcard(None),
            _ => Self::Literal(target),
        }
    }
}

fn unit_target(unit: &UnitAddress, port: Option<&str>) -> String {
    match port {
        Some(port) => format!("{}:{port}", unit.address),
        None => unit.address.clone(),
    }
}

/// Static configs for one input entry: literals first, then one per unit.
fn resolve_static_config(
    static_config: &StaticConfig,
    topology_labels: &Labels,
    units: &[UnitAddress],
) -> Vec<StaticConfig> {
    let mut labels = static_config.labels.clone();
    labels.extend(topology_labels.clone());

    let mut ports = Vec::new();
    let mut literals = Vec::new();
    for target in &static_config.targets {
        match TargetSpec::parse(target) {
            TargetSpec::Wildcard(port) => ports.push(port),
            TargetSpec::Literal(address) => literals.push(address.to_string()),
        }
    }

    let mut resolved = Vec::new();
    if !literals.is_empty() {
        resolved.push(StaticConfig {
            targets: literals,
            labels: labels.clone(),
        });
    }
    if !ports.is_empty() {
        for unit in units {
            let mut unit_labels = labels.clone();
            unit_labels.insert(JUJU_UNIT.to_string(), unit.name.clone());
            resolved.push(StaticConfig {
                targets: ports.iter().map(|port| unit_target(unit, *port)).collect(),
                labels: unit_labels,
            });
        }
    }
    resolved
}

/// Expands every target of `job` into concrete [`Target`]s.
///
/// Per static config, literal targets come first in their original order,
/// followed by wildcard expansions in unit order.
#[must_use]
pub fn resolve_targets(
    job: &ScrapeJobSpec,
    topology: &Topology,
    units: &[UnitAddress],
) -> Vec<Target> {
    let topology_labels = topology.application_scope().label_set();
    job.static_configs
        .iter()
        .flat_map(|sc| resolve_static_config(sc, &topology_labels, units))
        .flat_map(|sc| {
            let labels = sc.labels;
            sc.targets.into_iter().map(move |address| Target {
                address,
                labels: labels.clone(),
            })
        })
        .collect()
}

/// Resolves all wildcard targets of `job` and labels every static config.
///
/// Resolving an already resolved job yields the same job.
#[must_use]
pub fn resolve_job(
    job: &ScrapeJobSpec,
    topology: &Topology,
    units: &[UnitAddress],
    config: &ScrapeConfig,
) -> ScrapeJobSpec {
    let topology_labels = topology.application_scope().label_set();
    let static_configs: Vec<StaticConfig> = job
        .static_configs
        .iter()
        .flat_map(|sc| resolve_static_config(sc, &topology_labels, units))
        .collect();

    let mut relabel_configs = job.relabel_configs.clone();
    if config.relabel_instance {
        let with_unit = static_configs
            .iter()
            .any(|sc| sc.labels.contains_key(JUJU_UNIT));
        let instance = instance_relabel_config(with_unit);
        if !relabel_configs.contains(&instance) {
            relabel_configs.push(instance);
        }
    }

    ScrapeJobSpec {
        static_configs,
        relabel_configs,
        ..job.clone()
    }
}

/// Relabel config deriving a stable `instance` label from topology labels.
#[must_use]
pub fn instance_relabel_config(with_unit: bool) -> RelabelConfig {
    let mut source_labels = vec![JUJU_MODEL, JUJU_MODEL_UUID, JUJU_APPLICATION];
    if with_unit {
        source_labels.push(JUJU_UNIT);
    }
    let source_labels = source_labels
        .into_iter()
        .map(|label| Value::String(label.to_string()))
        .collect();

    let mut relabel = RelabelConfig::new();
    relabel.insert("source_labels".to_string(), Value::Array(source_labels));
    relabel.insert("separator".to_string(), Value::from("_"));
    relabel.insert("target_label".to_string(), Value::from("instance"));
    relabel.insert("regex".to_string(), Value::from("(.*)"));
    relabel
}
