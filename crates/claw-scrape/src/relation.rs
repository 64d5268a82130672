//! Relation data encoding.
//!
//! Producers and consumers exchange flat string maps: one application-level
//! map plus one map per unit. Every structured value is a JSON string.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::rules::RuleFile;
use crate::targets::UnitAddress;
use crate::topology::Topology;

/// App key holding the producer topology.
pub const SCRAPE_METADATA_KEY: &str = "scrape_metadata";
/// App key holding the scrape job list.
pub const SCRAPE_JOBS_KEY: &str = "scrape_jobs";
/// App key holding the rule file.
pub const ALERT_RULES_KEY: &str = "alert_rules";
/// Unit key holding the unit name.
pub const UNIT_NAME_KEY: &str = "prometheus_scrape_unit_name";
/// Unit key holding the unit address.
pub const UNIT_ADDRESS_KEY: &str = "prometheus_scrape_unit_address";
/// Older unit key for the address, read when [`UNIT_ADDRESS_KEY`] is absent.
pub const LEGACY_HOST_KEY: &str = "prometheus_scrape_host";

/// One relation data map.
pub type RelationData = BTreeMap<String, String>;

/// Everything one producer publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationDataBundle {
    /// Producer topology, absent for producers that never published one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    /// Raw scrape jobs; normalized by the consumer.
    #[serde(default)]
    pub jobs: Vec<Value>,
    /// Alert rules.
    #[serde(default)]
    pub alert_rules: RuleFile,
    /// Unit addresses.
    #[serde(default)]
    pub units: Vec<UnitAddress>,
}

/// Encodes the application-level part of a bundle.
///
/// `alert_rules` is left out when there are no groups, and
/// `scrape_metadata` when there is no topology.
///
/// # Errors
///
/// Returns `ScrapeError::Serialization` if a value fails to serialize.
pub fn encode_app_data(bundle: &RelationDataBundle) -> Result<RelationData> {
    let mut data = RelationData::new();
    if let Some(topology) = &bundle.topology {
        data.insert(
            SCRAPE_METADATA_KEY.to_string(),
            serde_json::to_string(topology)?,
        );
    }
    data.insert(
        SCRAPE_JOBS_KEY.to_string(),
        serde_json::to_string(&bundle.jobs)?,
    );
    if !bundle.alert_rules.is_empty() {
        data.insert(
            ALERT_RULES_KEY.to_string(),
            serde_json::to_string(&bundle.alert_rules)?,
        );
    }
    Ok(data)
}

/// Encodes one unit's data.
#[must_use]
pub fn encode_unit_data(unit: &UnitAddress) -> RelationData {
    RelationData::from([
        (UNIT_NAME_KEY.to_string(), unit.name.clone()),
        (UNIT_ADDRESS_KEY.to_string(), unit.address.clone()),
    ])
}

/// Decodes a bundle from application data and per-unit data.
///
/// Missing or empty keys decode to empty collections and no topology.
///
/// # Errors
///
/// Returns `ScrapeError::Codec` naming the key whose JSON is malformed, or
/// `ScrapeError::InvalidTopology` if the published topology is incomplete.
pub fn decode_bundle(app: &RelationData, units: &[RelationData]) -> Result<RelationDataBundle> {
    let topology: Option<Topology> = decode_key(app, SCRAPE_METADATA_KEY)?;
    if let Some(topology) = &topology {
        topology.validate()?;
    }

    Ok(RelationDataBundle {
        topology,
        jobs: decode_key(app, SCRAPE_JOBS_KEY)?.unwrap_or_default(),
        alert_rules: decode_key(app, ALERT_RULES_KEY)?.unwrap_or_default(),
        units: units.iter().filter_map(decode_unit).collect(),
    })
}

fn decode_key<T: DeserializeOwned>(data: &RelationData, key: &str) -> Result<Option<T>> {
    let Some(raw) = data.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ScrapeError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn decode_unit(data: &RelationData) -> Option<UnitAddress> {
    let present = |key: &str| data.get(key).filter(|v| !v.is_empty());
    let name = present(UNIT_NAME_KEY);
    let address = present(UNIT_ADDRESS_KEY).or_else(|| present(LEGACY_HOST_KEY));
    match (name, address) {
        (Some(name), Some(address)) => Some(UnitAddress::new(name, address)),
        _ => {
            debug!(name = ?name, "skipping unit without name or address");
            None
        }
    }
}
