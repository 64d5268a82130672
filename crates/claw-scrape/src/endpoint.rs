//! Forwarding for applications that announce bare scrape endpoints.
//!
//! Some applications do not publish scrape jobs. Each of their units only
//! sets a `hostname` and `port`, and optionally a YAML list of alert rules
//! under `groups`. An [`EndpointAggregator`] running in the same model turns
//! those into one scrape job and one rule group per application, labeled
//! with the unit topology, and republishes them as a single bundle.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::ScrapeConfig;
use crate::error::{AlertRuleFormatError, Result, ScrapeError};
use crate::job::{ScrapeJobSpec, StaticConfig};
use crate::relation::{RelationData, RelationDataBundle};
use crate::rules::{AlertRule, AlertRuleGroup, RuleFile};
use crate::targets::instance_relabel_config;
use crate::topology::{JUJU_UNIT, Topology};

/// Unit key holding the host name or address.
pub const HOSTNAME_KEY: &str = "hostname";
/// Unit key holding the metrics port.
pub const PORT_KEY: &str = "port";
/// Unit key holding a YAML list of alert rules.
pub const GROUPS_KEY: &str = "groups";
/// Port used when a unit does not announce one.
pub const DEFAULT_PORT: &str = "80";
/// Target label carrying the unit's host name.
pub const HOST_LABEL: &str = "host";

/// Characters of the model UUID used in job and group names.
const SHORT_UUID_LEN: usize = 7;

/// Unit name to that unit's relation data.
pub type UnitData = BTreeMap<String, RelationData>;

/// Where one unit exposes its metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    /// Unit name.
    pub unit: String,
    /// Host name or address.
    pub hostname: String,
    /// Metrics port.
    pub port: String,
}

impl EndpointTarget {
    /// `host:port` address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Reads the endpoint of every unit that announced a host name.
#[must_use]
pub fn endpoint_targets(units: &UnitData) -> Vec<EndpointTarget> {
    let present = |data: &RelationData, key: &str| {
        data.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    units
        .iter()
        .filter_map(|(unit, data)| {
            let Some(hostname) = present(data, HOSTNAME_KEY) else {
                debug!(unit = %unit, "skipping unit without hostname");
                return None;
            };
            Some(EndpointTarget {
                unit: unit.clone(),
                hostname,
                port: present(data, PORT_KEY).unwrap_or_else(|| DEFAULT_PORT.to_string()),
            })
        })
        .collect()
}

/// Outcome of an alert rule update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUpdate {
    /// Whether the published groups changed.
    pub changed: bool,
    /// Units whose rules could not be parsed; `file` names the unit.
    pub errors: Vec<AlertRuleFormatError>,
}

/// Scrape jobs and rule groups gathered from endpoint-only applications.
#[derive(Debug, Clone)]
pub struct EndpointAggregator {
    model: String,
    model_uuid: String,
    config: ScrapeConfig,
    jobs: Vec<ScrapeJobSpec>,
    groups: Vec<AlertRuleGroup>,
}

impl EndpointAggregator {
    /// Creates an aggregator for applications in the given model.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` if the model or its UUID is
    /// empty.
    pub fn new(
        model: impl Into<String>,
        model_uuid: impl Into<String>,
        config: &ScrapeConfig,
    ) -> Result<Self> {
        let model = model.into();
        let model_uuid = model_uuid.into();
        for (part, value) in [("model", &model), ("model_uuid", &model_uuid)] {
            if value.trim().is_empty() {
                return Err(ScrapeError::InvalidTopology {
                    reason: format!("{part} cannot be empty"),
                });
            }
        }
        Ok(Self {
            model,
            model_uuid,
            config: config.clone(),
            jobs: Vec::new(),
            groups: Vec::new(),
        })
    }

    /// Name of the scrape job for `application`.
    #[must_use]
    pub fn job_name(&self, application: &str) -> String {
        format!("{}_prometheus_scrape", self.name_prefix(application))
    }

    /// Name of the rule group for `application`.
    #[must_use]
    pub fn group_name(&self, application: &str) -> String {
        format!("{}_alert_rules", self.name_prefix(application))
    }

    fn name_prefix(&self, application: &str) -> String {
        let short_uuid: String = self.model_uuid.chars().take(SHORT_UUID_LEN).collect();
        format!("juju_{}_{short_uuid}_{application}", self.model)
    }

    fn topology(&self, application: &str) -> Result<Topology> {
        Topology::new(&self.model, &self.model_uuid, application)
    }

    /// Builds the scrape job for one application: one static config per
    /// target, labeled with its unit topology and host.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` if `application` is empty.
    pub fn static_scrape_job(
        &self,
        application: &str,
        targets: &[EndpointTarget],
    ) -> Result<ScrapeJobSpec> {
        let topology = self.topology(application)?;
        let static_configs = targets
            .iter()
            .map(|target| {
                let mut static_config = StaticConfig::new([target.address()]);
                static_config.labels = topology.clone().with_unit(&target.unit).label_set();
                static_config.label(HOST_LABEL, &target.hostname)
            })
            .collect();

        let relabel_configs = if self.config.relabel_instance {
            vec![instance_relabel_config(true)]
        } else {
            Vec::new()
        };

        Ok(ScrapeJobSpec {
            job_name: Some(self.job_name(application)),
            static_configs,
            relabel_configs,
            ..ScrapeJobSpec::default()
        })
    }

    /// Rebuilds the job of `application` from its current unit data.
    ///
    /// Applications without any announced host keep their previous job.
    /// Returns true if the job list changed.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` if `application` is empty.
    pub fn update_targets(&mut self, application: &str, units: &UnitData) -> Result<bool> {
        let targets = endpoint_targets(units);
        if targets.is_empty() {
            debug!(application = %application, "no scrape targets announced");
            return Ok(false);
        }
        let job = self.static_scrape_job(application, &targets)?;
        let before = self.jobs.clone();
        self.jobs.retain(|existing| existing.job_name != job.job_name);
        self.jobs.push(job);
        Ok(self.jobs != before)
    }

    /// Drops the targets of a departed unit, and the whole job once no
    /// target is left.
    ///
    /// Returns true if the job list changed.
    pub fn remove_unit_targets(&mut self, application: &str, unit: &str) -> bool {
        let job_name = self.job_name(application);
        let Some(position) = self
            .jobs
            .iter()
            .position(|job| job.job_name.as_deref() == Some(job_name.as_str()))
        else {
            return false;
        };

        let mut job = self.jobs.remove(position);
        let before = job.static_configs.len();
        job.static_configs
            .retain(|sc| sc.labels.get(JUJU_UNIT).map(String::as_str) != Some(unit));
        let pruned = job.static_configs.len() != before;

        if job.static_configs.is_empty() {
            debug!(job = %job_name, "dropping scrape job without targets");
        } else if pruned {
            self.jobs.push(job);
        } else {
            self.jobs.insert(position, job);
        }
        pruned
    }

    /// Rebuilds the rule group of `application` from its current unit data.
    ///
    /// Every rule gets the topology labels of the unit that announced it.
    /// Units whose rules fail to parse are skipped and reported. When no unit
    /// announces any rule, the previous group is kept.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` if `application` is empty.
    pub fn update_alert_rules(
        &mut self,
        application: &str,
        units: &UnitData,
    ) -> Result<RuleUpdate> {
        let topology = self.topology(application)?;
        let mut update = RuleUpdate::default();
        let mut rules = Vec::new();

        for (unit, data) in units {
            let Some(text) = data.get(GROUPS_KEY).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match serde_yaml::from_str::<Option<Vec<AlertRule>>>(text) {
                Ok(unit_rules) => {
                    let labels = topology.clone().with_unit(unit).label_set();
                    for mut rule in unit_rules.unwrap_or_default() {
                        rule.labels.extend(labels.clone());
                        rules.push(rule);
                    }
                }
                Err(e) => {
                    warn!(unit = %unit, error = %e, "skipping unparsable unit alert rules");
                    update.errors.push(AlertRuleFormatError {
                        file: unit.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if rules.is_empty() {
            return Ok(update);
        }
        let group = AlertRuleGroup::new(self.group_name(application), rules);
        let before = self.groups.clone();
        self.groups.retain(|existing| existing.name != group.name);
        self.groups.push(group);
        update.changed = self.groups != before;
        Ok(update)
    }

    /// Drops the rules of a departed unit, and the whole group once no rule
    /// is left.
    ///
    /// Returns true if the groups changed.
    pub fn remove_unit_rules(&mut self, application: &str, unit: &str) -> bool {
        let group_name = self.group_name(application);
        let Some(position) = self.groups.iter().position(|g| g.name == group_name) else {
            return false;
        };

        let mut group = self.groups.remove(position);
        let before = group.rules.len();
        group
            .rules
            .retain(|rule| rule.labels.get(JUJU_UNIT).map(String::as_str) != Some(unit));
        let pruned = group.rules.len() != before;

        if group.rules.is_empty() {
            debug!(group = %group_name, "dropping rule group without rules");
        } else if pruned {
            self.groups.push(group);
        } else {
            self.groups.insert(position, group);
        }
        pruned
    }

    /// Drops everything a departed unit contributed.
    ///
    /// Returns true if jobs or groups changed.
    pub fn remove_unit(&mut self, application: &str, unit: &str) -> bool {
        let targets = self.remove_unit_targets(application, unit);
        let rules = self.remove_unit_rules(application, unit);
        targets || rules
    }

    /// Rebuilds all jobs and groups from scratch, in application order.
    ///
    /// `targets` and `rules` map application names to their unit data.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` for an empty application name.
    pub fn replace_all(
        &mut self,
        targets: &BTreeMap<String, UnitData>,
        rules: &BTreeMap<String, UnitData>,
    ) -> Result<RuleUpdate> {
        let before = (self.jobs.clone(), self.groups.clone());
        self.jobs.clear();
        self.groups.clear();

        for (application, units) in targets {
            self.update_targets(application, units)?;
        }
        let mut update = RuleUpdate::default();
        for (application, units) in rules {
            let rule_update = self.update_alert_rules(application, units)?;
            update.errors.extend(rule_update.errors);
        }
        update.changed = (self.jobs.clone(), self.groups.clone()) != before;
        Ok(update)
    }

    /// Current scrape jobs.
    #[must_use]
    pub fn jobs(&self) -> &[ScrapeJobSpec] {
        &self.jobs
    }

    /// Current rule groups.
    #[must_use]
    pub fn groups(&self) -> &[AlertRuleGroup] {
        &self.groups
    }

    /// Builds the bundle to publish towards consumers.
    ///
    /// Jobs and rules already carry their topology labels, so the bundle has
    /// no topology of its own and no units.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::Serialization` if a job fails to serialize.
    pub fn bundle(&self) -> Result<RelationDataBundle> {
        let jobs = self
            .jobs
            .iter()
            .map(ScrapeJobSpec::to_json)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(RelationDataBundle {
            topology: None,
            jobs,
            alert_rules: RuleFile::new(self.groups.clone()),
            units: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{JUJU_APPLICATION, JUJU_MODEL, JUJU_MODEL_UUID};

    const UUID: &str = "12de4fae-06cc-4ceb-9089-567be09fec78";

    fn aggregator() -> EndpointAggregator {
        EndpointAggregator::new("lma", UUID, &ScrapeConfig::default()).unwrap()
    }

    fn unit(pairs: &[(&str, &str)]) -> RelationData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn target_units() -> UnitData {
        UnitData::from([
            (
                "cassandra/0".to_string(),
                unit(&[(HOSTNAME_KEY, "10.1.0.1"), (PORT_KEY, "9500")]),
            ),
            (
                "cassandra/1".to_string(),
                unit(&[(HOSTNAME_KEY, "10.1.0.2")]),
            ),
            ("cassandra/2".to_string(), unit(&[(PORT_KEY, "9500")])),
        ])
    }

    const UNIT_RULES: &str = r"
- alert: HighRequestLatency
  expr: job:request_latency_seconds:mean5m{job='myjob'} > 0.5
  for: 10m
  labels:
    severity: page
  annotations:
    summary: High request latency
";

    fn rule_units() -> UnitData {
        UnitData::from([
            ("cassandra/0".to_string(), unit(&[(GROUPS_KEY, UNIT_RULES)])),
            ("cassandra/1".to_string(), unit(&[(GROUPS_KEY, UNIT_RULES)])),
        ])
    }

    mod target_tests {
        use super::*;

        #[test]
        fn port_defaults_and_hostless_units_are_skipped() {
            let targets = endpoint_targets(&target_units());
            let addresses: Vec<_> = targets.iter().map(EndpointTarget::address).collect();
            assert_eq!(addresses, ["10.1.0.1:9500", "10.1.0.2:80"]);
        }

        #[test]
        fn names_use_short_uuid() {
            let agg = aggregator();
            assert_eq!(
                agg.job_name("cassandra"),
                "juju_lma_12de4fa_cassandra_prometheus_scrape"
            );
            assert_eq!(
                agg.group_name("cassandra"),
                "juju_lma_12de4fa_cassandra_alert_rules"
            );
        }

        #[test]
        fn empty_model_is_rejected() {
            let err = EndpointAggregator::new("", UUID, &ScrapeConfig::default()).unwrap_err();
            assert!(matches!(err, ScrapeError::InvalidTopology { .. }));
        }
    }

    mod job_tests {
        use super::*;

        #[test]
        fn job_has_one_labeled_static_config_per_unit() {
            let mut agg = aggregator();
            assert!(agg.update_targets("cassandra", &target_units()).unwrap());
            assert_eq!(agg.jobs().len(), 1);

            let job = &agg.jobs()[0];
            assert_eq!(
                job.job_name.as_deref(),
                Some("juju_lma_12de4fa_cassandra_prometheus_scrape")
            );
            assert_eq!(job.static_configs.len(), 2);

            let first = &job.static_configs[0];
            assert_eq!(first.targets, ["10.1.0.1:9500"]);
            assert_eq!(first.labels[JUJU_MODEL], "lma");
            assert_eq!(first.labels[JUJU_MODEL_UUID], UUID);
            assert_eq!(first.labels[JUJU_APPLICATION], "cassandra");
            assert_eq!(first.labels[JUJU_UNIT], "cassandra/0");
            assert_eq!(first.labels[HOST_LABEL], "10.1.0.1");
            assert_eq!(job.static_configs[1].labels[JUJU_UNIT], "cassandra/1");

            assert_eq!(job.relabel_configs, vec![instance_relabel_config(true)]);
        }

        #[test]
        fn relabel_can_be_disabled() {
            let config = ScrapeConfig {
                relabel_instance: false,
                ..ScrapeConfig::default()
            };
            let mut agg = EndpointAggregator::new("lma", UUID, &config).unwrap();
            agg.update_targets("cassandra", &target_units()).unwrap();
            assert!(agg.jobs()[0].relabel_configs.is_empty());
        }

        #[test]
        fn update_replaces_job_of_same_application() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            agg.update_targets("kafka", &target_units()).unwrap();

            let mut units = target_units();
            units.remove("cassandra/1");
            assert!(agg.update_targets("cassandra", &units).unwrap());

            let names: Vec<_> = agg
                .jobs()
                .iter()
                .filter_map(|j| j.job_name.as_deref())
                .collect();
            assert_eq!(
                names,
                [
                    "juju_lma_12de4fa_kafka_prometheus_scrape",
                    "juju_lma_12de4fa_cassandra_prometheus_scrape"
                ]
            );
            assert_eq!(agg.jobs()[1].static_configs.len(), 1);
            assert!(!agg.update_targets("cassandra", &units).unwrap());
        }

        #[test]
        fn units_without_hosts_leave_jobs_alone() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            let hostless = UnitData::from([("cassandra/0".to_string(), unit(&[]))]);
            assert!(!agg.update_targets("cassandra", &hostless).unwrap());
            assert_eq!(agg.jobs()[0].static_configs.len(), 2);
        }

        #[test]
        fn empty_application_is_rejected() {
            let mut agg = aggregator();
            assert!(agg.update_targets("", &target_units()).is_err());
        }
    }

    mod departure_tests {
        use super::*;

        #[test]
        fn departed_unit_targets_are_pruned() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            assert!(agg.remove_unit_targets("cassandra", "cassandra/0"));

            let job = &agg.jobs()[0];
            assert_eq!(job.static_configs.len(), 1);
            assert_eq!(job.static_configs[0].labels[JUJU_UNIT], "cassandra/1");
        }

        #[test]
        fn job_is_dropped_with_last_unit() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            agg.remove_unit_targets("cassandra", "cassandra/0");
            assert!(agg.remove_unit_targets("cassandra", "cassandra/1"));
            assert!(agg.jobs().is_empty());
        }

        #[test]
        fn unknown_unit_or_application_is_a_no_op() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            assert!(!agg.remove_unit_targets("cassandra", "cassandra/9"));
            assert!(!agg.remove_unit_targets("kafka", "kafka/0"));
            assert_eq!(agg.jobs()[0].static_configs.len(), 2);
        }

        #[test]
        fn remove_unit_prunes_rules_too() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            agg.update_alert_rules("cassandra", &rule_units()).unwrap();

            assert!(agg.remove_unit("cassandra", "cassandra/0"));
            assert_eq!(agg.jobs()[0].static_configs.len(), 1);
            assert_eq!(agg.groups()[0].rules.len(), 1);
            assert_eq!(agg.groups()[0].rules[0].labels[JUJU_UNIT], "cassandra/1");

            assert!(agg.remove_unit("cassandra", "cassandra/1"));
            assert!(agg.jobs().is_empty());
            assert!(agg.groups().is_empty());
        }
    }

    mod rule_tests {
        use super::*;

        #[test]
        fn rules_get_unit_topology_labels() {
            let mut agg = aggregator();
            let update = agg.update_alert_rules("cassandra", &rule_units()).unwrap();
            assert!(update.changed);
            assert!(update.errors.is_empty());

            let group = &agg.groups()[0];
            assert_eq!(group.name, "juju_lma_12de4fa_cassandra_alert_rules");
            assert_eq!(group.rules.len(), 2);

            let rule = &group.rules[0];
            assert_eq!(rule.alert, "HighRequestLatency");
            assert_eq!(rule.for_duration.as_deref(), Some("10m"));
            assert_eq!(rule.labels["severity"], "page");
            assert_eq!(rule.labels[JUJU_MODEL], "lma");
            assert_eq!(rule.labels[JUJU_MODEL_UUID], UUID);
            assert_eq!(rule.labels[JUJU_APPLICATION], "cassandra");
            assert_eq!(rule.labels[JUJU_UNIT], "cassandra/0");
            assert_eq!(group.rules[1].labels[JUJU_UNIT], "cassandra/1");
        }

        #[test]
        fn forged_topology_labels_are_overwritten() {
            let forged = "- alert: A\n  expr: up == 0\n  labels:\n    juju_unit: other/7\n";
            let data = unit(&[(GROUPS_KEY, forged)]);
            let units = UnitData::from([("cassandra/0".to_string(), data)]);
            let mut agg = aggregator();
            agg.update_alert_rules("cassandra", &units).unwrap();
            assert_eq!(agg.groups()[0].rules[0].labels[JUJU_UNIT], "cassandra/0");
        }

        #[test]
        fn unparsable_unit_is_reported_others_kept() {
            let mut units = rule_units();
            units.insert(
                "cassandra/2".to_string(),
                unit(&[(GROUPS_KEY, "- alert: [")]),
            );
            let mut agg = aggregator();
            let update = agg.update_alert_rules("cassandra", &units).unwrap();
            assert_eq!(update.errors.len(), 1);
            assert_eq!(update.errors[0].file, "cassandra/2");
            assert_eq!(agg.groups()[0].rules.len(), 2);
        }

        #[test]
        fn no_rules_keeps_previous_group() {
            let mut agg = aggregator();
            agg.update_alert_rules("cassandra", &rule_units()).unwrap();
            let blank = UnitData::from([("cassandra/0".to_string(), unit(&[(GROUPS_KEY, "")]))]);
            let update = agg.update_alert_rules("cassandra", &blank).unwrap();
            assert!(!update.changed);
            assert_eq!(agg.groups()[0].rules.len(), 2);
        }
    }

    mod publish_tests {
        use std::collections::BTreeMap;

        use super::*;
        use crate::aggregator::merge;
        use crate::relation::{SCRAPE_METADATA_KEY, decode_bundle, encode_app_data};

        #[test]
        fn replace_all_rebuilds_from_scratch() {
            let mut agg = aggregator();
            agg.update_targets("stale", &target_units()).unwrap();

            let targets = BTreeMap::from([("cassandra".to_string(), target_units())]);
            let rules = BTreeMap::from([("cassandra".to_string(), rule_units())]);
            let update = agg.replace_all(&targets, &rules).unwrap();
            assert!(update.changed);
            assert_eq!(agg.jobs().len(), 1);
            assert_eq!(agg.groups().len(), 1);

            assert!(!agg.replace_all(&targets, &rules).unwrap().changed);
        }

        #[test]
        fn consumer_keeps_forwarded_jobs_as_published() {
            let mut agg = aggregator();
            agg.update_targets("cassandra", &target_units()).unwrap();
            agg.update_alert_rules("cassandra", &rule_units()).unwrap();

            let data = encode_app_data(&agg.bundle().unwrap()).unwrap();
            assert!(!data.contains_key(SCRAPE_METADATA_KEY));

            let bundles = BTreeMap::from([(
                "forwarder".to_string(),
                decode_bundle(&data, &[]).unwrap(),
            )]);
            let merged = merge(&bundles, &ScrapeConfig::default());
            assert_eq!(merged.jobs, agg.jobs());
            assert_eq!(merged.alerts.groups, agg.groups());
        }
    }
}
