//! The producing side: applications publishing scrape jobs and alert rules.
//!
//! [`ScrapeProducer`] publishes an application's scrape jobs together with
//! its topology-scoped alert rules. [`RulesProvider`] publishes alert rules
//! alone.

use serde_json::Value;
use tracing::{debug, info};

use crate::config::ScrapeConfig;
use crate::error::Result;
use crate::job::{ScrapeJobSpec, normalize_jobs};
use crate::promql::{InjectionReport, inject_groups};
use crate::relation::RelationDataBundle;
use crate::rules::{AlertRuleGroup, RuleFile, RuleLoadReport, RuleSource, load_rule_files};
use crate::targets::{UnitAddress, resolve_job};
use crate::topology::Topology;

/// An application that exposes metrics and alert rules.
///
/// Jobs and rules are fixed at construction. Only the unit list changes over
/// the application's life, so [`ScrapeProducer::bundle`] is called again
/// whenever units join, leave or change address.
#[derive(Debug, Clone)]
pub struct ScrapeProducer {
    topology: Topology,
    jobs: Vec<ScrapeJobSpec>,
    groups: Vec<AlertRuleGroup>,
    config: ScrapeConfig,
}

impl ScrapeProducer {
    /// Creates a producer from raw job specs and rule file sources.
    ///
    /// The returned report lists rule files that were skipped.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::InvalidTopology` for an incomplete topology and
    /// `ScrapeError::Validation` for the first invalid job. Nothing is
    /// published in either case.
    pub fn new(
        topology: Topology,
        raw_jobs: &[Value],
        rule_files: &[RuleSource],
        config: &ScrapeConfig,
    ) -> Result<(Self, RuleLoadReport)> {
        topology.validate()?;
        let jobs = normalize_jobs(raw_jobs)?;
        let report = load_rule_files(rule_files, config);

        info!(
            topology = %topology,
            jobs = jobs.len(),
            groups = report.groups.len(),
            rejected_rule_files = report.errors.len(),
            "scrape producer ready"
        );

        let producer = Self {
            topology: topology.application_scope(),
            jobs,
            groups: report.groups.clone(),
            config: config.clone(),
        };
        Ok((producer, report))
    }

    /// Application topology of this producer.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Normalized, unresolved jobs.
    #[must_use]
    pub fn jobs(&self) -> &[ScrapeJobSpec] {
        &self.jobs
    }

    /// Alert rule groups as loaded, before injection.
    #[must_use]
    pub fn groups(&self) -> &[AlertRuleGroup] {
        &self.groups
    }

    /// Builds the bundle to publish for the current unit list.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError::Serialization` if a resolved job fails to
    /// serialize.
    pub fn bundle(&self, units: &[UnitAddress]) -> Result<(RelationDataBundle, InjectionReport)> {
        let jobs = self
            .jobs
            .iter()
            .map(|job| resolve_job(job, &self.topology, units, &self.config).to_json())
            .collect::<serde_json::Result<Vec<_>>>()?;
        let injection = inject_groups(&self.groups, &self.topology);

        debug!(
            topology = %self.topology,
            units = units.len(),
            "built relation data bundle"
        );

        let bundle = RelationDataBundle {
            topology: Some(self.topology.clone()),
            jobs,
            alert_rules: RuleFile::new(injection.groups.clone()),
            units: units.to_vec(),
        };
        Ok((bundle, injection))
    }
}

/// An application that forwards alert rules without exposing metrics.
///
/// The rules are meant to apply across every scraped application, so they
/// are published as loaded: no topology matchers, no topology labels and no
/// `scrape_metadata`. The job list is always empty, which keeps consumers from
/// scraping the forwarding application's units.
#[derive(Debug, Clone, Default)]
pub struct RulesProvider {
    groups: Vec<AlertRuleGroup>,
}

impl RulesProvider {
    /// Creates a provider from rule file sources.
    ///
    /// The returned report lists rule files that were skipped.
    #[must_use]
    pub fn new(rule_files: &[RuleSource], config: &ScrapeConfig) -> (Self, RuleLoadReport) {
        let report = load_rule_files(rule_files, config);
        info!(
            groups = report.groups.len(),
            rejected_rule_files = report.errors.len(),
            "rules provider ready"
        );
        let provider = Self {
            groups: report.groups.clone(),
        };
        (provider, report)
    }

    /// Alert rule groups to forward.
    #[must_use]
    pub fn groups(&self) -> &[AlertRuleGroup] {
        &self.groups
    }

    /// Builds the bundle to publish.
    #[must_use]
    pub fn bundle(&self) -> RelationDataBundle {
        RelationDataBundle {
            topology: None,
            jobs: Vec::new(),
            alert_rules: RuleFile::new(self.groups.clone()),
            units: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::topology::{JUJU_APPLICATION, JUJU_UNIT};
    use serde_json::json;

    fn topology() -> Topology {
        Topology::new("m", "u", "app").unwrap()
    }

    fn units() -> Vec<UnitAddress> {
        vec![
            UnitAddress::new("app/0", "10.0.0.1"),
            UnitAddress::new("app/1", "10.0.0.2"),
        ]
    }

    #[test]
    fn no_jobs_publishes_default_job() {
        let (producer, _) =
            ScrapeProducer::new(topology(), &[], &[], &ScrapeConfig::default()).unwrap();
        let (bundle, _) = producer.bundle(&units()).unwrap();
        assert_eq!(bundle.jobs.len(), 1);
        let targets: Vec<&str> = bundle.jobs[0]["static_configs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|sc| sc["targets"][0].as_str().unwrap())
            .collect();
        assert_eq!(targets, ["10.0.0.1:80", "10.0.0.2:80"]);
    }

    #[test]
    fn invalid_job_publishes_nothing() {
        let jobs = [json!({"job_name": "ok"}), json!({"honor_labels": true})];
        let err =
            ScrapeProducer::new(topology(), &jobs, &[], &ScrapeConfig::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::Validation(_)));
    }

    #[test]
    fn invalid_topology_is_rejected() {
        let mut t = topology();
        t.application.clear();
        assert!(ScrapeProducer::new(t, &[], &[], &ScrapeConfig::default()).is_err());
    }

    #[test]
    fn unit_is_stripped_from_topology() {
        let (producer, _) = ScrapeProducer::new(
            topology().with_unit("app/0"),
            &[],
            &[],
            &ScrapeConfig::default(),
        )
        .unwrap();
        let (bundle, _) = producer.bundle(&[]).unwrap();
        assert_eq!(bundle.topology.unwrap().unit, None);
    }

    #[test]
    fn rules_are_injected_and_bad_files_reported() {
        let sources = [
            RuleSource::new("down.rule", "alert: Down\nexpr: up == 0\n"),
            RuleSource::new("broken.rule", "alert: [\n"),
        ];
        let (producer, report) =
            ScrapeProducer::new(topology(), &[], &sources, &ScrapeConfig::default()).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file, "broken.rule");

        let (bundle, injection) = producer.bundle(&units()).unwrap();
        assert!(injection.warnings.is_empty());
        let rule = &bundle.alert_rules.groups[0].rules[0];
        assert!(rule.expr.contains(r#"juju_application="app""#));
        assert_eq!(rule.labels[JUJU_APPLICATION], "app");
        assert!(!rule.labels.contains_key(JUJU_UNIT));
    }

    #[test]
    fn unit_changes_only_affect_targets() {
        let (producer, _) =
            ScrapeProducer::new(topology(), &[], &[], &ScrapeConfig::default()).unwrap();
        let (before, _) = producer.bundle(&units()).unwrap();
        let (after, _) = producer.bundle(&units()[..1]).unwrap();
        assert_eq!(before.alert_rules, after.alert_rules);
        assert_eq!(after.jobs[0]["static_configs"].as_array().unwrap().len(), 1);
        assert_eq!(after.units.len(), 1);
    }

    mod rules_provider_tests {
        use std::collections::BTreeMap;

        use super::*;
        use crate::aggregator::merge;
        use crate::relation::{
            ALERT_RULES_KEY, SCRAPE_JOBS_KEY, SCRAPE_METADATA_KEY, decode_bundle,
            encode_app_data, encode_unit_data,
        };

        fn provider() -> RulesProvider {
            let sources = [
                RuleSource::new("global/down.rule", "alert: Down\nexpr: up == 0\n"),
                RuleSource::new("notes.txt", "not a rule"),
            ];
            let (provider, report) = RulesProvider::new(&sources, &ScrapeConfig::default());
            assert!(report.is_clean());
            provider
        }

        #[test]
        fn publishes_no_scrape_job() {
            let bundle = provider().bundle();
            assert!(bundle.jobs.is_empty());
            assert!(bundle.units.is_empty());

            let data = encode_app_data(&bundle).unwrap();
            assert_eq!(data[SCRAPE_JOBS_KEY], "[]");
            assert!(!data.contains_key(SCRAPE_METADATA_KEY));
            assert!(data.contains_key(ALERT_RULES_KEY));
        }

        #[test]
        fn rules_are_forwarded_unscoped() {
            let provider = provider();
            assert_eq!(provider.groups().len(), 1);
            let bundle = provider.bundle();
            let group = &bundle.alert_rules.groups[0];
            assert_eq!(group.name, "global_down");
            assert_eq!(group.rules[0].expr, "up == 0");
            assert!(group.rules[0].labels.is_empty());
        }

        #[test]
        fn consumer_scrapes_nothing_from_provider() {
            let data = encode_app_data(&provider().bundle()).unwrap();
            let units = [encode_unit_data(&UnitAddress::new("rules/0", "10.0.0.5"))];
            let decoded = decode_bundle(&data, &units).unwrap();

            let bundles = BTreeMap::from([("rules".to_string(), decoded)]);
            let merged = merge(&bundles, &ScrapeConfig::default());
            assert!(merged.jobs.is_empty());
            assert_eq!(merged.alerts.groups[0].rules[0].expr, "up == 0");
        }
    }
}
