//! The consuming side: merging every producer's bundle into one configuration.
//!
//! [`merge`] is a pure function of the current bundle set. [`Aggregator`]
//! wraps it with the latest bundles and the previous result, and notifies a
//! [`ChangeNotifier`] whenever an update changes the merged output.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ScrapeConfig;
use crate::error::Result;
use crate::job::{ScrapeJobSpec, normalize_job};
use crate::promql::inject_groups;
use crate::relation::RelationDataBundle;
use crate::rules::{AlertRuleGroup, RuleFile};
use crate::targets::resolve_job;

/// Stands in for the application name of producers without a topology.
pub const UNKNOWN_APPLICATION: &str = "unknown";

/// Merged output handed to the monitoring engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedConfig {
    /// Scrape jobs with unique names.
    #[serde(default)]
    pub jobs: Vec<ScrapeJobSpec>,
    /// Alert rule groups with unique names.
    #[serde(default)]
    pub alerts: RuleFile,
}

/// What triggered a recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeTrigger {
    /// A producer published new data.
    Upserted(String),
    /// A producer went away.
    Removed(String),
    /// The whole bundle set was replaced.
    Replaced,
}

impl fmt::Display for ChangeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upserted(producer) => write!(f, "upserted {producer}"),
            Self::Removed(producer) => write!(f, "removed {producer}"),
            Self::Replaced => write!(f, "replaced"),
        }
    }
}

/// Summary of a change to the merged configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// The update that caused the change.
    pub trigger: ChangeTrigger,
    /// Job names after the change.
    pub job_names: Vec<String>,
    /// Rule group names after the change.
    pub group_names: Vec<String>,
}

/// Receives merged configuration changes.
pub trait ChangeNotifier: Send + Sync + fmt::Debug {
    /// Returns the name of this notifier.
    fn name(&self) -> &str;

    /// Handles one change.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the change could not be delivered.
    /// The aggregator logs it and carries on.
    fn notify(&self, change: &ConfigChange) -> Result<()>;
}

/// Notifier that logs each change.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Creates a new log notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ChangeNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, change: &ConfigChange) -> Result<()> {
        info!(
            trigger = %change.trigger,
            jobs = change.job_names.len(),
            groups = change.group_names.len(),
            "scrape configuration changed"
        );
        Ok(())
    }
}

/// One producer's contribution before names are made unique.
struct Contribution {
    producer: String,
    application: String,
    jobs: Vec<ScrapeJobSpec>,
    groups: Vec<AlertRuleGroup>,
}

fn contribution(
    producer: &str,
    bundle: &RelationDataBundle,
    config: &ScrapeConfig,
) -> Contribution {
    let application = bundle
        .topology
        .as_ref()
        .map_or(UNKNOWN_APPLICATION, |t| t.application.as_str())
        .to_string();

    let mut jobs = Vec::with_capacity(bundle.jobs.len());
    for (index, raw) in bundle.jobs.iter().enumerate() {
        let mut job = match normalize_job(raw) {
            Ok(job) => job,
            Err(e) => {
                warn!(producer = %producer, index, error = %e, "dropping invalid scrape job");
                continue;
            }
        };
        if let Some(topology) = &bundle.topology {
            job = resolve_job(&job, topology, &bundle.units, config);
        }
        if job.job_name.is_none() {
            job.job_name = Some(format!("{application}_scrape_job_{index}"));
        }
        jobs.push(job);
    }

    let mut groups = match &bundle.topology {
        Some(topology) if config.reinject_on_consume => {
            inject_groups(&bundle.alert_rules.groups, topology).groups
        }
        _ => bundle.alert_rules.groups.clone(),
    };
    for (index, group) in groups.iter_mut().enumerate() {
        if group.name.is_empty() {
            group.name = format!("{application}_alert_rules_{index}");
        }
    }

    Contribution {
        producer: bundle
            .topology
            .as_ref()
            .map_or_else(|| producer.to_string(), |t| t.identifier()),
        application,
        jobs,
        groups,
    }
}

/// Renames every name that occurs more than once to
/// `<name>_<application>_<k>`, with the smallest `k` that is still free.
fn unique_names(entries: &[(String, &str)]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (name, _) in entries {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let mut used: BTreeSet<String> = entries.iter().map(|(name, _)| name.clone()).collect();

    entries
        .iter()
        .map(|(name, application)| {
            if counts.get(name.as_str()).copied().unwrap_or_default() < 2 {
                return name.clone();
            }
            let renamed = (0_usize..)
                .map(|k| format!("{name}_{application}_{k}"))
                .find(|candidate| !used.contains(candidate))
                .unwrap_or_else(|| name.clone());
            debug!(from = %name, to = %renamed, "renamed colliding entry");
            used.insert(renamed.clone());
            renamed
        })
        .collect()
}

/// Merged output plus the per-producer rule files.
fn merge_detailed(
    bundles: &BTreeMap<String, RelationDataBundle>,
    config: &ScrapeConfig,
) -> (MergedConfig, BTreeMap<String, RuleFile>) {
    let contributions: Vec<Contribution> = bundles
        .iter()
        .map(|(producer, bundle)| contribution(producer, bundle, config))
        .collect();

    let job_entries: Vec<(String, &str)> = contributions
        .iter()
        .flat_map(|c| {
            c.jobs
                .iter()
                .map(|job| (job.job_name.clone().unwrap_or_default(), c.application.as_str()))
        })
        .collect();
    let mut job_names = unique_names(&job_entries).into_iter();

    let group_entries: Vec<(String, &str)> = contributions
        .iter()
        .flat_map(|c| {
            c.groups
                .iter()
                .map(|group| (group.name.clone(), c.application.as_str()))
        })
        .collect();
    let mut group_names = unique_names(&group_entries).into_iter();

    let mut merged = MergedConfig::default();
    let mut by_producer: BTreeMap<String, RuleFile> = BTreeMap::new();
    for contribution in contributions {
        for mut job in contribution.jobs {
            job.job_name = job_names.next();
            merged.jobs.push(job);
        }
        let mut groups = contribution.groups;
        for group in &mut groups {
            if let Some(name) = group_names.next() {
                group.name = name;
            }
        }
        if !groups.is_empty() {
            by_producer
                .entry(contribution.producer)
                .or_default()
                .groups
                .extend(groups.iter().cloned());
        }
        merged.alerts.groups.extend(groups);
    }

    (merged, by_producer)
}

/// Merges all producer bundles, in producer key order.
///
/// Invalid jobs are dropped with a warning; they never hide a producer's
/// other jobs. Job and group names in the result are unique.
#[must_use]
pub fn merge(
    bundles: &BTreeMap<String, RelationDataBundle>,
    config: &ScrapeConfig,
) -> MergedConfig {
    merge_detailed(bundles, config).0
}

/// Stateful consumer keeping the merged view current.
#[derive(Debug)]
pub struct Aggregator {
    config: ScrapeConfig,
    bundles: BTreeMap<String, RelationDataBundle>,
    merged: MergedConfig,
    by_producer: BTreeMap<String, RuleFile>,
    notifier: Box<dyn ChangeNotifier>,
}

impl Aggregator {
    /// Creates an aggregator that logs changes.
    #[must_use]
    pub fn new(config: ScrapeConfig) -> Self {
        Self::with_notifier(config, Box::new(LogNotifier::new()))
    }

    /// Creates an aggregator with a custom notifier.
    #[must_use]
    pub fn with_notifier(config: ScrapeConfig, notifier: Box<dyn ChangeNotifier>) -> Self {
        Self {
            config,
            bundles: BTreeMap::new(),
            merged: MergedConfig::default(),
            by_producer: BTreeMap::new(),
            notifier,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Stores or replaces one producer's bundle.
    ///
    /// Returns true if the merged output changed.
    pub fn upsert(&mut self, producer: impl Into<String>, bundle: RelationDataBundle) -> bool {
        let producer = producer.into();
        self.bundles.insert(producer.clone(), bundle);
        self.recompute(ChangeTrigger::Upserted(producer))
    }

    /// Forgets a producer.
    ///
    /// Returns true if the merged output changed.
    pub fn remove(&mut self, producer: &str) -> bool {
        if self.bundles.remove(producer).is_none() {
            return false;
        }
        self.recompute(ChangeTrigger::Removed(producer.to_string()))
    }

    /// Replaces the whole bundle set.
    ///
    /// Returns true if the merged output changed.
    pub fn replace_all(&mut self, bundles: BTreeMap<String, RelationDataBundle>) -> bool {
        self.bundles = bundles;
        self.recompute(ChangeTrigger::Replaced)
    }

    /// Producer keys currently known.
    pub fn producers(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    /// Merged scrape jobs.
    #[must_use]
    pub fn jobs(&self) -> &[ScrapeJobSpec] {
        &self.merged.jobs
    }

    /// Merged alert rules.
    #[must_use]
    pub const fn alerts(&self) -> &RuleFile {
        &self.merged.alerts
    }

    /// The full merged snapshot.
    #[must_use]
    pub const fn merged(&self) -> &MergedConfig {
        &self.merged
    }

    /// Alert rules per producer, keyed by topology identifier.
    ///
    /// Producers without a topology are keyed by their producer key.
    #[must_use]
    pub const fn alerts_by_producer(&self) -> &BTreeMap<String, RuleFile> {
        &self.by_producer
    }

    fn recompute(&mut self, trigger: ChangeTrigger) -> bool {
        let (merged, by_producer) = merge_detailed(&self.bundles, &self.config);
        self.by_producer = by_producer;
        if merged == self.merged {
            debug!(trigger = %trigger, "merged scrape configuration unchanged");
            return false;
        }
        self.merged = merged;

        let change = ConfigChange {
            trigger,
            job_names: self
                .merged
                .jobs
                .iter()
                .filter_map(|job| job.job_name.clone())
                .collect(),
            group_names: self
                .merged
                .alerts
                .groups
                .iter()
                .map(|group| group.name.clone())
                .collect(),
        };
        if let Err(e) = self.notifier.notify(&change) {
            warn!(notifier = %self.notifier.name(), error = %e, "change notification failed");
        }
        true
    }
}
