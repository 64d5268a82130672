//! Aggregate command implementation.
//!
//! Merges the relation data of every producer into one scrape job list and
//! one rule file, and reports whether the result changed since a previous run.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use claw_scrape::{
    Aggregator, MergedConfig, RelationData, RelationDataBundle, ScrapeConfig, decode_bundle,
};

use crate::cli::AggregateArgs;
use crate::error::CliError;
use crate::files::read_json;
use crate::output::{AggregateOutput, OutputFormat};

/// Relation data of one producer as stored in the relations file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerData {
    /// Application-level data.
    #[serde(default)]
    pub app: RelationData,
    /// Per-unit data.
    #[serde(default)]
    pub units: Vec<RelationData>,
}

/// Handler for the aggregate command.
pub struct AggregateCommand<'a> {
    config: &'a ScrapeConfig,
}

impl<'a> AggregateCommand<'a> {
    /// Creates a new aggregate command handler.
    #[must_use]
    pub const fn new(config: &'a ScrapeConfig) -> Self {
        Self { config }
    }

    /// Executes the aggregate command.
    ///
    /// # Errors
    ///
    /// Returns an error if the relations or previous file cannot be read.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &AggregateArgs,
    ) -> Result<(), CliError> {
        let relations: BTreeMap<String, ProducerData> = read_json(&args.relations)?;
        let previous = args.previous.as_deref().map(read_previous).transpose()?;
        let output = self.aggregate(&relations, previous.as_ref());
        format.write(out, &output)
    }

    /// Merges decoded relation data, skipping producers that fail to decode.
    #[must_use]
    pub fn aggregate(
        &self,
        relations: &BTreeMap<String, ProducerData>,
        previous: Option<&MergedConfig>,
    ) -> AggregateOutput {
        let mut bundles: BTreeMap<String, RelationDataBundle> = BTreeMap::new();
        let mut skipped = Vec::new();
        for (producer, data) in relations {
            match decode_bundle(&data.app, &data.units) {
                Ok(bundle) => {
                    bundles.insert(producer.clone(), bundle);
                }
                Err(e) => {
                    warn!(producer = %producer, error = %e, "skipping undecodable producer");
                    skipped.push(producer.clone());
                }
            }
        }

        let mut aggregator = Aggregator::new(self.config.clone());
        aggregator.replace_all(bundles);
        let merged = aggregator.merged().clone();

        AggregateOutput {
            changed: previous != Some(&merged),
            jobs: merged.jobs,
            alerts: merged.alerts,
            skipped,
        }
    }
}

fn read_previous(path: &Path) -> Result<MergedConfig, CliError> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_scrape::relation::{
        SCRAPE_JOBS_KEY, SCRAPE_METADATA_KEY, UNIT_ADDRESS_KEY, UNIT_NAME_KEY,
    };

    fn producer(application: &str) -> ProducerData {
        ProducerData {
            app: RelationData::from([
                (
                    SCRAPE_METADATA_KEY.to_string(),
                    format!(r#"{{"model":"m","model_uuid":"u","application":"{application}"}}"#),
                ),
                (
                    SCRAPE_JOBS_KEY.to_string(),
                    r#"[{"static_configs":[{"targets":["*:9100"]}]}]"#.to_string(),
                ),
            ]),
            units: vec![RelationData::from([
                (UNIT_NAME_KEY.to_string(), format!("{application}/0")),
                (UNIT_ADDRESS_KEY.to_string(), "10.0.0.1".to_string()),
            ])],
        }
    }

    #[test]
    fn merges_producers() {
        let config = ScrapeConfig::default();
        let relations = BTreeMap::from([
            ("a".to_string(), producer("appA")),
            ("b".to_string(), producer("appB")),
        ]);
        let output = AggregateCommand::new(&config).aggregate(&relations, None);
        let names: Vec<_> = output
            .jobs
            .iter()
            .filter_map(|j| j.job_name.as_deref())
            .collect();
        assert_eq!(names, ["appA_scrape_job_0", "appB_scrape_job_0"]);
        assert_eq!(output.jobs[0].static_configs[0].targets, ["10.0.0.1:9100"]);
        assert!(output.changed);
    }

    #[test]
    fn undecodable_producer_is_skipped() {
        let config = ScrapeConfig::default();
        let mut broken = producer("appB");
        broken.app.insert(SCRAPE_JOBS_KEY.to_string(), "[{".to_string());
        let relations = BTreeMap::from([
            ("a".to_string(), producer("appA")),
            ("b".to_string(), broken),
        ]);
        let output = AggregateCommand::new(&config).aggregate(&relations, None);
        assert_eq!(output.jobs.len(), 1);
        assert_eq!(output.skipped, ["b"]);
    }

    #[test]
    fn unchanged_against_previous() {
        let config = ScrapeConfig::default();
        let relations = BTreeMap::from([("a".to_string(), producer("appA"))]);
        let command = AggregateCommand::new(&config);
        let first = command.aggregate(&relations, None);
        let previous = MergedConfig {
            jobs: first.jobs,
            alerts: first.alerts,
        };
        let second = command.aggregate(&relations, Some(&previous));
        assert!(!second.changed);
    }
}
