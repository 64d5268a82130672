//! Publish command implementation.
//!
//! Builds the relation data one producer application publishes: its scrape
//! jobs with resolved targets, its alert rules scoped to its topology, and
//! one address map per unit. With `--rules-only` the rules are forwarded
//! alone, unscoped, and no scrape job is published.

use std::io::Write;

use serde_json::Value;
use tracing::info;

use claw_scrape::{
    RuleSource, RulesProvider, ScrapeConfig, ScrapeProducer, Topology, encode_app_data,
    encode_unit_data,
};

use crate::cli::PublishArgs;
use crate::error::CliError;
use crate::files::{read_json, read_rule_dir};
use crate::output::{OutputFormat, PublishOutput};

/// Handler for the publish command.
pub struct PublishCommand<'a> {
    config: &'a ScrapeConfig,
}

impl<'a> PublishCommand<'a> {
    /// Creates a new publish command handler.
    #[must_use]
    pub const fn new(config: &'a ScrapeConfig) -> Self {
        Self { config }
    }

    /// Executes the publish command.
    ///
    /// # Errors
    ///
    /// Returns an error if an input file cannot be read, the topology is
    /// incomplete, or a job spec is invalid.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &PublishArgs,
    ) -> Result<(), CliError> {
        let output = self.build(args)?;
        format.write(out, &output)
    }

    /// Builds the relation data without writing it.
    ///
    /// # Errors
    ///
    /// See [`PublishCommand::execute`].
    pub fn build(&self, args: &PublishArgs) -> Result<PublishOutput, CliError> {
        let rule_files: Vec<RuleSource> = match &args.rules {
            Some(dir) => read_rule_dir(dir, args.recursive, self.config)?,
            None => Vec::new(),
        };
        if args.rules_only {
            return self.build_rules_only(&rule_files);
        }

        let mut topology = Topology::new(
            required(args.model.as_deref(), "model")?,
            required(args.model_uuid.as_deref(), "model-uuid")?,
            required(args.application.as_deref(), "application")?,
        )?;
        if let Some(charm) = &args.charm {
            topology = topology.with_charm(charm);
        }

        let jobs = match &args.jobs {
            Some(path) => match read_json::<Value>(path)? {
                Value::Array(jobs) => jobs,
                other => {
                    return Err(CliError::InvalidArgument(format!(
                        "{} must hold a list of job specs, got {}",
                        path.display(),
                        json_kind(&other)
                    )));
                }
            },
            None => Vec::new(),
        };

        let (producer, load_report) =
            ScrapeProducer::new(topology, &jobs, &rule_files, self.config)?;
        let (bundle, injection) = producer.bundle(&args.units)?;

        let mut warnings: Vec<String> =
            load_report.errors.iter().map(ToString::to_string).collect();
        warnings.extend(
            injection
                .warnings
                .iter()
                .map(|w| format!("{} / {}: {}", w.group, w.alert, w.error)),
        );

        info!(
            application = %producer.topology().application,
            jobs = bundle.jobs.len(),
            groups = bundle.alert_rules.groups.len(),
            units = bundle.units.len(),
            "built producer relation data"
        );

        Ok(PublishOutput {
            app: encode_app_data(&bundle)?,
            units: bundle.units.iter().map(encode_unit_data).collect(),
            warnings,
        })
    }

    fn build_rules_only(&self, rule_files: &[RuleSource]) -> Result<PublishOutput, CliError> {
        let (provider, load_report) = RulesProvider::new(rule_files, self.config);
        let bundle = provider.bundle();

        info!(
            groups = bundle.alert_rules.groups.len(),
            "built rules provider relation data"
        );

        Ok(PublishOutput {
            app: encode_app_data(&bundle)?,
            units: Vec::new(),
            warnings: load_report.errors.iter().map(ToString::to_string).collect(),
        })
    }
}

fn required<'v>(value: Option<&'v str>, flag: &str) -> Result<&'v str, CliError> {
    value.ok_or_else(|| CliError::InvalidArgument(format!("--{flag} is required")))
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
