//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;

use claw_scrape::{RelationData, RuleFile, ScrapeJobSpec};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Relation data a producer publishes.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutput {
    /// Application-level relation data.
    pub app: RelationData,
    /// Per-unit relation data.
    pub units: Vec<RelationData>,
    /// Rule files and expressions that were skipped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TableDisplay for PublishOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Application Data")?;
        writeln!(writer, "══════════════════════════════════")?;
        write_data(writer, &self.app)?;

        for (i, unit) in self.units.iter().enumerate() {
            writeln!(writer)?;
            writeln!(writer, "Unit {i}")?;
            writeln!(writer, "{}", "─".repeat(34))?;
            write_data(writer, unit)?;
        }

        if !self.warnings.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Warnings")?;
            for warning in &self.warnings {
                writeln!(writer, "  {warning}")?;
            }
        }
        Ok(())
    }
}

fn write_data<W: Write>(writer: &mut W, data: &RelationData) -> Result<(), CliError> {
    for (key, value) in data {
        writeln!(writer, "{key}:")?;
        writeln!(writer, "  {value}")?;
    }
    Ok(())
}

/// Merged configuration from every producer.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateOutput {
    /// Merged scrape jobs.
    pub jobs: Vec<ScrapeJobSpec>,
    /// Merged alert rules.
    pub alerts: RuleFile,
    /// Whether the result differs from the previous run.
    pub changed: bool,
    /// Producers whose data could not be decoded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl TableDisplay for AggregateOutput {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.jobs.is_empty() {
            writeln!(writer, "No scrape jobs")?;
        } else {
            writeln!(
                writer,
                "{:<40}  {:<16}  {:>7}",
                "JOB", "METRICS PATH", "TARGETS"
            )?;
            writeln!(writer, "{}", "─".repeat(67))?;
            for job in &self.jobs {
                let targets: usize = job.static_configs.iter().map(|sc| sc.targets.len()).sum();
                writeln!(
                    writer,
                    "{:<40}  {:<16}  {:>7}",
                    truncate(job.job_name.as_deref().unwrap_or("-"), 40),
                    truncate(&job.metrics_path, 16),
                    targets
                )?;
            }
        }

        writeln!(writer)?;
        if self.alerts.is_empty() {
            writeln!(writer, "No alert rule groups")?;
        } else {
            writeln!(writer, "{:<40}  {:>5}", "GROUP", "RULES")?;
            writeln!(writer, "{}", "─".repeat(47))?;
            for group in &self.alerts.groups {
                writeln!(
                    writer,
                    "{:<40}  {:>5}",
                    truncate(&group.name, 40),
                    group.rules.len()
                )?;
            }
        }

        writeln!(writer)?;
        for producer in &self.skipped {
            writeln!(writer, "Skipped producer: {producer}")?;
        }
        let changed = if self.changed { "yes" } else { "no" };
        writeln!(writer, "Changed: {changed}")?;
        Ok(())
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
