//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use claw_scrape::UnitAddress;

/// Publish and aggregate Prometheus scrape jobs and alert rules.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-scrape")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// JSON file with scrape settings.
    #[arg(short, long, env = "CLAW_SCRAPE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the relation data a producer publishes.
    Publish(PublishArgs),

    /// Merge relation data from every producer.
    Aggregate(AggregateArgs),
}

/// Arguments for the publish command.
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Model name.
    #[arg(long, required_unless_present = "rules_only")]
    pub model: Option<String>,

    /// Model UUID.
    #[arg(long, required_unless_present = "rules_only")]
    pub model_uuid: Option<String>,

    /// Application name.
    #[arg(long, required_unless_present = "rules_only")]
    pub application: Option<String>,

    /// Charm name.
    #[arg(long)]
    pub charm: Option<String>,

    /// JSON file holding a list of scrape job specs.
    #[arg(long)]
    pub jobs: Option<PathBuf>,

    /// Directory with alert rule files.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Also read rule files from subdirectories.
    #[arg(short, long, requires = "rules")]
    pub recursive: bool,

    /// Unit name and address.
    #[arg(short, long = "unit", value_name = "NAME=ADDRESS", value_parser = parse_unit)]
    pub units: Vec<UnitAddress>,

    /// Forward the alert rules alone, unscoped and without any scrape job.
    #[arg(
        long,
        requires = "rules",
        conflicts_with_all = ["model", "model_uuid", "application", "charm", "jobs", "units"]
    )]
    pub rules_only: bool,
}

/// Arguments for the aggregate command.
#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    /// JSON file mapping producer keys to `{"app": {...}, "units": [...]}`.
    #[arg(long)]
    pub relations: PathBuf,

    /// JSON output of an earlier aggregate run to compare against.
    #[arg(long)]
    pub previous: Option<PathBuf>,
}

/// Parses `NAME=ADDRESS`.
fn parse_unit(s: &str) -> Result<UnitAddress, String> {
    match s.split_once('=') {
        Some((name, address)) if !name.is_empty() && !address.is_empty() => {
            Ok(UnitAddress::new(name, address))
        }
        _ => Err(format!("expected NAME=ADDRESS, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unit_splits_on_first_equals() {
        let unit = parse_unit("app/0=10.0.0.1").unwrap();
        assert_eq!(unit, UnitAddress::new("app/0", "10.0.0.1"));
    }

    #[test]
    fn parse_unit_rejects_missing_parts() {
        assert!(parse_unit("app/0").is_err());
        assert!(parse_unit("=10.0.0.1").is_err());
        assert!(parse_unit("app/0=").is_err());
    }

    #[test]
    fn cli_parses_publish() {
        let cli = Cli::parse_from([
            "claw-scrape",
            "publish",
            "--model",
            "m",
            "--model-uuid",
            "u",
            "--application",
            "app",
            "--unit",
            "app/0=10.0.0.1",
            "-u",
            "app/1=10.0.0.2",
        ]);
        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.application.as_deref(), Some("app"));
                assert_eq!(args.units.len(), 2);
                assert!(!args.recursive);
                assert!(!args.rules_only);
            }
            Commands::Aggregate(_) => panic!("expected publish command"),
        }
    }

    #[test]
    fn recursive_requires_rules() {
        let result = Cli::try_parse_from([
            "claw-scrape",
            "publish",
            "--model",
            "m",
            "--model-uuid",
            "u",
            "--application",
            "app",
            "--recursive",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn topology_is_required_without_rules_only() {
        let result = Cli::try_parse_from(["claw-scrape", "publish", "--rules", "rules"]);
        assert!(result.is_err());
    }

    #[test]
    fn rules_only_needs_no_topology() {
        let cli = Cli::parse_from([
            "claw-scrape",
            "publish",
            "--rules-only",
            "--rules",
            "rules",
            "--recursive",
        ]);
        match cli.command {
            Commands::Publish(args) => {
                assert!(args.rules_only);
                assert!(args.recursive);
                assert_eq!(args.model, None);
            }
            Commands::Aggregate(_) => panic!("expected publish command"),
        }
    }

    #[test]
    fn rules_only_requires_rules() {
        let result = Cli::try_parse_from(["claw-scrape", "publish", "--rules-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn rules_only_conflicts_with_jobs() {
        let result = Cli::try_parse_from([
            "claw-scrape",
            "publish",
            "--rules-only",
            "--rules",
            "rules",
            "--jobs",
            "jobs.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn format_flag_after_subcommand() {
        let cli = Cli::parse_from([
            "claw-scrape",
            "aggregate",
            "--relations",
            "r.json",
            "-f",
            "json",
        ]);
        assert_eq!(cli.format, Format::Json);
    }
}
