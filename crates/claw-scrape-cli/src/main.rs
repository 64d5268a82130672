//! `claw-scrape` binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use claw_scrape_cli::cli::{Cli, Commands};
use claw_scrape_cli::commands::{AggregateCommand, PublishCommand};
use claw_scrape_cli::files::load_config;
use claw_scrape_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), claw_scrape_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let config = load_config(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Publish(args) => {
            PublishCommand::new(&config).execute(&mut stdout, &format, &args)?;
        }
        Commands::Aggregate(args) => {
            AggregateCommand::new(&config).execute(&mut stdout, &format, &args)?;
        }
    }

    Ok(())
}
