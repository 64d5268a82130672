//! # claw-scrape-cli
//!
//! Command-line front end for `claw-scrape`.
//!
//! - `publish` builds the relation data a producer application publishes:
//!   resolved scrape jobs, topology-scoped alert rules and unit addresses.
//! - `aggregate` merges the relation data of many producers into one job list
//!   and one rule file, as a consumer would hand them to Prometheus.
//!
//! ```text
//! ┌──────────┐  relation data   ┌───────────┐   scrape_configs   ┌────────────┐
//! │ publish  │ ───────────────► │ aggregate │ ─────────────────► │ Prometheus │
//! └──────────┘  (JSON strings)  └───────────┘   + rule file      └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod files;
pub mod output;

pub use cli::{AggregateArgs, Cli, Commands, Format, PublishArgs};
pub use error::CliError;
pub use output::OutputFormat;
