//! CLI command implementations.
//!
//! - [`publish`] - Producer relation data
//! - [`aggregate`] - Consumer-side merge

pub mod aggregate;
pub mod publish;

pub use aggregate::AggregateCommand;
pub use publish::PublishCommand;
