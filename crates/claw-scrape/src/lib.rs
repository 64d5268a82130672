//! Scrape job and alert rule aggregation with Juju topology labeling.
//!
//! `claw-scrape` implements both ends of a metrics-endpoint relation:
//!
//! - **Producers** declare scrape jobs and alert rules. Wildcard targets
//!   (`*:port`) are expanded to every unit address, targets are labeled with
//!   the producer's topology, and every alert expression is scoped to the
//!   producer with `juju_*` matchers.
//! - **Rules providers** forward alert rules that apply across applications,
//!   without publishing any scrape job.
//! - **Endpoint aggregators** republish applications that only announce a
//!   host and port per unit, as one labeled job and rule group each.
//! - **Consumers** merge every producer's published data into one job list
//!   and one rule file, with unique job and group names, and get notified
//!   whenever the merged output changes.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use claw_scrape::{
//!     Aggregator, RuleSource, ScrapeConfig, ScrapeProducer, Topology, UnitAddress,
//!     decode_bundle, encode_app_data, encode_unit_data,
//! };
//! use serde_json::json;
//!
//! let config = ScrapeConfig::default();
//!
//! // Producer side
//! let topology = Topology::new("lma", "1234", "api")?;
//! let jobs = [json!({"static_configs": [{"targets": ["*:8000"]}]})];
//! let rules = [RuleSource::new("latency.rule", "alert: Slow\nexpr: latency_seconds > 1\n")];
//! let (producer, _report) = ScrapeProducer::new(topology, &jobs, &rules, &config)?;
//! let units = [UnitAddress::new("api/0", "10.1.0.4")];
//! let (bundle, _injection) = producer.bundle(&units)?;
//!
//! let app_data = encode_app_data(&bundle)?;
//! let unit_data: Vec<_> = units.iter().map(encode_unit_data).collect();
//!
//! // Consumer side
//! let mut aggregator = Aggregator::new(config);
//! aggregator.upsert("api", decode_bundle(&app_data, &unit_data)?);
//!
//! assert_eq!(aggregator.jobs()[0].job_name.as_deref(), Some("api_scrape_job_0"));
//! assert_eq!(aggregator.jobs()[0].static_configs[0].targets, ["10.1.0.4:8000"]);
//! assert!(aggregator.alerts().groups[0].rules[0].expr.contains("juju_application=\"api\""));
//! # Ok::<(), claw_scrape::ScrapeError>(())
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/claw-scrape/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregator;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod job;
pub mod producer;
pub mod promql;
pub mod relation;
pub mod rules;
pub mod targets;
pub mod topology;

// Re-export main types at crate root
pub use aggregator::{
    Aggregator, ChangeNotifier, ChangeTrigger, ConfigChange, LogNotifier, MergedConfig, merge,
};
pub use config::ScrapeConfig;
pub use endpoint::{EndpointAggregator, EndpointTarget, RuleUpdate, UnitData};
pub use error::{AlertRuleFormatError, PromqlError, Result, ScrapeError, ValidationError};
pub use job::{ScrapeJobSpec, StaticConfig, normalize_job, normalize_jobs};
pub use producer::{RulesProvider, ScrapeProducer};
pub use promql::{InjectionReport, InjectionWarning, inject_groups, inject_matchers};
pub use relation::{
    RelationData, RelationDataBundle, decode_bundle, encode_app_data, encode_unit_data,
};
pub use rules::{
    AlertRule, AlertRuleGroup, RuleFile, RuleLoadReport, RuleSource, load_rule_file,
    load_rule_files,
};
pub use targets::{Target, UnitAddress, resolve_job, resolve_targets};
pub use topology::{Labels, Topology};
