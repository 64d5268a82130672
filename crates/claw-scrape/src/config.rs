//! Tunables shared by the producer and consumer sides.

use serde::{Deserialize, Serialize};

/// Configuration for loading, resolving and merging scrape configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// File extensions (without the dot) recognized as alert rule files.
    pub rule_extensions: Vec<String>,
    /// Whether resolved jobs get a relabel config deriving `instance` from topology.
    pub relabel_instance: bool,
    /// Whether the consumer re-applies topology matchers to received rules.
    pub reinject_on_consume: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            rule_extensions: vec!["rule".to_string(), "rules".to_string()],
            relabel_instance: true,
            reinject_on_consume: true,
        }
    }
}

impl ScrapeConfig {
    /// Returns true if `name` ends in one of the recognized rule extensions.
    #[must_use]
    pub fn is_rule_file(&self, name: &str) -> bool {
        std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.rule_extensions.iter().any(|e| e == ext))
    }
}
