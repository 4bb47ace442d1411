//! Configuration structures for metric collection.
//!
//! This module defines which collectors run, how often a cycle runs, and the
//! naming context (`path_prefix` and `hostname`) every metric path is built from.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::{Validate, ValidationError};

/// Files consulted for the kernel hostname, in order.
const HOSTNAME_SOURCES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// One configured collector instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CollectorConfig {
    /// Registry name of the collector. Must not be empty.
    #[validate(length(min = 1, message = "Collector name must not be empty"))]
    pub name: String,

    /// Path segment of the collector's metrics; the collector's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_segment"))]
    pub path: Option<String>,

    /// Collector-specific options, deserialized by the collector itself.
    #[serde(default)]
    pub options: toml::Table,
}

impl CollectorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        CollectorConfig {
            name: name.into(),
            path: None,
            options: toml::Table::new(),
        }
    }
}

/// Top-level metrics configuration container.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Leading segment of every metric path.
    #[validate(custom(function = "validate_segment"))]
    pub path_prefix: String,

    /// Host segment of every metric path. Resolved from the kernel when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_segment"))]
    pub hostname: Option<String>,

    /// Interval (in seconds) between collection cycles.
    ///
    /// Must be at least 1 second.
    #[validate(range(min = 1, message = "Collection interval must be at least 1 second"))]
    pub collection_interval: u64,

    /// Collectors run every cycle.
    #[validate(nested)]
    pub collectors: Vec<CollectorConfig>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path_prefix: "servers".into(),
            hostname: None,
            collection_interval: 60,
            collectors: Vec::new(),
        }
    }
}

impl MetricsConfig {
    /// Configured collector names, in configuration order.
    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name.as_str()).collect()
    }

    /// The configured hostname, else the kernel hostname, else `localhost`.
    pub fn resolve_hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        HOSTNAME_SOURCES
            .iter()
            .find_map(|source| read_hostname(Path::new(source)))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

fn read_hostname(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            // Only the short name; a dotted FQDN would split the path.
            let name = content.trim().split('.').next().unwrap_or_default();
            (!name.is_empty()).then(|| name.to_string())
        }
        Err(e) => {
            debug!("Could not read hostname from {}: {}", path.display(), e);
            None
        }
    }
}

/// A path segment must not be empty, contain whitespace, or start/end with a dot.
fn validate_segment(segment: &str) -> Result<(), ValidationError> {
    if segment.is_empty()
        || segment.starts_with('.')
        || segment.ends_with('.')
        || segment.chars().any(char::is_whitespace)
    {
        let mut err = ValidationError::new("invalid_path_segment");
        err.message = Some(format!("'{}' is not a valid metric path segment", segment).into());
        return Err(err);
    }
    Ok(())
}
