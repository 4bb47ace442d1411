//! Naming context and settings handed to every collector instance.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{error::CollectorError, types::CollectorResult};
use crate::core::metric::{unix_now, MetricEvent, PathCodec, RawTimestamp};

/// Where a collector's metrics live in the path hierarchy.
///
/// Every event a collector emits is named
/// `<prefix>.<hostname>.<path>.<metric>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorContext {
    pub prefix: String,
    pub hostname: String,
    pub path: String,
}

impl CollectorContext {
    pub fn new(
        prefix: impl Into<String>,
        hostname: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        CollectorContext {
            prefix: prefix.into(),
            hostname: hostname.into(),
            path: path.into(),
        }
    }

    /// Full path of a metric emitted by this collector.
    pub fn metric_path(&self, metric: &str) -> String {
        PathCodec::compose(&self.prefix, &self.hostname, &self.path, metric)
    }

    /// Builds a measurement event stamped with the current time.
    pub fn event(&self, metric: &str, value: f64) -> CollectorResult<MetricEvent> {
        self.event_at(metric, value, unix_now())
    }

    /// Builds a measurement event with an explicit timestamp.
    pub fn event_at(&self, metric: &str, value: f64, timestamp: i64) -> CollectorResult<MetricEvent> {
        let host = (!self.hostname.is_empty()).then_some(self.hostname.as_str());
        Ok(MetricEvent::measurement(
            &self.metric_path(metric),
            value,
            Some(RawTimestamp::Integer(timestamp)),
            host,
        )?)
    }

    /// Builds an event carrying arbitrary `fields` rather than one value.
    pub fn record_at(
        &self,
        metric: &str,
        fields: Map<String, Value>,
        timestamp: i64,
    ) -> CollectorResult<MetricEvent> {
        let host = (!self.hostname.is_empty()).then_some(self.hostname.as_str());
        Ok(MetricEvent::new(
            Some(&self.metric_path(metric)),
            Some(Value::Object(fields)),
            Some(RawTimestamp::Integer(timestamp)),
            host,
        )?)
    }
}

/// Everything a collector factory receives.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub context: CollectorContext,
    /// Collector-specific options from the `options` table of its config entry.
    pub options: toml::Table,
}

impl CollectorSettings {
    pub fn new(context: CollectorContext, options: toml::Table) -> Self {
        CollectorSettings { context, options }
    }

    /// Deserializes the option table into the collector's own options type.
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::InvalidOptions` naming `collector` if the table
    /// does not match `T`.
    pub fn options<T: DeserializeOwned>(&self, collector: &str) -> CollectorResult<T> {
        toml::Value::Table(self.options.clone())
            .try_into()
            .map_err(|e: toml::de::Error| CollectorError::InvalidOptions {
                collector: collector.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Compiles a regex taken from collector options.
pub(crate) fn compile_option_regex(
    collector: &str,
    option: &str,
    pattern: &str,
) -> CollectorResult<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| CollectorError::InvalidOptions {
        collector: collector.to_string(),
        reason: format!("{} = {:?}: {}", option, pattern, e),
    })
}
