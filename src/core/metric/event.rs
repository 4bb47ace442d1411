//! The immutable measurement record handed from collectors to handlers.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    error::{MetricError, MetricResult},
    path::PathCodec,
};

/// Timestamp as supplied by a caller, before coercion to integer seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Integer(value)
    }
}

impl From<f64> for RawTimestamp {
    fn from(value: f64) -> Self {
        RawTimestamp::Float(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(value: String) -> Self {
        RawTimestamp::Text(value)
    }
}

impl RawTimestamp {
    /// Coerces the timestamp to whole seconds. Floats truncate toward zero,
    /// text must hold an integer.
    fn coerce(&self, path: &str) -> MetricResult<i64> {
        match self {
            RawTimestamp::Integer(seconds) => Ok(*seconds),
            RawTimestamp::Float(seconds) if seconds.is_finite() => Ok(seconds.trunc() as i64),
            RawTimestamp::Float(seconds) => Err(MetricError::validation(
                path,
                format!("timestamp {} is not a finite number", seconds),
            )),
            RawTimestamp::Text(text) => text.trim().parse::<i64>().map_err(|e| {
                MetricError::validation(path, format!("invalid timestamp {:?}: {}", text, e))
            }),
        }
    }
}

/// Current wall-clock time in whole seconds since the epoch.
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// A single time-stamped observation identified by a hierarchical path.
///
/// Fields are private so the path can never change after construction;
/// the decomposition accessors are pure projections of `path` and `host`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    path: String,
    fields: Map<String, Value>,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
}

impl MetricEvent {
    /// Builds an event from loosely-typed inputs.
    ///
    /// `fields` must be a JSON object (or absent, meaning empty). A missing
    /// timestamp defaults to the current time.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::Validation`] if the path is absent or empty,
    /// `fields` is not a mapping, or the timestamp cannot be coerced.
    pub fn new(
        path: Option<&str>,
        fields: Option<Value>,
        timestamp: Option<RawTimestamp>,
        host: Option<&str>,
    ) -> MetricResult<Self> {
        let path = match path {
            Some(path) if !path.is_empty() => path,
            _ => return Err(MetricError::validation("", "event requires a non-empty path")),
        };

        let fields = match fields {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(MetricError::validation(
                    path,
                    format!("fields must be a mapping, got {}", kind_of(&other)),
                ))
            }
        };

        let timestamp = match timestamp {
            None => unix_now(),
            Some(raw) => raw.coerce(path)?,
        };

        Ok(MetricEvent {
            path: path.to_string(),
            fields,
            timestamp,
            host: host.map(str::to_string),
        })
    }

    /// Builds an event carrying one numeric observation under `fields["value"]`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::Validation`] for an empty path or a non-finite value.
    pub fn measurement(
        path: &str,
        value: f64,
        timestamp: Option<RawTimestamp>,
        host: Option<&str>,
    ) -> MetricResult<Self> {
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            MetricError::validation(path, format!("value {} is not a finite number", value))
        })?;
        let mut fields = Map::new();
        fields.insert("value".to_string(), Value::Number(number));
        Self::new(Some(path), Some(Value::Object(fields)), timestamp, host)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The numeric `value` field, if present.
    pub fn value(&self) -> Option<f64> {
        self.fields.get("value").and_then(Value::as_f64)
    }

    /// See [`PathCodec::prefix`].
    pub fn path_prefix(&self) -> MetricResult<&str> {
        PathCodec::prefix(&self.path, self.host())
    }

    /// See [`PathCodec::collector_segment`].
    pub fn collector_path(&self) -> MetricResult<&str> {
        PathCodec::collector_segment(&self.path, self.host())
    }

    /// See [`PathCodec::metric_suffix`].
    pub fn metric_path(&self) -> MetricResult<&str> {
        PathCodec::metric_suffix(&self.path, self.host())
    }
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.path,
            Value::Object(self.fields.clone()),
            self.timestamp
        )
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
