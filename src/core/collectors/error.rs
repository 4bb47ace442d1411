use thiserror::Error;

use crate::core::metric::MetricError;

/// Custom error type for the collector system.
/// Uses `thiserror` for context-rich error messages; every variant names
/// the external resource that failed so the cycle log is actionable.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The external command could not be spawned.
    #[error("Command '{command}' failed: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external command ran but exited unsuccessfully.
    #[error("Command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Encountered a parsing error while extracting a metric.
    /// Provides the metric name, where it was found, and a reason for the failure.
    #[error("Failed to parse {metric} from {location}: {reason}")]
    ParseError {
        metric: String,
        location: String,
        reason: String,
    },

    /// The external command did not finish in time and was killed.
    #[error("Command '{command}' did not finish within {after:?}")]
    Timeout {
        command: String,
        after: std::time::Duration,
    },

    /// Data was found but did not conform to the expected format.
    #[error("Invalid format in {location}: {reason}")]
    InvalidFormat { location: String, reason: String },

    /// Could not reach a service endpoint.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A service answered with something other than the expected reply.
    #[error("Protocol error from {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    /// A Redis connection or command failed.
    #[cfg(feature = "collector-redisuploadqueue")]
    #[error("Redis {operation} on {endpoint} failed: {source}")]
    Redis {
        endpoint: String,
        operation: String,
        #[source]
        source: redis::RedisError,
    },

    /// The `options` table of a collector could not be used.
    #[error("Invalid options for collector '{collector}': {reason}")]
    InvalidOptions { collector: String, reason: String },

    /// Tried to access a collector by name, but it was not registered.
    #[error("Collector not found for: {0}")]
    CollectorNotFound(String),

    /// Building or naming a metric failed.
    #[error(transparent)]
    Metric(#[from] MetricError),
}
