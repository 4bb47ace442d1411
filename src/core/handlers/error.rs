use thiserror::Error;

use super::filter::FilterError;
use crate::core::metric::MetricError;

/// Errors raised while handing events to a sink.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The sink socket could not be set up.
    #[error("Failed to open socket to {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A single send failed. The event is dropped.
    #[error("Failed to send to {endpoint}: {source}")]
    Send {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The event path could not be decomposed.
    #[error(transparent)]
    Metric(#[from] MetricError),
}
