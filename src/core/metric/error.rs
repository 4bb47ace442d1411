use thiserror::Error;

/// Errors raised by the metric representation layer.
///
/// Each variant maps to one failure class of the core: building an event
/// from bad inputs, decomposing a path that does not contain its host, and
/// walking a structure that nests deeper than the configured bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Event construction received inputs that cannot form a valid event.
    /// The caller must skip this single event.
    #[error("Invalid metric event {path:?}: {reason}")]
    Validation { path: String, reason: String },

    /// The host marker does not occur in the path being decomposed.
    #[error("Host {host:?} not found in metric path {path:?}")]
    MalformedPath { path: String, host: String },

    /// Flattening descended past the configured depth bound.
    #[error("Maximum traversal depth {max_depth} exceeded at {path:?}")]
    Traversal { path: String, max_depth: usize },
}

impl MetricError {
    pub(crate) fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        MetricError::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the metric layer.
pub type MetricResult<T> = std::result::Result<T, MetricError>;
