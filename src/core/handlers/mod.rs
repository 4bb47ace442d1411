//! Sinks that forward finished events downstream.

/// UDP JSON handler.
pub mod datagram;

/// Handler error types.
pub mod error;

/// Regex inclusion policy applied before emission.
pub mod filter;

pub use datagram::DatagramHandler;
pub use error::HandlerError;
pub use filter::{FilterError, IncludeFilters, SinkFilter};

use crate::core::metric::MetricEvent;

/// Trait for handlers that forward events to an external system.
///
/// `process` is called once per event, in collection order. A failure
/// concerns that event only; the caller logs it and continues with the
/// rest of the batch.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, event: &MetricEvent) -> Result<(), HandlerError>;

    /// Pushes out anything buffered. Called at the end of every cycle.
    async fn flush(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
