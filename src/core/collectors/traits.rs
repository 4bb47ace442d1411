use super::{context::CollectorSettings, types::CollectorResult};
use crate::core::metric::MetricEvent;

/// A core trait that every metric collector must implement.
///
/// A collector samples one external service per call and returns the
/// resulting events, fully named and time-stamped. Instances are built once
/// at startup and kept for the life of the process, so any counter state
/// they hold spans collection cycles.
///
/// The executor never runs two cycles of the same instance at once, but the
/// instance is shared behind an `Arc`, so mutable state must sit behind a
/// lock.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Registry name of the collector.
    fn name(&self) -> &'static str;

    /// Runs one collection cycle.
    ///
    /// Any failure is returned as a `CollectorError`; the caller logs it and
    /// moves on to the next scheduled cycle.
    async fn collect(&self) -> CollectorResult<Vec<MetricEvent>>;
}

/// Construction of a collector from its configured settings.
///
/// Implemented by every collector registered with `register_collector!`.
pub trait FromSettings: Sized {
    /// # Errors
    ///
    /// Returns `CollectorError::InvalidOptions` if the option table cannot be
    /// deserialized or holds invalid values (e.g. a malformed regex).
    fn from_settings(settings: CollectorSettings) -> CollectorResult<Self>;
}
