//! Shared metric representation and normalization.
//!
//! Every collector and handler goes through this layer:
//!
//! * [`path`]: the `prefix.host.collector.metric` naming scheme and its
//!   host-anchored or positional decomposition.
//! * [`flatten`]: turns nested status documents into dotted metric names.
//! * [`rate`]: converts cumulative counters into rates or deltas.
//! * [`event`]: the immutable [`MetricEvent`] passed on to handlers.

pub mod error;
pub mod event;
pub mod flatten;
pub mod path;
pub mod rate;

pub use error::{MetricError, MetricResult};
pub use event::{unix_now, MetricEvent, RawTimestamp};
pub use flatten::{flatten, FlattenOptions, KeyRename, Leaf, MetricValue, DEFAULT_MAX_DEPTH};
pub use path::{PathCodec, DELIMITER};
pub use rate::{FirstSample, Mode, RateNormalizer, Reading, ReadingKind};
