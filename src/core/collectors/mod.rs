/// Cassandra thread-pool statistics collector module.
/// Parses `nodetool tpstats` into pool counters and dropped messages.
///
/// Available when the `collector-cassandra` feature is enabled.
#[cfg(feature = "collector-cassandra")]
pub mod cassandra;

/// MongoDB database and collection statistics collector module.
/// Reports dbStats and collStats documents per database and collection.
///
/// Available when the `collector-mongodb` feature is enabled.
#[cfg(feature = "collector-mongodb")]
pub mod collstats;

/// External command execution shared by the command-driven collectors.
pub mod command;

/// Naming context and option settings handed to collector factories.
pub mod context;

/// Error types and handling utilities.
/// Common error types used across all collectors.
pub mod error;

/// MongoDB server status collector module.
/// Collects connection counts and lock percentages.
///
/// Available when the `collector-mongodb` feature is enabled.
#[cfg(feature = "collector-mongodb")]
pub mod mongodb;

/// Redis upload queue collector module.
/// Reports the length of configured Redis lists.
///
/// Available when the `collector-redisuploadqueue` feature is enabled.
#[cfg(feature = "collector-redisuploadqueue")]
pub mod redisuploadqueue;

/// Collector registry and management module.
/// Central registry of collector factories, filled at compile time.
pub mod registry;

/// Core traits and interfaces.
/// Defines the common interfaces for all collectors.
pub mod traits;

/// Common types and result definitions.
pub mod types;

// ----------------------------------------------------------------------------
// Re-exports for public API
// ----------------------------------------------------------------------------

#[cfg(feature = "collector-cassandra")]
pub use cassandra::{parse_tpstats, CassandraCollector, CassandraOptions, TpstatsEntry};
#[cfg(feature = "collector-mongodb")]
pub use collstats::{CollectionStatsCollector, CollectionStatsOptions, HostTarget};
pub use context::{CollectorContext, CollectorSettings};
pub use error::CollectorError;
#[cfg(feature = "collector-mongodb")]
pub use mongodb::{MongoDbCollector, MongoDbOptions};
#[cfg(feature = "collector-redisuploadqueue")]
pub use redisuploadqueue::{RedisUploadQueueCollector, RedisUploadQueueOptions};
pub use registry::{CollectorRegistry, Collectors, RegisteredCollector};
pub use traits::{Collector, FromSettings};
pub use types::CollectorResult;
