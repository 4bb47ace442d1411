//! nectar: host-side metrics agent
//!
//! Collectors sample external services (MongoDB, Cassandra, Redis) and emit
//! time-stamped numeric measurements named `prefix.host.collector.metric`;
//! handlers forward those measurements to downstream telemetry sinks.
//!
//! ## Modules
//!
//! * `config`: TOML configuration structures, loading and validation
//!   via the `validator` crate.
//!
//! * `core`: Core runtime components:
//!   - `metric`: path naming, tree flattening, counter-to-rate normalization
//!     and the `MetricEvent` type
//!   - `collectors`: the collector trait, registry and implementations
//!   - `handlers`: the handler trait, include filtering and the UDP sink
//!   - `executor`: runs collection cycles
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! ## Features
//!
//! * `collector-mongodb`, `collector-cassandra`, `collector-redisuploadqueue`
//!   select the compiled collectors; `all-collectors` (default) enables all.

pub mod config;
pub mod core;
pub mod logger;
