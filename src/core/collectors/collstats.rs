//! MongoDB database and collection statistics collector.
//!
//! The configured command prints one JSON document shaped as
//! `{ "<db>": { "stats": {dbStats}, "collections": { "<name>": {collStats} } } }`.
//! Every numeric value in it is reported under `databases.<db>[.<collection>]`.
//!
//! The command runs once per configured host, with `{host}` in its arguments
//! replaced by the host address. Entries written `alias@host` report under
//! `<alias>.databases...`; without an alias a lone host gets no extra segment
//! and several hosts are told apart by their address with `:` and `.`
//! turned into `_`.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use super::{
    command::{command_timeout, run_command, DEFAULT_COMMAND_TIMEOUT_SECS},
    context::{compile_option_regex, CollectorContext, CollectorSettings},
    error::CollectorError,
    traits::{Collector, FromSettings},
    types::CollectorResult,
};
use crate::{
    core::metric::{flatten, unix_now, FlattenOptions, MetricEvent},
    register_collector,
};

const NAME: &str = "mongodb_collectionstats";

/// collStats keys that carry no useful signal.
pub const IGNORED_COLLECTION_KEYS: &[&str] = &[
    "ok",
    "paddingFactor",
    "lastExtentSize",
    "numExtents",
    "nindexes",
    "userFlags",
    "systemFlags",
];

/// Placeholder replaced by the host address in command arguments.
const HOST_PLACEHOLDER: &str = "{host}";

const DEFAULT_SCRIPT: &str = "const out = {}; \
db.adminCommand({listDatabases: 1}).databases.forEach(function (d) { \
  const target = db.getSiblingDB(d.name); const collections = {}; \
  target.getCollectionNames().forEach(function (c) { collections[c] = target.runCommand({collStats: c}); }); \
  out[d.name] = {stats: target.runCommand({dbStats: 1}), collections: collections}; \
}); \
print(JSON.stringify(out));";

/// Options accepted under `[metrics.collectors.options]` for `mongodb_collectionstats`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionStatsOptions {
    /// `host[:port]` entries, optionally written `alias@host[:port]`.
    pub hosts: Vec<String>,
    pub command: Vec<String>,
    /// Regex selecting databases.
    pub databases: String,
    /// Regex of collections to skip; MapReduce temporaries by default.
    pub ignore_collections: String,
    /// Replace `.` with `_` in collection names.
    pub translate_collections: bool,
    /// Seconds before a hanging command is killed, per host.
    pub timeout_secs: u64,
}

impl Default for CollectionStatsOptions {
    fn default() -> Self {
        CollectionStatsOptions {
            hosts: vec!["localhost".into()],
            command: vec![
                "mongosh".into(),
                "--host".into(),
                HOST_PLACEHOLDER.into(),
                "--quiet".into(),
                "--eval".into(),
                DEFAULT_SCRIPT.into(),
            ],
            databases: ".*".into(),
            ignore_collections: r"^tmp\.mr\.".into(),
            translate_collections: false,
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

/// One MongoDB host to read statistics from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    /// Extra leading path segment for this host's metrics.
    pub prefix: Option<String>,
    pub command: Vec<String>,
}

impl HostTarget {
    /// Parses an `[alias@]host` entry. `single` tells whether it is the only
    /// configured host.
    pub fn new(entry: &str, single: bool, command: &[String]) -> Self {
        let (alias, host) = match entry.rsplit_once('@') {
            Some((alias, host)) if !alias.is_empty() => (Some(alias), host),
            _ => (None, entry),
        };
        let prefix = match alias {
            Some(alias) => Some(alias.to_string()),
            None if single => None,
            None => Some(host.replace([':', '.'], "_")),
        };
        HostTarget {
            host: host.to_string(),
            prefix,
            command: command
                .iter()
                .map(|arg| arg.replace(HOST_PLACEHOLDER, host))
                .collect(),
        }
    }
}

pub struct CollectionStatsCollector {
    context: CollectorContext,
    targets: Vec<HostTarget>,
    timeout: Duration,
    databases: Regex,
    ignore_collections: Regex,
    translate_collections: bool,
}

impl FromSettings for CollectionStatsCollector {
    fn from_settings(settings: CollectorSettings) -> CollectorResult<Self> {
        let options: CollectionStatsOptions = settings.options(NAME)?;
        if options.hosts.is_empty() {
            return Err(CollectorError::InvalidOptions {
                collector: NAME.to_string(),
                reason: "hosts must name at least one host".to_string(),
            });
        }
        let single = options.hosts.len() == 1;
        let targets = options
            .hosts
            .iter()
            .map(|entry| HostTarget::new(entry, single, &options.command))
            .collect();
        Ok(CollectionStatsCollector {
            targets,
            timeout: command_timeout(NAME, options.timeout_secs)?,
            databases: compile_option_regex(NAME, "databases", &options.databases)?,
            ignore_collections: compile_option_regex(
                NAME,
                "ignore_collections",
                &options.ignore_collections,
            )?,
            translate_collections: options.translate_collections,
            context: settings.context,
        })
    }
}

impl CollectionStatsCollector {
    /// Turns one statistics document into events, under `prefix` if given.
    pub fn process(
        &self,
        document: &Value,
        prefix: Option<&str>,
    ) -> CollectorResult<Vec<MetricEvent>> {
        let Some(databases) = document.as_object() else {
            return Err(CollectorError::InvalidFormat {
                location: NAME.to_string(),
                reason: "statistics document is not a mapping".to_string(),
            });
        };

        let now = unix_now();
        let mut events = Vec::new();

        for (db, entry) in databases {
            if !self.databases.is_match(db) {
                trace!("Skipping database '{}'", db);
                continue;
            }

            let mut db_prefix: Vec<&str> = prefix.into_iter().collect();
            db_prefix.extend(["databases", db.as_str()]);

            if let Some(stats) = entry.get("stats") {
                let options = FlattenOptions::new().with_prefix(db_prefix.iter().copied());
                self.emit(stats, &options, now, &mut events)?;
            }

            let Some(collections) = entry.get("collections").and_then(Value::as_object) else {
                continue;
            };
            for (collection, stats) in collections {
                if self.ignore_collections.is_match(collection) {
                    trace!("Skipping collection '{}.{}'", db, collection);
                    continue;
                }
                let name = if self.translate_collections {
                    collection.replace('.', "_")
                } else {
                    collection.clone()
                };
                let options = FlattenOptions::new()
                    .with_prefix(db_prefix.iter().copied().chain([name.as_str()]))
                    .with_ignore(IGNORED_COLLECTION_KEYS.iter().copied());
                self.emit(stats, &options, now, &mut events)?;
            }
        }

        Ok(events)
    }

    fn emit(
        &self,
        stats: &Value,
        options: &FlattenOptions,
        now: i64,
        events: &mut Vec<MetricEvent>,
    ) -> CollectorResult<()> {
        for pair in flatten(stats, options) {
            let (name, value) = pair?;
            events.push(self.context.event_at(&name, value.as_f64(), now)?);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Collector for CollectionStatsCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    /// Reads every host in turn. A failing host is skipped with a warning;
    /// the cycle fails only when no host answered.
    async fn collect(&self) -> CollectorResult<Vec<MetricEvent>> {
        let mut events = Vec::new();
        let mut answered = false;
        let mut last_error = None;

        for target in &self.targets {
            match self.collect_host(target).await {
                Ok(mut batch) => {
                    answered = true;
                    events.append(&mut batch);
                }
                Err(e) => {
                    warn!("Skipping MongoDB host '{}': {}", target.host, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(events),
        }
    }
}

impl CollectionStatsCollector {
    async fn collect_host(&self, target: &HostTarget) -> CollectorResult<Vec<MetricEvent>> {
        let output = run_command(&target.command, self.timeout).await?;
        let document: Value =
            serde_json::from_str(output.trim()).map_err(|e| CollectorError::ParseError {
                metric: "collStats".to_string(),
                location: format!("{} ({})", NAME, target.host),
                reason: e.to_string(),
            })?;
        self.process(&document, target.prefix.as_deref())
    }
}

register_collector!(CollectionStatsCollector, "mongodb_collectionstats", "mongo");
