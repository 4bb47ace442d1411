//! MongoDB server status collector.
//!
//! Reads the `serverStatus` document through a shell command and reports the
//! current connection count plus read/write lock percentages per database.
//! Lock time is a cumulative microsecond counter; it is normalized against the
//! server's own `uptimeMillis` clock; when that clock goes backwards the
//! server restarted and the lock baselines start over.
//!
//! The command may print either the bare serverStatus document or a wrapper
//! `{ "serverStatus": {..}, "currentOp": {"inprog": [..]}, "databases": [..] }`.
//! With the wrapper, active operations are counted per database and every
//! operation running for a second or more is also emitted as a `slow_query`
//! event describing it.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
    time::Duration,
};

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{
    command::{command_timeout, run_command, DEFAULT_COMMAND_TIMEOUT_SECS},
    context::{compile_option_regex, CollectorContext, CollectorSettings},
    error::CollectorError,
    traits::{Collector, FromSettings},
    types::CollectorResult,
};
use crate::{
    core::metric::{
        flatten, unix_now, FlattenOptions, KeyRename, MetricEvent, Mode, RateNormalizer,
    },
    register_collector,
};

const NAME: &str = "mongodb";

/// Lock time is reported in microseconds and the clock runs in milliseconds;
/// `delta_micros / delta_millis * 0.1` is the percentage of time locked.
const LOCK_PERCENT_SCALE: f64 = 0.1;

/// Operations running at least this long are slow queries.
const SLOW_QUERY_SECS: f64 = 1.0;

/// Operation attributes copied into a `slow_query` event.
const SLOW_QUERY_FIELDS: [&str; 7] = [
    "secs_running",
    "op",
    "ns",
    "query",
    "client",
    "connectionId",
    "lockStats",
];

const DEFAULT_SCRIPT: &str = "print(JSON.stringify({ \
serverStatus: db.adminCommand({serverStatus: 1}), \
currentOp: {inprog: db.currentOp({active: true}).inprog}, \
databases: db.adminCommand({listDatabases: 1, nameOnly: true}).databases.map(function (d) { return d.name; }) \
}));";

/// Options accepted under `[metrics.collectors.options]` for `mongodb`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoDbOptions {
    /// Command printing the serverStatus document (or the wrapper) as JSON.
    pub command: Vec<String>,
    /// Regex selecting the databases whose locks and operations are reported.
    pub databases: String,
    /// Seconds before a hanging command is killed.
    pub timeout_secs: u64,
}

impl Default for MongoDbOptions {
    fn default() -> Self {
        MongoDbOptions {
            command: vec![
                "mongosh".into(),
                "--quiet".into(),
                "--eval".into(),
                DEFAULT_SCRIPT.into(),
            ],
            databases: ".*".into(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

/// The MongoDB server status collector.
pub struct MongoDbCollector {
    context: CollectorContext,
    command: Vec<String>,
    timeout: Duration,
    databases: Regex,
    counters: Mutex<RateNormalizer>,
}

impl FromSettings for MongoDbCollector {
    fn from_settings(settings: CollectorSettings) -> CollectorResult<Self> {
        let options: MongoDbOptions = settings.options(NAME)?;
        let databases = compile_option_regex(NAME, "databases", &options.databases)?;
        Ok(MongoDbCollector {
            context: settings.context,
            command: options.command,
            timeout: command_timeout(NAME, options.timeout_secs)?,
            databases,
            counters: Mutex::new(RateNormalizer::new()),
        })
    }
}

impl MongoDbCollector {
    /// Turns one serverStatus document, bare or wrapped, into events.
    pub fn process(&self, document: &Value) -> CollectorResult<Vec<MetricEvent>> {
        let (status, current_op, names) = match document.get("serverStatus") {
            Some(status) => (status, document.get("currentOp"), document.get("databases")),
            None => (document, None, None),
        };
        let now = unix_now();
        let mut events = Vec::new();

        match status.pointer("/connections/current").and_then(Value::as_f64) {
            Some(current) => events.push(self.context.event_at("connections.current", current, now)?),
            None => debug!("serverStatus has no connections.current"),
        }

        if let Some(locks) = status.get("locks").filter(|locks| locks.is_object()) {
            // Lock counters are micros; uptime is the matching millisecond clock.
            let clock = status
                .get("uptimeMillis")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| now * 1000);
            self.process_locks(locks, clock, now, &mut events)?;
        }

        if let Some(current_op) = current_op {
            self.process_current_op(current_op, names, now, &mut events)?;
        }

        Ok(events)
    }

    fn process_current_op(
        &self,
        current_op: &Value,
        names: Option<&Value>,
        now: i64,
        events: &mut Vec<MetricEvent>,
    ) -> CollectorResult<()> {
        let active: Vec<&Value> = current_op
            .get("inprog")
            .and_then(Value::as_array)
            .map(|ops| {
                ops.iter()
                    .filter(|op| op.get("active").and_then(Value::as_bool).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default();

        // Without a database list, report the databases that have operations.
        let databases: BTreeSet<&str> = match names.and_then(Value::as_array) {
            Some(names) => names.iter().filter_map(Value::as_str).collect(),
            None => active.iter().filter_map(|op| database_of(op)).collect(),
        };

        for db in databases {
            if !self.databases.is_match(db) {
                trace!("Skipping operations of database '{}'", db);
                continue;
            }
            let mut current = 0;
            let mut slow = 0;
            for op in active.iter().filter(|op| database_of(op) == Some(db)) {
                current += 1;
                let secs = op.get("secs_running").and_then(Value::as_f64).unwrap_or(0.0);
                if secs >= SLOW_QUERY_SECS {
                    slow += 1;
                    events.push(self.context.record_at("slow_query", slow_query_fields(op), now)?);
                }
            }
            let current_metric = format!("current_ops.{}.count", db);
            events.push(self.context.event_at(&current_metric, current as f64, now)?);
            let slow_metric = format!("slow_query.{}.count", db);
            events.push(self.context.event_at(&slow_metric, slow as f64, now)?);
        }

        Ok(())
    }

    fn process_locks(
        &self,
        locks: &Value,
        clock: i64,
        now: i64,
        events: &mut Vec<MetricEvent>,
    ) -> CollectorResult<()> {
        let options = FlattenOptions::new().with_rename(KeyRename::new(".", "_global_"));
        let mut totals: HashMap<String, f64> = HashMap::new();
        let mut databases = BTreeSet::new();

        for pair in flatten(locks, &options) {
            let (name, value) = pair?;
            // <db>.timeLockedMicros.<r|R|w|W>
            let mut parts = name.rsplitn(3, '.');
            let (Some(mode), Some("timeLockedMicros"), Some(db)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let direction = match mode {
                "r" | "R" => "read",
                "w" | "W" => "write",
                _ => continue,
            };
            if !self.databases.is_match(db) {
                trace!("Skipping locks of database '{}'", db);
                continue;
            }
            databases.insert(db.to_string());
            *totals.entry(format!("{}.{}", db, direction)).or_default() += value.as_f64();
        }

        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for db in databases {
            for direction in ["read", "write"] {
                let total = totals
                    .get(&format!("{}.{}", db, direction))
                    .copied()
                    .unwrap_or_default();
                if total == 0.0 {
                    continue;
                }
                let metric = format!("percent.locks.{}.{}", db, direction);
                // Uptime going backwards means the server restarted.
                if counters.last(&metric).is_some_and(|(_, last_clock)| clock < last_clock) {
                    debug!("MongoDB restarted; resetting baseline of '{}'", metric);
                    counters.forget(&metric);
                }
                if let Some(reading) = counters.observe(&metric, total, clock, Mode::Rate) {
                    let reading = reading.scaled(LOCK_PERCENT_SCALE);
                    events.push(self.context.event_at(&metric, reading.value, now)?);
                }
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Collector for MongoDbCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(&self) -> CollectorResult<Vec<MetricEvent>> {
        let output = run_command(&self.command, self.timeout).await?;
        let status: Value =
            serde_json::from_str(output.trim()).map_err(|e| CollectorError::ParseError {
                metric: "serverStatus".to_string(),
                location: self.command.join(" "),
                reason: e.to_string(),
            })?;
        self.process(&status)
    }
}

/// Database part of an operation's namespace.
fn database_of(op: &Value) -> Option<&str> {
    let ns = op.get("ns")?.as_str()?;
    let db = ns.split('.').next().unwrap_or(ns);
    (!db.is_empty()).then_some(db)
}

/// Describes a slow operation. Missing attributes become empty strings and
/// nested documents are kept as indented JSON text.
fn slow_query_fields(op: &Value) -> Map<String, Value> {
    SLOW_QUERY_FIELDS
        .iter()
        .map(|&key| {
            // Newer servers report the statement under `command`.
            let raw = op
                .get(key)
                .or_else(|| (key == "query").then(|| op.get("command")).flatten());
            let value = match raw {
                None => Value::from(""),
                Some(nested @ (Value::Object(_) | Value::Array(_))) => {
                    Value::String(serde_json::to_string_pretty(nested).unwrap_or_default())
                }
                Some(other) => other.clone(),
            };
            (key.to_string(), value)
        })
        .collect()
}

register_collector!(MongoDbCollector, "mongodb", "mongo");

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn collector(options: &str) -> MongoDbCollector {
        let table: toml::Table = toml::from_str(options).unwrap();
        MongoDbCollector::from_settings(CollectorSettings::new(
            CollectorContext::new("servers", "db1", "mongo"),
            table,
        ))
        .unwrap()
    }

    fn status(uptime: i64, global_r: i64, global_w: i64, app_r: i64) -> Value {
        json!({
            "host": "db1",
            "uptimeMillis": uptime,
            "connections": {"current": 7, "available": 800},
            "locks": {
                ".": {"timeLockedMicros": {"r": global_r, "R": 0, "w": global_w, "W": 0}},
                "app": {"timeLockedMicros": {"r": app_r, "R": 0, "w": 0, "W": 0}},
                "admin": {"timeLockedMicros": {"r": 0, "R": 0, "w": 0, "W": 0}}
            }
        })
    }

    fn value_of(events: &[MetricEvent], metric: &str) -> Option<f64> {
        events
            .iter()
            .find(|event| event.metric_path().ok() == Some(metric))
            .and_then(MetricEvent::value)
    }

    #[test]
    fn test_first_cycle_reports_connections_only() {
        let collector = collector("");
        let events = collector.process(&status(1_000, 100, 50, 10)).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path(), "servers.db1.mongo.connections.current");
        assert_eq!(events[0].value(), Some(7.0));
    }

    #[test]
    fn test_lock_percentages_over_uptime() {
        let collector = collector("");
        collector.process(&status(1_000, 100, 50, 10)).unwrap();
        let events = collector.process(&status(2_000, 5_100, 1_050, 10)).unwrap();

        // 5000 micros over 1000 millis is 0.5%.
        let read = value_of(&events, "percent.locks._global_.read").unwrap();
        let write = value_of(&events, "percent.locks._global_.write").unwrap();
        assert!((read - 0.5).abs() < 1e-9);
        assert!((write - 0.1).abs() < 1e-9);

        // Unchanged counters give 0%, all-zero counters are never reported.
        assert_eq!(value_of(&events, "percent.locks.app.read"), Some(0.0));
        assert_eq!(value_of(&events, "percent.locks.admin.read"), None);
    }

    #[test]
    fn test_server_restart_is_a_reset() {
        let collector = collector("");
        collector.process(&status(50_000, 9_000, 100, 10)).unwrap();
        let events = collector.process(&status(1_000, 500, 100, 10)).unwrap();

        // Uptime went backwards: the restart re-baselines instead of reporting.
        assert_eq!(value_of(&events, "percent.locks._global_.read"), None);

        let events = collector.process(&status(2_000, 1_500, 100, 10)).unwrap();
        let read = value_of(&events, "percent.locks._global_.read").unwrap();
        assert!((read - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_database_filter() {
        let collector = collector("databases = \"^app$\"");
        collector.process(&status(1_000, 100, 50, 10)).unwrap();
        let events = collector.process(&status(2_000, 5_100, 1_050, 1_010)).unwrap();

        assert!(value_of(&events, "percent.locks.app.read").is_some());
        assert!(value_of(&events, "percent.locks._global_.read").is_none());
    }

    #[test]
    fn test_missing_sections_are_tolerated() {
        let collector = collector("");
        let events = collector.process(&json!({"ok": 1})).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_invalid_database_regex() {
        let table: toml::Table = toml::from_str("databases = \"(\"").unwrap();
        let result = MongoDbCollector::from_settings(CollectorSettings::new(
            CollectorContext::new("servers", "db1", "mongo"),
            table,
        ));
        assert!(matches!(result, Err(CollectorError::InvalidOptions { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_runs_command() {
        let collector = collector(
            r#"command = ["sh", "-c", "echo '{\"connections\": {\"current\": 3}}'"]"#,
        );
        let events = collector.collect().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value(), Some(3.0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_rejects_non_json_output() {
        let collector = collector(r#"command = ["sh", "-c", "echo not json"]"#);
        assert!(matches!(
            collector.collect().await,
            Err(CollectorError::ParseError { .. })
        ));
    }

    fn wrapped(current_op: Value, databases: Option<Value>) -> Value {
        let mut document = json!({
            "serverStatus": {"connections": {"current": 2}},
            "currentOp": current_op,
        });
        if let Some(databases) = databases {
            document["databases"] = databases;
        }
        document
    }

    fn operations() -> Value {
        json!({"inprog": [
            {
                "active": true,
                "secs_running": 4,
                "op": "query",
                "ns": "app.users",
                "query": {"find": "users", "filter": {"age": {"$gt": 30}}},
                "client": "10.0.0.5:51234",
                "connectionId": 81,
                "lockStats": {"Global": {"acquireCount": {"r": 2}}}
            },
            {"active": true, "secs_running": 0, "op": "insert", "ns": "app.events"},
            {"active": false, "secs_running": 90, "op": "query", "ns": "app.users"},
            {"active": true, "secs_running": 2, "op": "update", "ns": "logs.raw"},
            {"active": true, "secs_running": 7, "op": "query", "ns": "app2.users"}
        ]})
    }

    #[test]
    fn test_current_ops_per_database() {
        let collector = collector("");
        let document = wrapped(operations(), Some(json!(["app", "logs", "admin"])));
        let events = collector.process(&document).unwrap();

        assert_eq!(value_of(&events, "connections.current"), Some(2.0));
        assert_eq!(value_of(&events, "current_ops.app.count"), Some(2.0));
        assert_eq!(value_of(&events, "slow_query.app.count"), Some(1.0));
        assert_eq!(value_of(&events, "current_ops.logs.count"), Some(1.0));
        assert_eq!(value_of(&events, "slow_query.logs.count"), Some(1.0));
        assert_eq!(value_of(&events, "current_ops.admin.count"), Some(0.0));
        // Namespaces are matched on the database name, not by substring.
        assert_eq!(value_of(&events, "current_ops.app2.count"), None);
    }

    #[test]
    fn test_slow_query_events_describe_the_operation() {
        let collector = collector("databases = \"^app$\"");
        let document = wrapped(operations(), Some(json!(["app", "logs"])));
        let events = collector.process(&document).unwrap();

        let slow: Vec<&MetricEvent> = events
            .iter()
            .filter(|event| event.metric_path().ok() == Some("slow_query"))
            .collect();
        assert_eq!(slow.len(), 1);

        let fields = slow[0].fields();
        assert_eq!(slow[0].path(), "servers.db1.mongo.slow_query");
        assert_eq!(fields["secs_running"], 4);
        assert_eq!(fields["op"], "query");
        assert_eq!(fields["ns"], "app.users");
        assert_eq!(fields["client"], "10.0.0.5:51234");
        assert_eq!(fields["connectionId"], 81);
        assert!(fields["query"].as_str().unwrap().contains("\"$gt\": 30"));
        assert!(fields["lockStats"].as_str().unwrap().contains("acquireCount"));
        assert_eq!(value_of(&events, "current_ops.logs.count"), None);
    }

    #[test]
    fn test_missing_operation_attributes_are_empty() {
        let collector = collector("");
        let ops = json!({"inprog": [
            {"active": true, "secs_running": 3, "ns": "app.users", "command": {"count": "users"}}
        ]});
        let events = collector.process(&wrapped(ops, None)).unwrap();

        let slow = events
            .iter()
            .find(|event| event.metric_path().ok() == Some("slow_query"))
            .unwrap();
        assert_eq!(slow.fields()["op"], "");
        assert_eq!(slow.fields()["client"], "");
        assert!(slow.fields()["query"].as_str().unwrap().contains("count"));
        // Databases come from the operations when no list is given.
        assert_eq!(value_of(&events, "current_ops.app.count"), Some(1.0));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let table: toml::Table = toml::from_str("timeout_secs = 0").unwrap();
        let result = MongoDbCollector::from_settings(CollectorSettings::new(
            CollectorContext::new("servers", "db1", "mongo"),
            table,
        ));
        assert!(matches!(result, Err(CollectorError::InvalidOptions { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_command_times_out() {
        let collector = collector("command = [\"sleep\", \"30\"]\ntimeout_secs = 1");
        assert!(matches!(
            collector.collect().await,
            Err(CollectorError::Timeout { .. })
        ));
    }
}
