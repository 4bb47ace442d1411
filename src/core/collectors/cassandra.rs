use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use super::{
    command::{command_timeout, run_command, DEFAULT_COMMAND_TIMEOUT_SECS},
    context::{CollectorContext, CollectorSettings},
    error::CollectorError,
    traits::{Collector, FromSettings},
    types::CollectorResult,
};
use crate::{
    core::metric::{unix_now, MetricEvent},
    register_collector,
};

const NAME: &str = "cassandra";

/// Thread-pool columns reported per pool, in table order.
const POOL_COLUMNS: [&str; 4] = ["Active", "Pending", "Completed", "Blocked"];

/// One numeric cell of the `nodetool tpstats` output, named
/// `<Pool>.<Column>` or `<MessageType>.dropped`.
#[derive(Debug, Clone, PartialEq)]
pub struct TpstatsEntry {
    pub metric: String,
    pub value: u64,
}

/// Parses `nodetool tpstats` output.
///
/// The output holds two tables separated by a blank line:
/// ```text
/// Pool Name                    Active   Pending      Completed   Blocked  All time blocked
/// ReadStage                         0         0      228563885         0                 0
/// MutationStage                     2         1      211452572         0                 0
///
/// Message type           Dropped
/// READ                         0
/// MUTATION                     4
/// ```
///
/// The first row of each table is a header. Pool rows report the four
/// leading counters (the trailing "All time blocked" is not reported);
/// message rows report their dropped count. Rows that do not parse are
/// skipped; an output without a pool table is an error.
pub fn parse_tpstats(output: &str) -> CollectorResult<Vec<TpstatsEntry>> {
    let mut tables = output
        .split("\n\n")
        .map(str::trim)
        .filter(|table| !table.is_empty());

    let pools = tables.next().ok_or_else(|| CollectorError::InvalidFormat {
        location: "nodetool tpstats".to_string(),
        reason: "empty output".to_string(),
    })?;
    if !pools.starts_with("Pool Name") {
        return Err(CollectorError::InvalidFormat {
            location: "nodetool tpstats".to_string(),
            reason: format!("unexpected header: {}", pools.lines().next().unwrap_or_default()),
        });
    }

    let mut entries = Vec::new();

    for line in pools.lines().skip(1) {
        let mut cols = line.split_whitespace();
        let Some(pool) = cols.next() else {
            continue;
        };
        for (column, raw) in POOL_COLUMNS.iter().zip(cols) {
            match raw.parse::<u64>() {
                Ok(value) => entries.push(TpstatsEntry {
                    metric: format!("{}.{}", pool, column),
                    value,
                }),
                Err(e) => trace!("Skipping {}.{} = '{}': {}", pool, column, raw, e),
            }
        }
    }

    for table in tables.filter(|table| table.starts_with("Message type")) {
        for line in table.lines().skip(1) {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let [kind, dropped, ..] = cols.as_slice() else {
                continue;
            };
            match dropped.parse::<u64>() {
                Ok(value) => entries.push(TpstatsEntry {
                    metric: format!("{}.dropped", kind),
                    value,
                }),
                Err(e) => trace!("Skipping dropped count of {}: {}", kind, e),
            }
        }
    }

    Ok(entries)
}

/// Options accepted under `[metrics.collectors.options]` for `cassandra`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CassandraOptions {
    pub nodetool: String,
    pub args: Vec<String>,
    /// Seconds before a hanging `nodetool` is killed.
    pub timeout_secs: u64,
}

impl Default for CassandraOptions {
    fn default() -> Self {
        CassandraOptions {
            nodetool: "nodetool".into(),
            args: vec!["tpstats".into()],
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

/// Reports Cassandra thread-pool and dropped-message counters.
pub struct CassandraCollector {
    context: CollectorContext,
    command: Vec<String>,
    timeout: Duration,
}

impl FromSettings for CassandraCollector {
    fn from_settings(settings: CollectorSettings) -> CollectorResult<Self> {
        let options: CassandraOptions = settings.options(NAME)?;
        let timeout = command_timeout(NAME, options.timeout_secs)?;
        let mut command = vec![options.nodetool];
        command.extend(options.args);
        Ok(CassandraCollector {
            context: settings.context,
            command,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Collector for CassandraCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(&self) -> CollectorResult<Vec<MetricEvent>> {
        let output = run_command(&self.command, self.timeout).await?;
        let now = unix_now();
        parse_tpstats(&output)?
            .into_iter()
            .map(|entry| self.context.event_at(&entry.metric, entry.value as f64, now))
            .collect()
    }
}

register_collector!(CassandraCollector, "cassandra");
