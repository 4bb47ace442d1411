//! Collection cycle executor.
//!
//! The `Executor` owns one long-lived instance of every configured collector
//! and the list of enabled handlers. A cycle runs all collectors
//! concurrently, then hands every event to every handler. Failures are
//! logged where they happen and never stop the rest of the cycle.

use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::{
    collectors::{
        context::{CollectorContext, CollectorSettings},
        registry::Collectors,
        traits::Collector,
        types::CollectorResult,
    },
    handlers::Handler,
    metric::MetricEvent,
};
use crate::config::metrics::MetricsConfig;

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events produced by all collectors.
    pub events: usize,
    /// Collectors whose `collect` failed.
    pub collector_failures: usize,
    /// Individual (event, handler) deliveries that failed.
    pub handler_failures: usize,
}

/// Executor that runs collection cycles over a fixed set of collectors and handlers.
pub struct Executor {
    collectors: Vec<Arc<dyn Collector>>,
    handlers: Vec<Arc<dyn Handler>>,
    interval: Duration,
}

impl Executor {
    pub fn new(
        collectors: Vec<Arc<dyn Collector>>,
        handlers: Vec<Arc<dyn Handler>>,
        interval: Duration,
    ) -> Self {
        Self {
            collectors,
            handlers,
            interval,
        }
    }

    /// Instantiates every collector listed in `config`.
    ///
    /// The metric path of each collector is its configured `path`, else the
    /// default registered with the collector.
    ///
    /// # Errors
    ///
    /// Fails on the first unknown collector name or rejected option table.
    pub fn from_config(
        config: &MetricsConfig,
        handlers: Vec<Arc<dyn Handler>>,
    ) -> CollectorResult<Self> {
        let hostname = config.resolve_hostname();
        debug!("Metric paths use host segment '{}'", hostname);

        let mut collectors = Vec::with_capacity(config.collectors.len());
        for entry in &config.collectors {
            let registered = Collectors::get(&entry.name)?;
            let path = entry
                .path
                .clone()
                .unwrap_or_else(|| registered.default_path.to_string());
            let context = CollectorContext::new(&config.path_prefix, &hostname, path);
            debug!(
                "Building collector '{}' with metric prefix '{}'",
                entry.name,
                context.metric_path("")
            );
            collectors.push(registered.build(CollectorSettings::new(context, entry.options.clone()))?);
        }

        Ok(Self::new(
            collectors,
            handlers,
            Duration::from_secs(config.collection_interval),
        ))
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    /// Runs one cycle: collect from all collectors, then dispatch and flush.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let tasks: Vec<_> = self
            .collectors
            .iter()
            .cloned()
            .map(|collector| {
                tokio::spawn(async move {
                    let result = collector.collect().await;
                    (collector.name(), result)
                })
            })
            .collect();

        let mut batches: Vec<Vec<MetricEvent>> = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok((name, Ok(events))) => {
                    debug!("Collected {} events from '{}'", events.len(), name);
                    report.events += events.len();
                    batches.push(events);
                }
                Ok((name, Err(e))) => {
                    error!("Failed to collect from '{}': {}", name, e);
                    report.collector_failures += 1;
                }
                Err(e) => {
                    error!("Collector task failed: {}", e);
                    report.collector_failures += 1;
                }
            }
        }

        for event in batches.iter().flatten() {
            trace!("{}", event);
            for handler in &self.handlers {
                if let Err(e) = handler.process(event).await {
                    warn!("Handler '{}' dropped {}: {}", handler.name(), event.path(), e);
                    report.handler_failures += 1;
                }
            }
        }

        for handler in &self.handlers {
            if let Err(e) = handler.flush().await {
                warn!("Handler '{}' failed to flush: {}", handler.name(), e);
            }
        }

        report
    }

    /// Runs cycles at the configured interval until the task is cancelled.
    pub async fn run(self) -> ! {
        info!(
            "Metrics collection started (interval: {}s, {} collectors, {} handlers)",
            self.interval.as_secs(),
            self.collectors.len(),
            self.handlers.len()
        );

        loop {
            let start = Instant::now();
            let report = self.run_cycle().await;
            debug!(
                "Cycle finished in {:?}: {} events, {} collector failures, {} handler failures",
                start.elapsed(),
                report.events,
                report.collector_failures,
                report.handler_failures
            );

            let elapsed = start.elapsed();
            if elapsed < self.interval {
                sleep(self.interval - elapsed).await;
            } else {
                warn!("Cycle took {:?}, longer than the interval", elapsed);
            }
        }
    }
}
