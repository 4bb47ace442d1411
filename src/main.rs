use std::{
    collections::BTreeSet,
    process,
    sync::{Arc, OnceLock},
};

use nectar::{
    config::Config,
    core::{
        collectors::registry::Collectors,
        executor::Executor,
        handlers::{DatagramHandler, Handler},
    },
    logger::LoggerManager,
    print_error,
};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn log_collectors_table(configured: Vec<&str>, available: Vec<&'static str>) {
    let configured_set: BTreeSet<&str> = configured.into_iter().collect();
    let available_set: BTreeSet<&str> = available.into_iter().collect();
    let all_names: BTreeSet<&str> = configured_set.union(&available_set).copied().collect();

    let name_width = all_names
        .iter()
        .map(|s| s.len())
        .max()
        .unwrap_or(10)
        .max("Collector".len());

    info!("{:<width$} | Status", "Collector", width = name_width);
    info!("{}-+-{}", "-".repeat(name_width), "-".repeat(12));

    for name in all_names {
        let status = match (configured_set.contains(name), available_set.contains(name)) {
            (true, true) => "ENABLED",
            (true, false) => "ENABLED (missing)",
            (false, _) => "DISABLED",
        };
        info!("{:<width$} | {}", name, status, width = name_width);
    }
}

async fn build_handlers(cfg: &Config) -> Vec<Arc<dyn Handler>> {
    let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();

    if let Some(datagram) = cfg.handlers.datagram.as_ref().filter(|d| d.enabled) {
        match DatagramHandler::from_config(datagram).await {
            Ok(handler) => {
                info!(
                    "Datagram handler enabled: {}:{} (logger '{}')",
                    datagram.host, datagram.port, datagram.logger
                );
                handlers.push(Arc::new(handler));
            }
            Err(e) => {
                error!("Failed to create datagram handler: {}", e);
                process::exit(1);
            }
        }
    }

    if handlers.is_empty() {
        info!("No handlers enabled; collected metrics are only logged at trace level");
    }
    handlers
}

#[tokio::main]
async fn main() {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting nectar version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.metrics);

    log_collectors_table(cfg.metrics.collector_names(), Collectors::list());

    let handlers = build_handlers(cfg).await;
    let executor = Executor::from_config(&cfg.metrics, handlers).unwrap_or_else(|e| {
        error!("Failed to set up collectors: {}", e);
        process::exit(1);
    });

    info!("Starting metrics collection executor...");

    tokio::select! {
        _ = executor.run() => {
            error!("Executor unexpectedly finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
}
