use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use super::{
    context::CollectorSettings, error::CollectorError, traits::Collector, types::CollectorResult,
};

/// Builds one collector instance from its settings.
pub type CollectorFactory = fn(CollectorSettings) -> CollectorResult<Arc<dyn Collector>>;

/// Metadata for a single collector that will be submitted to the global inventory.
/// Each collector provides a name, the path segment its metrics use when the
/// config does not override it, and a factory.
pub struct CollectorMeta {
    pub name: &'static str,
    pub default_path: &'static str,
    pub factory: CollectorFactory,
}

// Tell the `inventory` crate to collect all submitted `CollectorMeta` values.
inventory::collect!(CollectorMeta);

/// A registered collector: its default path and factory.
#[derive(Clone, Copy)]
pub struct RegisteredCollector {
    pub default_path: &'static str,
    pub factory: CollectorFactory,
}

impl RegisteredCollector {
    /// Builds a new instance. Each call yields independent state.
    pub fn build(&self, settings: CollectorSettings) -> CollectorResult<Arc<dyn Collector>> {
        (self.factory)(settings)
    }
}

/// The central registry of collector factories.
/// It is built once at startup and then used throughout the application.
pub struct CollectorRegistry {
    collectors: HashMap<&'static str, RegisteredCollector>,
}

impl CollectorRegistry {
    /// Constructs a new registry by iterating over all submitted `CollectorMeta`
    /// entries (via the `inventory` crate).
    pub fn new() -> Self {
        let mut collectors = HashMap::new();

        for meta in inventory::iter::<CollectorMeta> {
            collectors.insert(
                meta.name,
                RegisteredCollector {
                    default_path: meta.default_path,
                    factory: meta.factory,
                },
            );
        }

        CollectorRegistry { collectors }
    }

    /// Retrieves a collector by name. Returns an error if no collector with that name exists.
    pub fn get(&self, name: &str) -> CollectorResult<RegisteredCollector> {
        self.collectors
            .get(name)
            .copied()
            .ok_or_else(|| CollectorError::CollectorNotFound(name.to_string()))
    }

    /// Returns a list of all registered collector names.
    pub fn list_names(&self) -> Vec<&'static str> {
        self.collectors.keys().copied().collect()
    }

    /// Checks whether a collector with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.collectors.contains_key(name)
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// True if no collectors are registered.
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Returns a reference to the global singleton registry.
    /// The registry is built lazily the first time this method is called.
    pub fn global() -> &'static CollectorRegistry {
        &GLOBAL_REGISTRY
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The lazily-initialized global registry instance.
static GLOBAL_REGISTRY: Lazy<CollectorRegistry> = Lazy::new(CollectorRegistry::new);

/// Convenience facade that forwards calls to the global registry.
/// This is the API most application code will use.
pub struct Collectors;

impl Collectors {
    pub fn get(name: &str) -> CollectorResult<RegisteredCollector> {
        CollectorRegistry::global().get(name)
    }

    pub fn list() -> Vec<&'static str> {
        CollectorRegistry::global().list_names()
    }

    pub fn exists(name: &str) -> bool {
        CollectorRegistry::global().contains(name)
    }

    pub fn count() -> usize {
        CollectorRegistry::global().len()
    }
}

/// Macro used by collector implementations to register themselves
/// with the global inventory at compile time.
///
/// The collector type must implement `FromSettings` and `Collector`. The
/// optional third argument is the default path segment (the name otherwise).
#[macro_export]
macro_rules! register_collector {
    ($collector_type:ty, $name:expr) => {
        $crate::register_collector!($collector_type, $name, $name);
    };
    ($collector_type:ty, $name:expr, $default_path:expr) => {
        inventory::submit! {
            $crate::core::collectors::registry::CollectorMeta {
                name: $name,
                default_path: $default_path,
                factory: |settings| {
                    let collector = <$collector_type as $crate::core::collectors::traits::FromSettings>::from_settings(settings)?;
                    Ok(std::sync::Arc::new(collector)
                        as std::sync::Arc<dyn $crate::core::collectors::traits::Collector>)
                },
            }
        }
    };
}
