//! Handler configuration: the `[handlers.*]` tables.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::handlers::{IncludeFilters, SinkFilter};

/// All handler tables. A handler runs when its table is present and enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HandlersConfig {
    #[validate(nested)]
    pub datagram: Option<DatagramConfig>,
}

/// The `[handlers.datagram]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatagramConfig {
    pub enabled: bool,

    #[validate(length(min = 1, message = "Datagram host must not be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Datagram port must not be 0"))]
    pub port: u16,

    /// Value of the `logger` field in every message.
    #[validate(length(min = 1, message = "Datagram logger must not be empty"))]
    pub logger: String,

    /// One pattern or a list; a `collector.metric` path is sent if any
    /// pattern matches at its start.
    #[validate(custom(function = "validate_include_filters"))]
    pub include_filters: IncludeFilters,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        DatagramConfig {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 26000,
            logger: "nectar".into(),
            include_filters: IncludeFilters::default(),
        }
    }
}

fn validate_include_filters(filters: &IncludeFilters) -> Result<(), ValidationError> {
    SinkFilter::try_from(filters.clone()).map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("invalid_include_filter");
        err.message = Some(e.to_string().into());
        err
    })
}
