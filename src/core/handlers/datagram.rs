//! Fire-and-forget UDP sink.
//!
//! Each event that passes the include filters becomes one JSON datagram:
//!
//! ```json
//! {"type":"mongo.connections.current","logger":"nectar","severity":6,
//!  "fields":{"value":7.0},"hostname":"db1","timestamp":1700000000}
//! ```
//!
//! Nothing is queued or retried; a failed send loses that event only.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, trace};

use super::{error::HandlerError, filter::SinkFilter, Handler};
use crate::{config::handlers::DatagramConfig, core::metric::MetricEvent};

/// Syslog "informational".
pub const SEVERITY_INFORMATIONAL: u8 = 6;

#[derive(Serialize, Debug)]
struct DatagramMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    logger: &'a str,
    severity: u8,
    fields: &'a Map<String, Value>,
    hostname: Option<&'a str>,
    timestamp: i64,
}

/// Wildcard local address of the same family as `remote`.
fn local_bind_address(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}

/// `host:port`, with IPv6 literals bracketed.
fn endpoint_of(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

pub struct DatagramHandler {
    socket: UdpSocket,
    endpoint: String,
    logger: String,
    filter: SinkFilter,
}

impl DatagramHandler {
    /// Resolves `endpoint`, binds an ephemeral local port of the same address
    /// family and connects it to the first resolved address.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::Io` if the endpoint cannot be resolved or the
    /// socket cannot be bound.
    pub async fn new(
        endpoint: impl Into<String>,
        logger: impl Into<String>,
        filter: SinkFilter,
    ) -> Result<Self, HandlerError> {
        let endpoint = endpoint.into();
        let io_error = |source: io::Error| HandlerError::Io {
            endpoint: endpoint.clone(),
            source,
        };

        let remote = lookup_host(&endpoint)
            .await
            .map_err(io_error)?
            .next()
            .ok_or_else(|| {
                io_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "endpoint resolved to no address",
                ))
            })?;
        let socket = UdpSocket::bind(local_bind_address(&remote))
            .await
            .map_err(io_error)?;
        socket.connect(remote).await.map_err(io_error)?;
        debug!("Datagram handler sending to {} ({})", endpoint, remote);

        Ok(DatagramHandler {
            socket,
            endpoint,
            logger: logger.into(),
            filter,
        })
    }

    pub async fn from_config(config: &DatagramConfig) -> Result<Self, HandlerError> {
        let filter = SinkFilter::try_from(config.include_filters.clone())?;
        Self::new(
            endpoint_of(&config.host, config.port),
            config.logger.clone(),
            filter,
        )
        .await
    }
}

#[async_trait::async_trait]
impl Handler for DatagramHandler {
    fn name(&self) -> &'static str {
        "datagram"
    }

    async fn process(&self, event: &MetricEvent) -> Result<(), HandlerError> {
        let path = format!("{}.{}", event.collector_path()?, event.metric_path()?);
        if !self.filter.should_emit(&path) {
            debug!("Datagram handler: skip {}, no include_filters match", path);
            return Ok(());
        }

        let message = DatagramMessage {
            kind: &path,
            logger: &self.logger,
            severity: SEVERITY_INFORMATIONAL,
            fields: event.fields(),
            hostname: event.host(),
            timestamp: event.timestamp(),
        };
        let payload = serde_json::to_vec(&message)?;

        self.socket
            .send(&payload)
            .await
            .map_err(|source| HandlerError::Send {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        trace!("Sent {} bytes for {}", payload.len(), path);
        Ok(())
    }
}
