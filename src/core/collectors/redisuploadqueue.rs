//! Upload queue lengths read from Redis with `LLEN`.

use std::{collections::BTreeMap, io, time::Duration};

use redis::{aio::MultiplexedConnection, Client};
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use super::{
    context::{CollectorContext, CollectorSettings},
    error::CollectorError,
    traits::{Collector, FromSettings},
    types::CollectorResult,
};
use crate::{
    core::metric::{unix_now, MetricEvent},
    register_collector,
};

const NAME: &str = "redisuploadqueue";

fn default_queues() -> BTreeMap<String, String> {
    [
        ("celery", "length"),
        ("data-export", "data-export-length"),
        ("data-export-research", "data-export-research-length"),
    ]
    .into_iter()
    .map(|(queue, metric)| (queue.to_string(), metric.to_string()))
    .collect()
}

/// Options accepted under `[metrics.collectors.options]` for `redisuploadqueue`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisUploadQueueOptions {
    pub host: String,
    pub port: u16,
    /// Bound on connecting plus all queries, in seconds.
    pub timeout_secs: u64,
    /// Queue name to metric name.
    pub queues: BTreeMap<String, String>,
}

impl Default for RedisUploadQueueOptions {
    fn default() -> Self {
        RedisUploadQueueOptions {
            host: "localhost".into(),
            port: 6379,
            timeout_secs: 5,
            queues: default_queues(),
        }
    }
}

impl RedisUploadQueueOptions {
    fn url(&self) -> String {
        if self.host.contains(':') {
            format!("redis://[{}]:{}/", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }
}

pub struct RedisUploadQueueCollector {
    context: CollectorContext,
    client: Client,
    endpoint: String,
    timeout: Duration,
    queues: BTreeMap<String, String>,
}

impl FromSettings for RedisUploadQueueCollector {
    fn from_settings(settings: CollectorSettings) -> CollectorResult<Self> {
        let options: RedisUploadQueueOptions = settings.options(NAME)?;
        if options.timeout_secs == 0 {
            return Err(CollectorError::InvalidOptions {
                collector: NAME.to_string(),
                reason: "timeout_secs must be at least 1".to_string(),
            });
        }
        let client = Client::open(options.url()).map_err(|e| CollectorError::InvalidOptions {
            collector: NAME.to_string(),
            reason: format!("bad Redis address {}:{}: {}", options.host, options.port, e),
        })?;
        Ok(RedisUploadQueueCollector {
            context: settings.context,
            client,
            endpoint: format!("{}:{}", options.host, options.port),
            timeout: Duration::from_secs(options.timeout_secs),
            queues: options.queues,
        })
    }
}

impl RedisUploadQueueCollector {
    fn redis_error(&self, operation: impl Into<String>, source: redis::RedisError) -> CollectorError {
        CollectorError::Redis {
            endpoint: self.endpoint.clone(),
            operation: operation.into(),
            source,
        }
    }

    async fn query_lengths(&self) -> CollectorResult<Vec<(String, i64)>> {
        let mut connection: MultiplexedConnection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| self.redis_error("connect", e))?;

        let mut lengths = Vec::with_capacity(self.queues.len());
        for (queue, metric) in &self.queues {
            let length = redis::cmd("LLEN")
                .arg(queue)
                .query_async::<i64>(&mut connection)
                .await
                .map_err(|e| self.redis_error(format!("LLEN {}", queue), e))?;
            debug!("Redis queue '{}' has {} entries", queue, length);
            lengths.push((metric.clone(), length));
        }

        Ok(lengths)
    }
}

#[async_trait::async_trait]
impl Collector for RedisUploadQueueCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(&self) -> CollectorResult<Vec<MetricEvent>> {
        let lengths = timeout(self.timeout, self.query_lengths())
            .await
            .map_err(|_| CollectorError::Connection {
                endpoint: self.endpoint.clone(),
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", self.timeout),
                ),
            })??;

        let now = unix_now();
        lengths
            .into_iter()
            .map(|(metric, length)| self.context.event_at(&metric, length as f64, now))
            .collect()
    }
}

register_collector!(RedisUploadQueueCollector, "redisuploadqueue");

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{tcp::OwnedReadHalf, TcpListener},
    };

    use super::*;

    fn collector(options: toml::Table) -> CollectorResult<RedisUploadQueueCollector> {
        RedisUploadQueueCollector::from_settings(CollectorSettings::new(
            CollectorContext::new("servers", "worker1", "redisuploadqueue"),
            options,
        ))
    }

    fn endpoint_options(port: u16, timeout_secs: u64) -> toml::Table {
        toml::from_str(&format!(
            "host = \"127.0.0.1\"\nport = {}\ntimeout_secs = {}",
            port, timeout_secs
        ))
        .unwrap()
    }

    /// Reads one request, a RESP array of bulk strings.
    async fn read_request(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Option<Vec<String>> {
        let header = lines.next_line().await.ok()??;
        let count: usize = header.strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            lines.next_line().await.ok()??;
            args.push(lines.next_line().await.ok()??);
        }
        Some(args)
    }

    /// Serves every connection, answering each request with `answer`.
    async fn fake_redis(answer: fn(&[String]) -> String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (reader, mut writer) = socket.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    while let Some(args) = read_request(&mut lines).await {
                        if writer.write_all(answer(&args).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    fn is_llen(args: &[String]) -> Option<&str> {
        match args {
            [command, queue] if command.eq_ignore_ascii_case("LLEN") => Some(queue),
            _ => None,
        }
    }

    /// LLEN answers the length of the queue name; anything else is acknowledged.
    fn name_length(args: &[String]) -> String {
        match is_llen(args) {
            Some(queue) => format!(":{}\r\n", queue.len()),
            None => "+OK\r\n".to_string(),
        }
    }

    fn wrong_type(args: &[String]) -> String {
        match is_llen(args) {
            Some(_) => "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
                .to_string(),
            None => "+OK\r\n".to_string(),
        }
    }

    #[test]
    fn test_default_queues() {
        let collector = collector(toml::Table::new()).unwrap();
        assert_eq!(collector.endpoint, "localhost:6379");
        assert_eq!(collector.queues.get("celery").map(String::as_str), Some("length"));
        assert_eq!(collector.queues.len(), 3);
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let options = RedisUploadQueueOptions {
            host: "::1".into(),
            ..Default::default()
        };
        assert_eq!(options.url(), "redis://[::1]:6379/");
        assert_eq!(RedisUploadQueueOptions::default().url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let options: toml::Table = toml::from_str("timeout_secs = 0").unwrap();
        assert!(matches!(
            collector(options),
            Err(CollectorError::InvalidOptions { .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_queue_lengths() {
        let port = fake_redis(name_length).await;
        let collector = collector(endpoint_options(port, 2)).unwrap();

        let events = collector.collect().await.unwrap();
        let lengths: BTreeMap<String, f64> = events
            .iter()
            .map(|event| (event.metric_path().unwrap().to_string(), event.value().unwrap()))
            .collect();

        assert_eq!(lengths["length"], 6.0);
        assert_eq!(lengths["data-export-length"], 11.0);
        assert_eq!(lengths["data-export-research-length"], 20.0);
        assert_eq!(
            events[0].path().split('.').take(3).collect::<Vec<_>>(),
            ["servers", "worker1", "redisuploadqueue"]
        );
    }

    #[tokio::test]
    async fn test_error_reply_names_the_command() {
        let port = fake_redis(wrong_type).await;
        let collector = collector(endpoint_options(port, 2)).unwrap();

        match collector.collect().await {
            Err(CollectorError::Redis {
                operation, source, ..
            }) => {
                assert_eq!(operation, "LLEN celery");
                assert!(!source.is_io_error());
            }
            other => panic!("unexpected result: {:?}", other.map(|events| events.len())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let collector = collector(endpoint_options(port, 2)).unwrap();
        match collector.collect().await {
            Err(CollectorError::Redis { operation, .. }) => assert_eq!(operation, "connect"),
            other => panic!("unexpected result: {:?}", other.map(|events| events.len())),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let collector = collector(endpoint_options(port, 1)).unwrap();
        let started = std::time::Instant::now();
        match collector.collect().await {
            Err(CollectorError::Connection { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::TimedOut)
            }
            // The client may give up on its own first.
            Err(CollectorError::Redis { source, .. }) => assert!(source.is_timeout()),
            other => panic!("unexpected result: {:?}", other.map(|events| events.len())),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
