//! Hierarchical metric path encoding and decomposition.
//!
//! A metric path is a `.`-joined list of segments laid out as
//! `prefix.host.collector.metric...`. When the host is known the
//! decomposition anchors on its first occurrence in the path; without it
//! the segments are read positionally (index 0 is the prefix, index 2 the
//! collector, index 3 onward the metric).

use super::error::{MetricError, MetricResult};

/// Separator between path segments.
pub const DELIMITER: char = '.';

/// Stateless encoder/decoder for metric paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathCodec;

impl PathCodec {
    /// Joins the four parts of a metric path, skipping empty parts.
    ///
    /// ```
    /// use nectar::core::metric::PathCodec;
    ///
    /// let path = PathCodec::compose("servers", "web01", "cpu", "total.idle");
    /// assert_eq!(path, "servers.web01.cpu.total.idle");
    /// ```
    pub fn compose(prefix: &str, host: &str, collector: &str, metric: &str) -> String {
        [prefix, host, collector, metric]
            .iter()
            .filter(|segment| !segment.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string())
    }

    /// Returns the path prefix.
    ///
    /// Without a host this is the first segment. With a host it is everything
    /// before the first occurrence of the host, minus the joining delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::MalformedPath`] if `host` does not occur in `path`.
    pub fn prefix<'a>(path: &'a str, host: Option<&str>) -> MetricResult<&'a str> {
        match host {
            None => Ok(Self::segment(path, 0)),
            Some(host) => {
                let start = Self::host_offset(path, host)?;
                let head = &path[..start];
                Ok(head.strip_suffix(DELIMITER).unwrap_or(head))
            }
        }
    }

    /// Returns the collector segment.
    ///
    /// Without a host this is the third segment (empty if the path is
    /// shorter). With a host it is the segment right after the host.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::MalformedPath`] if `host` does not occur in `path`.
    pub fn collector_segment<'a>(path: &'a str, host: Option<&str>) -> MetricResult<&'a str> {
        match host {
            None => Ok(Self::segment(path, 2)),
            Some(host) => {
                let (start, end) = Self::collector_span(path, host)?;
                Ok(&path[start..end])
            }
        }
    }

    /// Returns the metric name following the collector segment.
    ///
    /// Without a host this is segments 3.. rejoined (empty when none remain).
    /// With a host it is everything after `host.collector.`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::MalformedPath`] if `host` does not occur in `path`.
    pub fn metric_suffix<'a>(path: &'a str, host: Option<&str>) -> MetricResult<&'a str> {
        match host {
            None => Ok(path
                .splitn(4, DELIMITER)
                .nth(3)
                .unwrap_or_default()),
            Some(host) => {
                let (_, end) = Self::collector_span(path, host)?;
                Ok(path.get(end + DELIMITER.len_utf8()..).unwrap_or_default())
            }
        }
    }

    fn segment(path: &str, index: usize) -> &str {
        path.split(DELIMITER).nth(index).unwrap_or_default()
    }

    fn host_offset(path: &str, host: &str) -> MetricResult<usize> {
        path.find(host).ok_or_else(|| MetricError::MalformedPath {
            path: path.to_string(),
            host: host.to_string(),
        })
    }

    /// Byte range of the collector segment when anchored on `host`.
    ///
    /// The character joining host and collector is skipped whatever it is,
    /// so both bounds always fall on char boundaries.
    fn collector_span(path: &str, host: &str) -> MetricResult<(usize, usize)> {
        let after_host = Self::host_offset(path, host)? + host.len();
        let start = path[after_host..]
            .chars()
            .next()
            .map_or(path.len(), |joint| after_host + joint.len_utf8());
        let end = path[start..]
            .find(DELIMITER)
            .map_or(path.len(), |offset| start + offset);
        Ok((start, end))
    }
}
