//! Counter-to-rate normalization.
//!
//! Services expose cumulative counters (lock time, operations, bytes) that
//! only grow until the service restarts. [`RateNormalizer`] remembers the
//! last reading of each counter and turns the next one into a per-tick rate
//! or a plain delta. Timestamps are integer ticks: seconds by convention,
//! though a collector may use any monotonic clock such as a server uptime.

use std::collections::HashMap;

use tracing::{debug, trace};

/// How an observation is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Delta divided by the elapsed interval.
    Rate,
    /// Delta since the previous reading.
    Delta,
    /// The cumulative reading itself; state is still tracked.
    Raw,
}

/// What to do with the first reading of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstSample {
    /// Store the baseline and report nothing.
    #[default]
    Suppress,
    /// Store the baseline and report the reading as an instantaneous snapshot.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    /// First reading of the counter, reported as a snapshot.
    Baseline,
    Measured,
    /// The counter went backwards; the reading became the new baseline.
    Reset,
}

/// A reported observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    /// Ticks between this reading and the previous one; 0 for a baseline.
    pub interval: i64,
    pub kind: ReadingKind,
}

impl Reading {
    /// Multiplies the reported value by a caller-supplied factor.
    pub fn scaled(self, factor: f64) -> Self {
        Reading {
            value: self.value * factor,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CounterState {
    last_value: f64,
    last_timestamp: i64,
}

/// Per-collector store of counter baselines.
///
/// One instance belongs to one collector instance and lives as long as it.
/// Nothing is persisted, so a process restart looks like a counter reset.
#[derive(Debug, Default)]
pub struct RateNormalizer {
    counters: HashMap<String, CounterState>,
    first_sample: FirstSample,
}

impl RateNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first_sample(first_sample: FirstSample) -> Self {
        RateNormalizer {
            counters: HashMap::new(),
            first_sample,
        }
    }

    /// Records a cumulative reading and reports it according to `mode`.
    ///
    /// Returns `None` when nothing should be emitted: the first reading under
    /// [`FirstSample::Suppress`], or a reading whose timestamp is not after
    /// the stored one (duplicate or out of order), or one so far from it that
    /// the interval does not fit an `i64`. In the latter cases the stored
    /// state is left untouched.
    pub fn observe(&mut self, key: &str, value: f64, now: i64, mode: Mode) -> Option<Reading> {
        let Some(state) = self.counters.get_mut(key) else {
            self.counters.insert(
                key.to_string(),
                CounterState {
                    last_value: value,
                    last_timestamp: now,
                },
            );
            trace!("Stored baseline for counter '{}': {} at {}", key, value, now);
            return match self.first_sample {
                FirstSample::Suppress => None,
                FirstSample::Snapshot => Some(Reading {
                    value,
                    interval: 0,
                    kind: ReadingKind::Baseline,
                }),
            };
        };

        let interval = match now.checked_sub(state.last_timestamp) {
            Some(interval) if interval > 0 => interval,
            _ => {
                debug!(
                    "Counter '{}' observed at {} but last reading was at {}; skipping",
                    key, now, state.last_timestamp
                );
                return None;
            }
        };

        let mut delta = value - state.last_value;
        let mut kind = ReadingKind::Measured;
        if delta < 0.0 {
            debug!(
                "Counter '{}' went backwards ({} -> {}); treating as reset",
                key, state.last_value, value
            );
            delta = 0.0;
            kind = ReadingKind::Reset;
        }

        state.last_value = value;
        state.last_timestamp = now;

        let reported = match mode {
            Mode::Rate => delta / interval as f64,
            Mode::Delta => delta,
            Mode::Raw => value,
        };

        Some(Reading {
            value: reported,
            interval,
            kind,
        })
    }

    /// Drops the baseline of a counter; its next reading starts over.
    pub fn forget(&mut self, key: &str) -> bool {
        self.counters.remove(key).is_some()
    }

    /// Last stored `(value, timestamp)` of a counter.
    pub fn last(&self, key: &str) -> Option<(f64, i64)> {
        self.counters
            .get(key)
            .map(|state| (state.last_value, state.last_timestamp))
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_first_sample_is_suppressed_by_default() {
        let mut normalizer = RateNormalizer::new();
        assert_eq!(normalizer.observe("ops", 100.0, T0, Mode::Rate), None);
        assert_eq!(normalizer.last("ops"), Some((100.0, T0)));
    }

    #[test]
    fn test_first_sample_snapshot_is_not_a_rate() {
        let mut normalizer = RateNormalizer::with_first_sample(FirstSample::Snapshot);
        let reading = normalizer.observe("ops", 100.0, T0, Mode::Rate).unwrap();
        assert_eq!(reading.value, 100.0);
        assert_eq!(reading.interval, 0);
        assert_eq!(reading.kind, ReadingKind::Baseline);
    }

    #[test]
    fn test_rate_over_interval() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("ops", 100.0, T0, Mode::Rate);
        let reading = normalizer.observe("ops", 220.0, T0 + 60, Mode::Rate).unwrap();
        assert_eq!(reading.value, 2.0);
        assert_eq!(reading.interval, 60);
        assert_eq!(reading.kind, ReadingKind::Measured);
    }

    #[test]
    fn test_delta_and_raw_modes() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("a", 10.0, T0, Mode::Delta);
        assert_eq!(normalizer.observe("a", 25.0, T0 + 5, Mode::Delta).unwrap().value, 15.0);

        normalizer.observe("b", 10.0, T0, Mode::Raw);
        let reading = normalizer.observe("b", 25.0, T0 + 5, Mode::Raw).unwrap();
        assert_eq!(reading.value, 25.0);
        assert_eq!(normalizer.last("b"), Some((25.0, T0 + 5)));
    }

    #[test]
    fn test_reset_never_reports_negative() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("k", 500.0, T0, Mode::Delta);

        let reset = normalizer.observe("k", 10.0, T0 + 10, Mode::Delta).unwrap();
        assert_eq!(reset.value, 0.0);
        assert_eq!(reset.interval, 10);
        assert_eq!(reset.kind, ReadingKind::Reset);

        let next = normalizer.observe("k", 40.0, T0 + 20, Mode::Delta).unwrap();
        assert_eq!(next.value, 30.0);
        assert_eq!(next.interval, 10);
        assert_eq!(next.kind, ReadingKind::Measured);
    }

    #[test]
    fn test_reset_in_rate_mode_is_zero() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("k", 500.0, T0, Mode::Rate);
        let reset = normalizer.observe("k", 10.0, T0 + 10, Mode::Rate).unwrap();
        assert_eq!(reset.value, 0.0);
    }

    #[test]
    fn test_no_time_passed_keeps_state() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("k", 100.0, T0, Mode::Rate);
        assert_eq!(normalizer.observe("k", 150.0, T0, Mode::Rate), None);
        assert_eq!(normalizer.observe("k", 150.0, T0 - 5, Mode::Rate), None);
        assert_eq!(normalizer.last("k"), Some((100.0, T0)));

        let reading = normalizer.observe("k", 160.0, T0 + 30, Mode::Rate).unwrap();
        assert_eq!(reading.value, 2.0);
    }

    #[test]
    fn test_unrepresentable_interval_keeps_state() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("early", 1.0, -1, Mode::Rate);
        assert_eq!(normalizer.observe("early", 2.0, i64::MAX, Mode::Rate), None);
        assert_eq!(normalizer.last("early"), Some((1.0, -1)));

        normalizer.observe("late", 1.0, 1, Mode::Delta);
        assert_eq!(normalizer.observe("late", 2.0, i64::MIN, Mode::Delta), None);
        assert_eq!(normalizer.last("late"), Some((1.0, 1)));

        let reading = normalizer.observe("late", 5.0, 3, Mode::Delta).unwrap();
        assert_eq!(reading.value, 4.0);
        assert_eq!(reading.interval, 2);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("read", 0.0, T0, Mode::Delta);
        normalizer.observe("write", 1000.0, T0, Mode::Delta);
        assert_eq!(normalizer.len(), 2);

        assert_eq!(normalizer.observe("read", 7.0, T0 + 1, Mode::Delta).unwrap().value, 7.0);
        assert_eq!(normalizer.observe("write", 1001.0, T0 + 1, Mode::Delta).unwrap().value, 1.0);
    }

    #[test]
    fn test_forget_restarts_baseline() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("k", 1.0, T0, Mode::Delta);
        assert!(normalizer.forget("k"));
        assert!(!normalizer.forget("k"));
        assert!(normalizer.is_empty());
        assert_eq!(normalizer.observe("k", 5.0, T0 + 1, Mode::Delta), None);
    }

    #[test]
    fn test_scaled_reading() {
        let mut normalizer = RateNormalizer::new();
        normalizer.observe("lock", 0.0, 0, Mode::Rate);
        // 5000 micros locked over 1000 millis of uptime is 0.5%.
        let reading = normalizer
            .observe("lock", 5000.0, 1000, Mode::Rate)
            .unwrap()
            .scaled(0.1);
        assert!((reading.value - 0.5).abs() < f64::EPSILON);
        assert_eq!(reading.interval, 1000);
    }
}
