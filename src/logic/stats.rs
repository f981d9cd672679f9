//! Running statistics for the sampling loop.
//!
//! Count and total are only ever reset together, which keeps
//! `throughput()` well defined.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    execution_count: u64,
    /// Nanoseconds: inter-sample gaps plus inference time
    total_execution_ns: u64,
    last_inference: Duration,
    /// End of the last committed inference (or the last reset)
    last_sample_at: Option<Instant>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm for a new running period
    pub fn reset(&mut self, now: Instant) {
        self.execution_count = 0;
        self.total_execution_ns = 0;
        self.last_sample_at = Some(now);
    }

    /// Commit one completed sample.
    ///
    /// `started` is when the sample began, `finished` when its inference
    /// returned. The gap since the previous sample (including any enforced
    /// sleep) and the inference itself both land in the total.
    pub fn record(&mut self, started: Instant, inference: Duration, finished: Instant) {
        if let Some(prev) = self.last_sample_at {
            self.add_time(started.saturating_duration_since(prev));
        }
        self.add_time(inference);
        self.execution_count += 1;
        self.last_inference = inference;
        self.last_sample_at = Some(finished);
    }

    fn add_time(&mut self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_execution_ns = self.total_execution_ns.saturating_add(nanos);
    }

    /// Samples per second.
    ///
    /// `count * 1000 / max(1, total_ms)`. The denominator is floored at one
    /// millisecond, so a zero count always yields 0 and a near-zero total
    /// yields `count * 1000`.
    pub fn throughput(&self) -> u64 {
        let total_ms = self.total_execution_ns / 1_000_000;
        self.execution_count.saturating_mul(1000) / total_ms.max(1)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            execution_count: self.execution_count,
            total_execution_ms: self.total_execution_ns / 1_000_000,
            last_inference_ms: u64::try_from(self.last_inference.as_millis()).unwrap_or(u64::MAX),
            throughput: self.throughput(),
        }
    }

    #[cfg(test)]
    pub(crate) fn execution_count(&self) -> u64 {
        self.execution_count
    }

    #[cfg(test)]
    pub(crate) fn total_execution_time(&self) -> Duration {
        Duration::from_nanos(self.total_execution_ns)
    }

    #[cfg(test)]
    pub(crate) fn last_inference(&self) -> Duration {
        self.last_inference
    }

    #[cfg(test)]
    pub(crate) fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    #[cfg(test)]
    pub(crate) fn with_totals(execution_count: u64, total: Duration) -> Self {
        Self {
            execution_count,
            total_execution_ns: u64::try_from(total.as_nanos()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }
}

/// Point-in-time view for status output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub execution_count: u64,
    pub total_execution_ms: u64,
    pub last_inference_ms: u64,
    pub throughput: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_zero_count_is_finite() {
        for total in [Duration::ZERO, Duration::from_micros(10), Duration::from_secs(3600)] {
            let stats = StatsAccumulator::with_totals(0, total);
            assert_eq!(stats.throughput(), 0);
        }
    }

    #[test]
    fn test_throughput_floors_denominator() {
        // Sub-millisecond totals are treated as one millisecond
        let stats = StatsAccumulator::with_totals(3, Duration::from_micros(400));
        assert_eq!(stats.throughput(), 3000);

        let stats = StatsAccumulator::with_totals(3, Duration::ZERO);
        assert_eq!(stats.throughput(), 3000);
    }

    #[test]
    fn test_throughput_samples_per_second() {
        let stats = StatsAccumulator::with_totals(10, Duration::from_secs(5));
        assert_eq!(stats.throughput(), 2);

        let stats = StatsAccumulator::with_totals(4, Duration::from_millis(1999));
        assert_eq!(stats.throughput(), 2);
    }

    #[test]
    fn test_record_accumulates_gap_and_inference() {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.reset(t0);

        let first_start = t0 + Duration::from_millis(10);
        let first_end = first_start + Duration::from_millis(40);
        stats.record(first_start, Duration::from_millis(40), first_end);

        let second_start = first_end + Duration::from_millis(60);
        let second_end = second_start + Duration::from_millis(30);
        stats.record(second_start, Duration::from_millis(30), second_end);

        assert_eq!(stats.execution_count(), 2);
        // 10 + 40 + 60 + 30
        assert_eq!(stats.total_execution_time(), Duration::from_millis(140));
        assert_eq!(stats.last_inference(), Duration::from_millis(30));
        assert_eq!(stats.last_sample_at(), Some(second_end));
    }

    #[test]
    fn test_reset_clears_count_and_total_together() {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.reset(t0);
        stats.record(t0, Duration::from_millis(5), t0 + Duration::from_millis(5));
        assert_eq!(stats.execution_count(), 1);

        let t1 = t0 + Duration::from_secs(1);
        stats.reset(t1);
        assert_eq!(stats.execution_count(), 0);
        assert_eq!(stats.total_execution_time(), Duration::ZERO);
        assert_eq!(stats.last_sample_at(), Some(t1));
    }

    #[test]
    fn test_sample_started_before_reset_adds_no_gap() {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.reset(t0 + Duration::from_millis(50));
        stats.record(t0, Duration::from_millis(5), t0 + Duration::from_millis(5));
        assert_eq!(stats.total_execution_time(), Duration::from_millis(5));
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let t0 = Instant::now();
        let mut stats = StatsAccumulator::new();
        stats.record(t0, Duration::MAX, t0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_inference_ms, u64::MAX);
        assert_eq!(snapshot.total_execution_ms, u64::MAX / 1_000_000);
        assert_eq!(snapshot.execution_count, 1);
    }
}
