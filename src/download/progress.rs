//! Throughput accounting for a single transfer.

use std::time::{Duration, Instant};

use tracing::info;

use super::constants::PROGRESS_INTERVAL;

/// One throughput measurement taken during a transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Bytes received since the previous sample.
    pub bytes_delta: u64,
    /// Time elapsed since the previous sample.
    pub time_delta: Duration,
    /// Bytes received so far.
    pub total_bytes: u64,
    /// Expected size from `Content-Length`, when the server sent a non-zero one.
    pub expected_bytes: Option<u64>,
}

impl ProgressSample {
    /// Instantaneous throughput in bytes per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.time_delta.as_secs_f64();
        if secs > 0.0 {
            self.bytes_delta as f64 / secs
        } else {
            0.0
        }
    }

    /// Percent complete, when the expected size is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        self.expected_bytes
            .filter(|&expected| expected > 0)
            .map(|expected| self.total_bytes as f64 / expected as f64 * 100.0)
    }
}

/// Receives progress samples while a transfer runs.
pub trait ProgressObserver: Send + Sync {
    /// Called at most once per sampling interval for the transfer of `filename`.
    fn on_sample(&self, filename: &str, sample: &ProgressSample);
}

/// Observer that logs each sample at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_sample(&self, filename: &str, sample: &ProgressSample) {
        let speed = format_speed(sample.bytes_per_sec());
        match sample.percent() {
            Some(percent) => info!(
                filename,
                speed = %speed,
                bytes = sample.total_bytes,
                "progress {percent:.1}%"
            ),
            None => info!(filename, speed = %speed, bytes = sample.total_bytes, "progress"),
        }
    }
}

/// Observer that discards samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_sample(&self, _filename: &str, _sample: &ProgressSample) {}
}

/// Accumulates received bytes and emits a [`ProgressSample`] once per interval.
#[derive(Debug)]
pub struct ThroughputMeter {
    started: Instant,
    last_sample_at: Instant,
    bytes_at_last_sample: u64,
    total_bytes: u64,
    expected_bytes: Option<u64>,
    interval: Duration,
}

impl ThroughputMeter {
    /// Starts a meter at `now`. A zero `expected_bytes` is treated as unknown.
    #[must_use]
    pub fn new(now: Instant, expected_bytes: Option<u64>) -> Self {
        Self::with_interval(now, expected_bytes, PROGRESS_INTERVAL)
    }

    /// Starts a meter with a custom sampling interval.
    #[must_use]
    pub fn with_interval(now: Instant, expected_bytes: Option<u64>, interval: Duration) -> Self {
        Self {
            started: now,
            last_sample_at: now,
            bytes_at_last_sample: 0,
            total_bytes: 0,
            expected_bytes: expected_bytes.filter(|&n| n > 0),
            interval,
        }
    }

    /// Records `bytes` received at `now`; returns a sample when the interval elapsed.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<ProgressSample> {
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        let time_delta = now.saturating_duration_since(self.last_sample_at);
        if time_delta < self.interval {
            return None;
        }
        let sample = ProgressSample {
            bytes_delta: self.total_bytes - self.bytes_at_last_sample,
            time_delta,
            total_bytes: self.total_bytes,
            expected_bytes: self.expected_bytes,
        };
        self.last_sample_at = now;
        self.bytes_at_last_sample = self.total_bytes;
        Some(sample)
    }

    /// Bytes recorded so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Time since the meter started, measured at `now`.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

/// Average throughput of `bytes` over `elapsed`, in bytes per second.
///
/// Returns `None` when `elapsed` rounds to zero milliseconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_speed(bytes: u64, elapsed: Duration) -> Option<f64> {
    if elapsed.as_millis() == 0 {
        return None;
    }
    Some(bytes as f64 / elapsed.as_secs_f64())
}

/// Formats a byte rate with 1024-based units and two decimals (`2.50 MB/s`).
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut value = bytes_per_sec;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB/s")
}
