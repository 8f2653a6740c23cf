//! Sent-bytes and frame-rate accounting for periodic log lines.

use std::time::{Duration, Instant};

/// One reporting window's averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReport {
    pub bytes_per_sec: f64,
    pub frames_per_sec: f64,
    pub elapsed: Duration,
}

impl ThroughputReport {
    pub fn kib_per_sec(&self) -> f64 {
        self.bytes_per_sec / 1024.0
    }
}

/// Accumulates `(bytes, frames)` and yields a report once per interval.
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Option<Instant>,
    bytes: u64,
    frames: u64,
    total_bytes: u64,
    total_frames: u64,
}

impl ThroughputMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: None,
            bytes: 0,
            frames: 0,
            total_bytes: 0,
            total_frames: 0,
        }
    }

    /// Record one sent packet of `bytes` at the current instant.
    pub fn record(&mut self, bytes: usize) -> Option<ThroughputReport> {
        self.record_at(Instant::now(), bytes)
    }

    /// Record with an explicit timestamp (useful for testing).
    ///
    /// Returns a report and starts a new window once `interval` has elapsed
    /// since the window opened. The first call only opens the window: its
    /// frame marks the start instant and is not part of any rate.
    pub fn record_at(&mut self, now: Instant, bytes: usize) -> Option<ThroughputReport> {
        self.total_bytes += bytes as u64;
        self.total_frames += 1;

        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.bytes += bytes as u64;
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed.is_zero() || elapsed < self.interval {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let report = ThroughputReport {
            bytes_per_sec: self.bytes as f64 / secs,
            frames_per_sec: self.frames as f64 / secs,
            elapsed,
        };
        self.window_start = Some(now);
        self.bytes = 0;
        self.frames = 0;
        Some(report)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────
