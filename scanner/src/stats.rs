use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counters for the current scanning session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub first_scan_start: Option<Instant>,
    pub last_scan_end: Option<Instant>,
    pub processed_frames: u64,
}

/// Throughput over one stats window, produced by [`SessionStatsTracker::reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    pub processed_frames: u64,
    /// `None` when the window never started or ended.
    pub elapsed: Option<Duration>,
    /// `None` ("unavailable") when there is no positive window to divide by.
    pub frames_per_second: Option<f64>,
}

impl SessionStats {
    fn throughput(&self) -> ThroughputReport {
        let elapsed = match (self.first_scan_start, self.last_scan_end) {
            (Some(start), Some(end)) => end.checked_duration_since(start),
            _ => None,
        };
        let frames_per_second = elapsed
            .map(|e| e.as_secs_f64())
            .filter(|secs| *secs > 0.0)
            .map(|secs| self.processed_frames as f64 / secs);
        ThroughputReport {
            processed_frames: self.processed_frames,
            elapsed,
            frames_per_second,
        }
    }
}

/// Session statistics behind their own lock, independent of the admission gate.
///
/// Every operation is O(1) and never held across detector work.
#[derive(Debug, Default)]
pub struct SessionStatsTracker {
    inner: Mutex<SessionStats>,
}

impl SessionStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of the window. Only the first call after a reset has effect.
    pub fn record_scan_start(&self) {
        self.record_scan_start_at(Instant::now());
    }

    pub fn record_scan_end(&self) {
        self.record_scan_end_at(Instant::now());
    }

    pub fn record_scan_start_at(&self, at: Instant) {
        let mut stats = self.lock();
        if stats.first_scan_start.is_none() {
            stats.first_scan_start = Some(at);
        }
    }

    pub fn record_scan_end_at(&self, at: Instant) {
        let mut stats = self.lock();
        stats.last_scan_end = Some(at);
        stats.processed_frames += 1;
    }

    pub fn snapshot(&self) -> SessionStats {
        self.lock().clone()
    }

    /// Compute throughput for the current window and clear it in one step.
    pub fn reset(&self) -> ThroughputReport {
        let mut stats = self.lock();
        let report = stats.throughput();
        *stats = SessionStats::default();
        report
    }

    fn lock(&self) -> MutexGuard<'_, SessionStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
