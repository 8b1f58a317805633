use tracing::{info, warn};

use crate::error::DetectionError;
use crate::stats::ThroughputReport;

/// Optional receiver of scanner events for error reporting and analytics.
///
/// Calls happen on worker threads and must return quickly.
pub trait ScanEventSink: Send + Sync {
    fn detector_failed(&self, seq: u64, detector: &str, error: &DetectionError);

    fn throughput_reported(&self, report: &ThroughputReport);
}

/// Emits scanner events as structured log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl ScanEventSink for TracingEventSink {
    fn detector_failed(&self, seq: u64, detector: &str, error: &DetectionError) {
        warn!(seq, detector, error = %error, "detector failed");
    }

    fn throughput_reported(&self, report: &ThroughputReport) {
        match report.frames_per_second {
            Some(fps) => info!(
                frames = report.processed_frames,
                elapsed = ?report.elapsed,
                fps = format!("{fps:.2}"),
                "scan throughput"
            ),
            None => info!(
                frames = report.processed_frames,
                "scan throughput unavailable"
            ),
        }
    }
}
