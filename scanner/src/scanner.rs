use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use frame_scan_common::config::Config;
use frame_scan_common::document::DeviceSnapshot;
use frame_scan_common::frame::Frame;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::admission::AdmissionGate;
use crate::completion::{CompletionContext, Inline};
use crate::detector::{BoxStabilityMotionDetector, CameraSession, Classifier, MotionDetector};
use crate::error::{DetectionError, ScanError};
use crate::events::ScanEventSink;
use crate::quality::{ScanOutcome, ScanVerdict};
use crate::stats::{SessionStats, SessionStatsTracker, ThroughputReport};

/// Bounded-concurrency frame scanner.
///
/// Each frame goes through: device snapshot, admission (blocking), detectors
/// on the runtime's blocking pool, slot release, then delivery on the
/// caller's completion context. Completions of different frames may arrive
/// in any order.
pub struct Scanner {
    gate: Arc<AdmissionGate>,
    stats: Arc<SessionStatsTracker>,
    classifier: Arc<dyn Classifier>,
    motion: Arc<dyn MotionDetector>,
    events: Option<Arc<dyn ScanEventSink>>,
    workers: Handle,
    report_throughput: bool,
}

/// Everything a worker needs to scan one frame, detached from the `Scanner`
/// so in-flight work completes even if the scanner is dropped.
struct ScanJob {
    stats: Arc<SessionStatsTracker>,
    classifier: Arc<dyn Classifier>,
    motion: Arc<dyn MotionDetector>,
    events: Option<Arc<dyn ScanEventSink>>,
}

impl Scanner {
    pub fn new(
        max_concurrent: usize,
        classifier: Arc<dyn Classifier>,
        motion: Arc<dyn MotionDetector>,
        workers: Handle,
    ) -> Result<Self, ScanError> {
        Ok(Self {
            gate: AdmissionGate::new(max_concurrent)?,
            stats: Arc::new(SessionStatsTracker::new()),
            classifier,
            motion,
            events: None,
            workers,
            report_throughput: true,
        })
    }

    /// Build a scanner with the box-stability motion detector configured from `config`.
    pub fn from_config(
        config: &Config,
        classifier: Arc<dyn Classifier>,
        workers: Handle,
    ) -> Result<Self, ScanError> {
        let motion = Arc::new(BoxStabilityMotionDetector::from_config(&config.motion));
        let scanner = Self::new(config.scanner.max_concurrent, classifier, motion, workers)?
            .with_throughput_reports(config.stats.report_throughput);
        info!(
            max_concurrent = config.scanner.max_concurrent,
            classifier = scanner.classifier.name(),
            iou_threshold = config.motion.iou_threshold,
            min_stable_frames = config.motion.min_stable_frames,
            "scanner ready"
        );
        Ok(scanner)
    }

    pub fn with_event_sink(mut self, events: Arc<dyn ScanEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether `reset` forwards its report to the event sink. Counting is unaffected.
    pub fn with_throughput_reports(mut self, enabled: bool) -> Self {
        self.report_throughput = enabled;
        self
    }

    /// Scan one frame and deliver the outcome to `on_complete` on `completion`.
    ///
    /// Blocks the calling thread while `max_concurrent` scans are already in
    /// flight. Must not be called from an async task; a producer calling this
    /// in a loop is throttled to the detectors' pace.
    ///
    /// `on_complete` runs exactly once, including when the classifier fails
    /// or panics. If the worker runtime has shut down it runs inline with a
    /// `Cancelled` failure.
    pub fn scan_image<C, F>(
        &self,
        frame: Frame,
        session: &dyn CameraSession,
        completion: C,
        on_complete: F,
    ) where
        C: CompletionContext + 'static,
        F: FnOnce(ScanOutcome) + Send + 'static,
    {
        // Snapshot before blocking so it reflects capture time, not processing time.
        let device = session.current_device_snapshot();
        let seq = frame.seq;

        let permit = self.gate.acquire();
        trace!(seq, in_flight = self.gate.in_flight(), "frame admitted");

        let job = self.job();
        let delivery = Delivery {
            seq,
            target: Some((completion, on_complete)),
        };
        self.workers.spawn_blocking(move || {
            let outcome = job.run(frame, device);
            drop(permit);
            delivery.deliver(outcome);
        });
    }

    /// Like [`scan_image`](Self::scan_image), delivering through a oneshot channel.
    ///
    /// Admission still blocks the calling thread.
    pub fn scan(&self, frame: Frame, session: &dyn CameraSession) -> oneshot::Receiver<ScanOutcome> {
        let (tx, rx) = oneshot::channel();
        self.scan_image(frame, session, Inline, move |outcome| {
            // The receiver may have been dropped; the outcome is then discarded.
            let _ = tx.send(outcome);
        });
        rx
    }

    /// Report throughput for the current session window and start a new one.
    ///
    /// In-flight scans are unaffected and will count toward the new window.
    pub fn reset(&self) -> ThroughputReport {
        let report = self.stats.reset();
        if self.report_throughput {
            if let Some(events) = &self.events {
                events.throughput_reported(&report);
            }
        }
        report
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }

    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn max_concurrent(&self) -> usize {
        self.gate.capacity()
    }

    fn job(&self) -> ScanJob {
        ScanJob {
            stats: Arc::clone(&self.stats),
            classifier: Arc::clone(&self.classifier),
            motion: Arc::clone(&self.motion),
            events: self.events.clone(),
        }
    }
}

impl ScanJob {
    fn run(self, frame: Frame, device: Option<DeviceSnapshot>) -> ScanOutcome {
        let seq = frame.seq;
        self.stats.record_scan_start();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.detect(frame, device)))
            .unwrap_or_else(|payload| ScanOutcome::Failed {
                seq,
                error: DetectionError::Panicked(panic_message(payload.as_ref())),
            });

        if let ScanOutcome::Failed { error, .. } = &outcome {
            debug!(seq, error = %error, "scan failed");
            if let Some(events) = &self.events {
                events.detector_failed(seq, self.classifier.name(), error);
            }
        }

        self.stats.record_scan_end();
        outcome
    }

    fn detect(&self, frame: Frame, device: Option<DeviceSnapshot>) -> ScanOutcome {
        let seq = frame.seq;
        let classified = self.classifier.classify(&frame);
        // The pixel buffer is not needed past classification.
        drop(frame);

        match classified {
            Ok(Some(classification)) => {
                let motion = self.motion.motion_state(classification.document_bounds);
                trace!(
                    seq,
                    label = %classification.label,
                    confidence = classification.confidence,
                    has_motion_blur = motion.has_motion_blur,
                    "frame classified"
                );
                ScanOutcome::Scanned(ScanVerdict {
                    seq,
                    classification,
                    motion,
                    device,
                })
            }
            Ok(None) => {
                self.motion.reset();
                ScanOutcome::NoDocument { seq }
            }
            Err(error) => ScanOutcome::Failed { seq, error },
        }
    }
}

/// The caller's completion target for one scan.
///
/// Dropped undelivered when the worker runtime discards the job; the caller
/// then gets a `Cancelled` failure inline.
struct Delivery<C, F>
where
    C: CompletionContext,
    F: FnOnce(ScanOutcome) + Send + 'static,
{
    seq: u64,
    target: Option<(C, F)>,
}

impl<C, F> Delivery<C, F>
where
    C: CompletionContext,
    F: FnOnce(ScanOutcome) + Send + 'static,
{
    fn deliver(mut self, outcome: ScanOutcome) {
        if let Some((completion, on_complete)) = self.target.take() {
            completion.execute(Box::new(move || on_complete(outcome)));
        }
    }
}

impl<C, F> Drop for Delivery<C, F>
where
    C: CompletionContext,
    F: FnOnce(ScanOutcome) + Send + 'static,
{
    fn drop(&mut self) {
        if let Some((_, on_complete)) = self.target.take() {
            warn!(seq = self.seq, "worker runtime dropped the scan, delivering cancellation");
            on_complete(ScanOutcome::Failed {
                seq: self.seq,
                error: DetectionError::Cancelled("worker runtime is shut down".into()),
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
