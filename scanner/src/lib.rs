//! Bounded-concurrency document frame scanning.
//!
//! A [`Scanner`] takes frames from a producer, caps how many detector
//! invocations run at once through an [`AdmissionGate`], composes the
//! classifier and motion detector outputs into a [`ScanVerdict`], and
//! delivers each [`ScanOutcome`] on a caller-chosen [`CompletionContext`].

pub mod admission;
pub mod completion;
pub mod detector;
pub mod error;
pub mod events;
pub mod quality;
pub mod scanner;
pub mod stats;

pub use admission::{AdmissionGate, AdmissionPermit, DEFAULT_MAX_CONCURRENT};
pub use completion::{CompletionContext, Inline, SerialQueue};
pub use detector::{
    BoxStabilityMotionDetector, CameraSession, ClassificationResult, Classifier, MotionDetector,
    MotionResult,
};
pub use error::{DetectionError, ScanError};
pub use events::{ScanEventSink, TracingEventSink};
pub use quality::{is_high_quality, ScanOutcome, ScanVerdict};
pub use scanner::Scanner;
pub use stats::{SessionStats, SessionStatsTracker, ThroughputReport};
