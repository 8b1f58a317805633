use frame_scan_common::document::{BoundingBox, DeviceSnapshot, DocumentLabel};
use frame_scan_common::frame::Frame;

use crate::error::DetectionError;

/// Output of the document classifier for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub document_bounds: BoundingBox,
    pub label: DocumentLabel,
    pub confidence: f32,
}

/// Output of the motion-blur detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionResult {
    pub has_motion_blur: bool,
    /// IoU against the previous document box, `None` for the first frame.
    pub iou: Option<f32>,
    pub stable_frames: u32,
}

/// Document region and class detector.
///
/// Called from worker threads, possibly several at once; implementations
/// must be safe to share.
pub trait Classifier: Send + Sync {
    /// `Ok(None)` means the frame was readable but no document was found.
    fn classify(&self, frame: &Frame) -> Result<Option<ClassificationResult>, DetectionError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Motion-blur signal derived from the stability of recent document boxes.
pub trait MotionDetector: Send + Sync {
    fn motion_state(&self, document_bounds: BoundingBox) -> MotionResult;

    /// Forget box history, e.g. after a frame without a document.
    fn reset(&self) {}
}

/// Source of the camera's current device state.
pub trait CameraSession: Send + Sync {
    /// Must be cheap and non-blocking; called once per scan before admission.
    fn current_device_snapshot(&self) -> Option<DeviceSnapshot>;
}

impl<F> CameraSession for F
where
    F: Fn() -> Option<DeviceSnapshot> + Send + Sync,
{
    fn current_device_snapshot(&self) -> Option<DeviceSnapshot> {
        self()
    }
}
