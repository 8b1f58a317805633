use frame_scan_common::document::{DeviceSnapshot, DocumentSide, DocumentType};

use crate::detector::{ClassificationResult, MotionResult};
use crate::error::DetectionError;

/// Quality verdict for one frame in which a document was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
    pub seq: u64,
    pub classification: ClassificationResult,
    pub motion: MotionResult,
    /// Camera state at submission time; `None` when the session had none to offer.
    pub device: Option<DeviceSnapshot>,
}

impl ScanVerdict {
    pub fn is_high_quality(&self, wanted_type: DocumentType, wanted_side: DocumentSide) -> bool {
        is_high_quality(
            &self.classification,
            &self.motion,
            self.device.as_ref(),
            wanted_type,
            wanted_side,
        )
    }
}

/// Result delivered to the completion callback, exactly once per scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Scanned(ScanVerdict),
    /// The classifier ran but found no document in the frame.
    NoDocument { seq: u64 },
    Failed { seq: u64, error: DetectionError },
}

impl ScanOutcome {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Scanned(verdict) => verdict.seq,
            Self::NoDocument { seq } | Self::Failed { seq, .. } => *seq,
        }
    }

    /// The verdict, if any. Collapses "no document" and "detector failed" into `None`.
    pub fn verdict(&self) -> Option<&ScanVerdict> {
        match self {
            Self::Scanned(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A frame is high quality when it is sharp, shows the requested document
/// side, and the camera was not refocusing when it was captured.
pub fn is_high_quality(
    classification: &ClassificationResult,
    motion: &MotionResult,
    device: Option<&DeviceSnapshot>,
    wanted_type: DocumentType,
    wanted_side: DocumentSide,
) -> bool {
    let adjusting_focus = device.is_some_and(|d| d.is_adjusting_focus);
    !motion.has_motion_blur
        && classification.label.matches(wanted_type, wanted_side)
        && !adjusting_focus
}
