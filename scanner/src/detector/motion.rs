use std::sync::{Mutex, PoisonError};

use frame_scan_common::config::MotionConfig;
use frame_scan_common::document::BoundingBox;
use tracing::debug;

use super::traits::{MotionDetector, MotionResult};

#[derive(Debug, Default)]
struct BoxHistory {
    previous: Option<BoundingBox>,
    stable_frames: u32,
}

/// Motion-blur detector based on document box stability.
///
/// A frame is stable when its document box overlaps the previous frame's box
/// with IoU at or above `iou_threshold`. Motion blur is reported until
/// `min_stable_frames` consecutive stable frames have been seen; any unstable
/// frame restarts the count.
pub struct BoxStabilityMotionDetector {
    history: Mutex<BoxHistory>,
    iou_threshold: f32,
    min_stable_frames: u32,
}

impl BoxStabilityMotionDetector {
    pub fn new(iou_threshold: f32, min_stable_frames: u32) -> Self {
        Self {
            history: Mutex::new(BoxHistory::default()),
            iou_threshold,
            min_stable_frames,
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(config.iou_threshold, config.min_stable_frames)
    }
}

impl MotionDetector for BoxStabilityMotionDetector {
    fn motion_state(&self, document_bounds: BoundingBox) -> MotionResult {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        let iou = history.previous.map(|prev| prev.iou(&document_bounds));
        match iou {
            Some(iou) if iou >= self.iou_threshold => history.stable_frames += 1,
            _ => history.stable_frames = 0,
        }
        history.previous = Some(document_bounds);

        let has_motion_blur = history.stable_frames < self.min_stable_frames;
        debug!(
            iou = ?iou,
            stable_frames = history.stable_frames,
            has_motion_blur,
            "box stability check"
        );

        MotionResult {
            has_motion_blur,
            iou,
            stable_frames: history.stable_frames,
        }
    }

    fn reset(&self) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        *history = BoxHistory::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady() -> BoundingBox {
        BoundingBox::new(0.1, 0.2, 0.8, 0.5)
    }

    #[test]
    fn first_frame_is_blurred() {
        let detector = BoxStabilityMotionDetector::new(0.95, 3);
        let result = detector.motion_state(steady());
        assert!(result.has_motion_blur);
        assert!(result.iou.is_none());
        assert_eq!(result.stable_frames, 0);
    }

    #[test]
    fn stable_boxes_clear_blur() {
        let detector = BoxStabilityMotionDetector::new(0.95, 3);
        detector.motion_state(steady());
        assert!(detector.motion_state(steady()).has_motion_blur);
        assert!(detector.motion_state(steady()).has_motion_blur);
        let result = detector.motion_state(steady());
        assert!(!result.has_motion_blur, "three stable frames should clear blur");
        assert_eq!(result.stable_frames, 3);
    }

    #[test]
    fn jump_restarts_count() {
        let detector = BoxStabilityMotionDetector::new(0.95, 2);
        for _ in 0..4 {
            detector.motion_state(steady());
        }
        let moved = BoundingBox::new(0.3, 0.3, 0.6, 0.5);
        let result = detector.motion_state(moved);
        assert!(result.has_motion_blur);
        assert_eq!(result.stable_frames, 0);
        assert!(result.iou.unwrap() < 0.95);
    }

    #[test]
    fn reset_forgets_history() {
        let detector = BoxStabilityMotionDetector::new(0.95, 1);
        detector.motion_state(steady());
        assert!(!detector.motion_state(steady()).has_motion_blur);
        detector.reset();
        let result = detector.motion_state(steady());
        assert!(result.has_motion_blur);
        assert!(result.iou.is_none());
    }

    #[test]
    fn zero_min_frames_never_blurs() {
        let detector = BoxStabilityMotionDetector::new(0.95, 0);
        assert!(!detector.motion_state(steady()).has_motion_blur);
    }
}
