pub mod motion;
pub mod traits;

pub use motion::BoxStabilityMotionDetector;
pub use traits::{CameraSession, ClassificationResult, Classifier, MotionDetector, MotionResult};
