/// A detector failed to produce a result for one frame.
///
/// Transient by nature: the scanner reports it and keeps accepting frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("detector panicked: {0}")]
    Panicked(String),
    /// The scan was admitted but never reached a worker.
    #[error("scan cancelled: {0}")]
    Cancelled(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}
