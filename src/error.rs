//! Error types for the vision pipeline and the telemetry transport.

use std::time::Duration;

/// Errors raised while turning a camera frame into telemetry.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// A marker detector reported a corner list that is not a quadrilateral.
    /// This is a detector bug and is never retried.
    #[error("invalid detection shape: expected {expected} corners, got {actual}")]
    InvalidDetectionShape { expected: usize, actual: usize },

    /// The capture device could not deliver a frame.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// A feature detector failed on an otherwise valid frame.
    #[error("detector error: {0}")]
    Detector(String),
}

impl VisionError {
    /// Contract violations: the frame is rejected and never retried. Other errors
    /// are transient and the frame is just skipped. Neither stops the server.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VisionError::InvalidDetectionShape { .. })
    }
}

/// Errors raised by a [`crate::server::Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_shape_errors_are_fatal() {
        let shape = VisionError::InvalidDetectionShape { expected: 4, actual: 3 };
        assert!(shape.is_fatal());
        assert!(!VisionError::CaptureUnavailable("camera 0".into()).is_fatal());
        assert!(!VisionError::Detector("blob".into()).is_fatal());
    }

    #[test]
    fn test_shape_error_message() {
        let err = VisionError::InvalidDetectionShape { expected: 4, actual: 5 };
        assert_eq!(err.to_string(), "invalid detection shape: expected 4 corners, got 5");
    }
}
