#[cfg(feature = "desktop")]
pub mod aruco;
pub mod blob;
pub mod detector;
pub mod pipeline;
pub mod pose;

#[cfg(feature = "desktop")]
pub use aruco::{ArucoMarkerDetector, OpenCvBlobDetector};
pub use blob::{select, BlobCandidate, BlobSelection, BlobWindow};
pub use detector::{BlobDetector, BlobDetectorParams, FrameSource, MarkerCorners, MarkerDetector};
pub use pipeline::{RecordSource, VisionPipeline};
pub use pose::PoseEstimator;
