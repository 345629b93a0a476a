use log::debug;

use crate::error::VisionError;
use crate::protocol::TelemetryRecord;

use super::blob::{select, BlobWindow};
use super::detector::{BlobDetector, FrameSource, MarkerDetector};
use super::pose::PoseEstimator;

/// Anything that can produce a fresh telemetry record per cycle.
pub trait RecordSource {
    fn video_size(&self) -> (u32, u32);

    fn next_record(&mut self) -> Result<TelemetryRecord, VisionError>;
}

/// フレーム取得 → マーカー/ブロブ検出 → テレメトリ
///
/// Nothing carries over between frames: a frame without detections yields
/// sentinel values, never the previous frame's values.
pub struct VisionPipeline<S, M, B> {
    source: S,
    marker_detector: M,
    blob_detector: B,
    estimator: PoseEstimator,
    window: BlobWindow,
    video_size: (u32, u32),
}

impl<S, M, B> VisionPipeline<S, M, B>
where
    S: FrameSource,
    M: MarkerDetector<S::Frame>,
    B: BlobDetector<S::Frame>,
{
    pub fn new(source: S, marker_detector: M, blob_detector: B, window: BlobWindow) -> Self {
        let video_size = source.video_size();
        Self {
            source,
            marker_detector,
            blob_detector,
            estimator: PoseEstimator::new(),
            window,
            video_size,
        }
    }
}

impl<S, M, B> RecordSource for VisionPipeline<S, M, B>
where
    S: FrameSource,
    M: MarkerDetector<S::Frame>,
    B: BlobDetector<S::Frame>,
{
    fn video_size(&self) -> (u32, u32) {
        self.video_size
    }

    fn next_record(&mut self) -> Result<TelemetryRecord, VisionError> {
        let frame = self.source.next_frame()?;

        let markers = self.marker_detector.detect_markers(&frame)?;
        let marker_pose = self.estimator.estimate(&markers)?;

        let candidates = self.blob_detector.detect_blobs(&frame)?;
        debug!("markers: {}, blob keypoints: {}", markers.len(), candidates.len());
        let blob_selection = select(&candidates, self.window);

        Ok(TelemetryRecord::new(self.video_size, marker_pose, blob_selection))
    }
}
