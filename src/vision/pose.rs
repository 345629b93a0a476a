use crate::error::VisionError;
use crate::geometry::{compute_marker_pose, CornerQuad, MarkerPose};

use super::detector::MarkerCorners;

/// Single-marker pose estimator.
///
/// Only the first detected marker is used; any further markers in the
/// frame are ignored. This is a known limitation of single-marker tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEstimator;

impl PoseEstimator {
    pub fn new() -> Self {
        Self
    }

    /// No markers gives [`MarkerPose::NOT_FOUND`]. A first marker without
    /// exactly four corners is a detector contract violation.
    pub fn estimate(&self, markers: &[MarkerCorners]) -> Result<MarkerPose, VisionError> {
        let Some(first) = markers.first() else {
            return Ok(MarkerPose::NOT_FOUND);
        };
        let quad = CornerQuad::try_from(first.as_slice())?;
        Ok(compute_marker_pose(&quad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;

    fn square(x: f64, y: f64, side: f64) -> MarkerCorners {
        vec![
            Point2::new(x, y),
            Point2::new(x + side, y),
            Point2::new(x + side, y + side),
            Point2::new(x, y + side),
        ]
    }

    #[test]
    fn test_no_markers_is_sentinel() {
        let pose = PoseEstimator::new().estimate(&[]).unwrap();
        assert_eq!(pose, MarkerPose::NOT_FOUND);
        assert_eq!(pose.angle_degrees, 1000.0);
        assert_eq!(pose.position, Point2::new(0.0, 0.0));
    }

    #[test]
    fn test_only_first_marker_counts() {
        let est = PoseEstimator::new();
        let quad = square(10.0, 10.0, 20.0);
        // 2つ目は90度回転したマーカー
        let quad2 = vec![
            Point2::new(300.0, 100.0),
            Point2::new(300.0, 140.0),
            Point2::new(260.0, 140.0),
            Point2::new(260.0, 100.0),
        ];
        let single = est.estimate(&[quad.clone()]).unwrap();
        let both = est.estimate(&[quad, quad2.clone()]).unwrap();
        assert_eq!(single, both);
        assert_eq!(both.position, Point2::new(20.0, 20.0));
        assert_ne!(est.estimate(&[quad2]).unwrap(), single);
    }

    #[test]
    fn test_malformed_first_marker_is_rejected() {
        let est = PoseEstimator::new();
        let bad = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 1.0)];
        let err = est.estimate(&[bad]).unwrap_err();
        assert!(err.is_fatal());
    }
}
