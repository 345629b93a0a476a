use serde::{Deserialize, Serialize};

use crate::error::VisionError;
use crate::geometry::Point2;

use super::blob::BlobCandidate;

/// Corner list for one marker as reported by a detector. Well-behaved
/// detectors return exactly four points.
pub type MarkerCorners = Vec<Point2>;

/// カメラなどのフレーム供給元
pub trait FrameSource {
    type Frame;

    /// Capture resolution (width, height), fixed once the source is open.
    fn video_size(&self) -> (u32, u32);

    /// Fails with [`VisionError::CaptureUnavailable`] when the device is gone.
    fn next_frame(&mut self) -> Result<Self::Frame, VisionError>;
}

/// Fiducial marker detector.
pub trait MarkerDetector<F> {
    fn detect_markers(&mut self, frame: &F) -> Result<Vec<MarkerCorners>, VisionError>;
}

/// Blob detector configured with [`BlobDetectorParams`].
pub trait BlobDetector<F> {
    fn detect_blobs(&mut self, frame: &F) -> Result<Vec<BlobCandidate>, VisionError>;
}

/// SimpleBlobDetector の設定
///
/// Only thresholding, area and circularity are enabled by default.
/// Convexity and inertia filters stay available as switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobDetectorParams {
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f32,
    #[serde(default = "default_max_threshold")]
    pub max_threshold: f32,
    #[serde(default = "default_true")]
    pub filter_by_area: bool,
    #[serde(default = "default_min_area")]
    pub min_area: f32,
    #[serde(default = "default_max_area")]
    pub max_area: f32,
    #[serde(default = "default_true")]
    pub filter_by_circularity: bool,
    #[serde(default = "default_min_circularity")]
    pub min_circularity: f32,
    #[serde(default)]
    pub filter_by_convexity: bool,
    #[serde(default = "default_min_convexity")]
    pub min_convexity: f32,
    #[serde(default)]
    pub filter_by_inertia: bool,
    #[serde(default = "default_min_inertia_ratio")]
    pub min_inertia_ratio: f32,
}

fn default_min_threshold() -> f32 { 20.0 }
fn default_max_threshold() -> f32 { 200.0 }
fn default_true() -> bool { true }
// 面積フィルタなしだと 1px のブロブが NaN 座標を返すことがある
fn default_min_area() -> f32 { 100.0 }
fn default_max_area() -> f32 { 10000.0 }
fn default_min_circularity() -> f32 { 0.8 }
fn default_min_convexity() -> f32 { 0.87 }
fn default_min_inertia_ratio() -> f32 { 0.01 }

impl Default for BlobDetectorParams {
    fn default() -> Self {
        Self {
            min_threshold: default_min_threshold(),
            max_threshold: default_max_threshold(),
            filter_by_area: true,
            min_area: default_min_area(),
            max_area: default_max_area(),
            filter_by_circularity: true,
            min_circularity: default_min_circularity(),
            filter_by_convexity: false,
            min_convexity: default_min_convexity(),
            filter_by_inertia: false,
            min_inertia_ratio: default_min_inertia_ratio(),
        }
    }
}

impl BlobDetectorParams {
    /// Threshold and area ranges must be ordered.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_threshold >= self.max_threshold {
            return Err(format!(
                "min_threshold ({}) must be below max_threshold ({})",
                self.min_threshold, self.max_threshold
            ));
        }
        if self.filter_by_area && self.min_area >= self.max_area {
            return Err(format!(
                "min_area ({}) must be below max_area ({})",
                self.min_area, self.max_area
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_match_ball_setup() {
        let p = BlobDetectorParams::default();
        assert_eq!((p.min_threshold, p.max_threshold), (20.0, 200.0));
        assert_eq!((p.min_area, p.max_area), (100.0, 10000.0));
        assert!(p.filter_by_area && p.filter_by_circularity);
        assert!(!p.filter_by_convexity && !p.filter_by_inertia);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let p: BlobDetectorParams = toml::from_str("filter_by_inertia = true\nmin_inertia_ratio = 0.2").unwrap();
        assert!(p.filter_by_inertia);
        assert_eq!(p.min_inertia_ratio, 0.2);
        assert_eq!(p.min_circularity, 0.8);
    }

    #[test]
    fn test_validate_rejects_inverted_area() {
        let p = BlobDetectorParams {
            min_area: 500.0,
            max_area: 100.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }
}
