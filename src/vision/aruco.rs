//! OpenCV-backed feature detectors.

use anyhow::{bail, Context, Result};
use opencv::{
    core::{KeyPoint, Mat, Point2f, Vector},
    features2d::{SimpleBlobDetector, SimpleBlobDetector_Params},
    objdetect::{self, ArucoDetector, DetectorParameters, Dictionary, PredefinedDictionaryType, RefineParameters},
    prelude::*,
};

use crate::error::VisionError;
use crate::geometry::Point2;

use super::blob::BlobCandidate;
use super::detector::{BlobDetector, BlobDetectorParams, MarkerCorners, MarkerDetector};

// --- 辞書ヘルパー ---

pub fn parse_dictionary(name: &str) -> Result<Dictionary> {
    let dict_type = match name {
        "DICT_4X4_50" => PredefinedDictionaryType::DICT_4X4_50,
        "DICT_4X4_100" => PredefinedDictionaryType::DICT_4X4_100,
        "DICT_4X4_250" => PredefinedDictionaryType::DICT_4X4_250,
        "DICT_4X4_1000" => PredefinedDictionaryType::DICT_4X4_1000,
        "DICT_5X5_50" => PredefinedDictionaryType::DICT_5X5_50,
        "DICT_5X5_100" => PredefinedDictionaryType::DICT_5X5_100,
        "DICT_5X5_250" => PredefinedDictionaryType::DICT_5X5_250,
        "DICT_5X5_1000" => PredefinedDictionaryType::DICT_5X5_1000,
        "DICT_6X6_50" => PredefinedDictionaryType::DICT_6X6_50,
        "DICT_6X6_100" => PredefinedDictionaryType::DICT_6X6_100,
        "DICT_6X6_250" => PredefinedDictionaryType::DICT_6X6_250,
        "DICT_6X6_1000" => PredefinedDictionaryType::DICT_6X6_1000,
        _ => bail!("Unknown dictionary: {}", name),
    };
    objdetect::get_predefined_dictionary(dict_type).context("Failed to get predefined dictionary")
}

// --- マーカー ---

/// ArUco marker detector on grayscale frames.
pub struct ArucoMarkerDetector {
    detector: ArucoDetector,
}

impl ArucoMarkerDetector {
    pub fn new(dictionary: &str) -> Result<Self> {
        let dict = parse_dictionary(dictionary)?;
        let params = DetectorParameters::default()?;
        let refine = RefineParameters::new(10.0, 3.0, true)?;
        let detector = ArucoDetector::new(&dict, &params, refine).context("Failed to create ArucoDetector")?;
        Ok(Self { detector })
    }
}

impl MarkerDetector<Mat> for ArucoMarkerDetector {
    fn detect_markers(&mut self, frame: &Mat) -> Result<Vec<MarkerCorners>, VisionError> {
        let mut corners: Vector<Vector<Point2f>> = Vector::new();
        let mut ids: Vector<i32> = Vector::new();
        let mut rejected: Vector<Vector<Point2f>> = Vector::new();

        self.detector
            .detect_markers(frame, &mut corners, &mut ids, &mut rejected)
            .map_err(|e| VisionError::Detector(e.to_string()))?;

        Ok(corners
            .iter()
            .map(|marker| {
                marker
                    .iter()
                    .map(|p| Point2::new(p.x as f64, p.y as f64))
                    .collect()
            })
            .collect())
    }
}

// --- ブロブ ---

/// SimpleBlobDetector wrapper. Keypoint diameter becomes the candidate size.
pub struct OpenCvBlobDetector {
    detector: opencv::core::Ptr<SimpleBlobDetector>,
}

impl OpenCvBlobDetector {
    pub fn new(params: &BlobDetectorParams) -> Result<Self> {
        let mut p = SimpleBlobDetector_Params::default()?;
        p.min_threshold = params.min_threshold;
        p.max_threshold = params.max_threshold;
        p.filter_by_area = params.filter_by_area;
        p.min_area = params.min_area;
        p.max_area = params.max_area;
        p.filter_by_circularity = params.filter_by_circularity;
        p.min_circularity = params.min_circularity;
        p.filter_by_convexity = params.filter_by_convexity;
        p.min_convexity = params.min_convexity;
        p.filter_by_inertia = params.filter_by_inertia;
        p.min_inertia_ratio = params.min_inertia_ratio;

        let detector = SimpleBlobDetector::create(p).context("Failed to create SimpleBlobDetector")?;
        Ok(Self { detector })
    }
}

impl BlobDetector<Mat> for OpenCvBlobDetector {
    fn detect_blobs(&mut self, frame: &Mat) -> Result<Vec<BlobCandidate>, VisionError> {
        let mut keypoints: Vector<KeyPoint> = Vector::new();
        self.detector
            .detect(frame, &mut keypoints, &Mat::default())
            .map_err(|e| VisionError::Detector(e.to_string()))?;

        Ok(keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                BlobCandidate::new(kp.size() as f64, Point2::new(pt.x as f64, pt.y as f64))
            })
            .collect())
    }
}
