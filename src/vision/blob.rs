use serde::{Deserialize, Serialize};

use crate::config::BlobConfig;
use crate::geometry::Point2;

/// Size reported when no blob passes the size window.
pub const NO_BLOB_SIZE: f64 = 1000.0;

/// 検出器が返す生のブロブ (keypoint の直径と中心)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlobCandidate {
    pub size_px: f64,
    pub position: Point2,
}

impl BlobCandidate {
    pub fn new(size_px: f64, position: Point2) -> Self {
        Self { size_px, position }
    }
}

/// The blob streamed to the consumer, or [`BlobSelection::NOT_FOUND`].
pub type BlobSelection = BlobCandidate;

impl BlobSelection {
    pub const NOT_FOUND: BlobSelection = BlobCandidate {
        size_px: NO_BLOB_SIZE,
        position: Point2::ORIGIN,
    };

    pub fn is_found(&self) -> bool {
        self.size_px != NO_BLOB_SIZE
    }
}

/// Open size interval `(min_size, max_size)` a candidate must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobWindow {
    pub min_size: f64,
    pub max_size: f64,
}

impl BlobWindow {
    pub fn new(min_size: f64, max_size: f64) -> Self {
        Self { min_size, max_size }
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(config.min_size, config.max_size)
    }

    pub fn contains(&self, size: f64) -> bool {
        self.min_size < size && size < self.max_size
    }
}

impl Default for BlobWindow {
    /// Ball-sized objects.
    fn default() -> Self {
        Self::new(15.0, 80.0)
    }
}

/// Pick the tracked blob from this frame's candidates.
///
/// Both window bounds are excluded. When several candidates fit, the last
/// one in detector order wins; consumers rely on this, so it is not a
/// largest/closest choice. Candidates with a non-finite centre are ignored
/// (JSON cannot carry NaN).
pub fn select(candidates: &[BlobCandidate], window: BlobWindow) -> BlobSelection {
    candidates
        .iter()
        .rev()
        .find(|c| c.position.is_finite() && window.contains(c.size_px))
        .copied()
        .unwrap_or(BlobSelection::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(size: f64, x: f64, y: f64) -> BlobCandidate {
        BlobCandidate::new(size, Point2::new(x, y))
    }

    #[test]
    fn test_empty_is_not_found() {
        let sel = select(&[], BlobWindow::default());
        assert_eq!(sel, BlobSelection::NOT_FOUND);
        assert!(!sel.is_found());
    }

    #[test]
    fn test_out_of_range_is_not_found() {
        let window = BlobWindow::new(15.0, 80.0);
        assert_eq!(select(&[blob(10.0, 1.0, 1.0)], window), BlobSelection::NOT_FOUND);
        assert_eq!(select(&[blob(90.0, 1.0, 1.0)], window), BlobSelection::NOT_FOUND);
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let window = BlobWindow::new(15.0, 80.0);
        assert_eq!(select(&[blob(15.0, 1.0, 1.0)], window), BlobSelection::NOT_FOUND);
        assert_eq!(select(&[blob(80.0, 1.0, 1.0)], window), BlobSelection::NOT_FOUND);
        assert!(select(&[blob(15.01, 1.0, 1.0)], window).is_found());
    }

    #[test]
    fn test_last_valid_candidate_wins() {
        let window = BlobWindow::new(15.0, 80.0);
        let sel = select(&[blob(20.0, 1.0, 1.0), blob(30.0, 2.0, 2.0)], window);
        assert_eq!(sel.position, Point2::new(2.0, 2.0));
        assert_eq!(sel.size_px, 30.0);
    }

    #[test]
    fn test_trailing_invalid_candidate_is_skipped() {
        let window = BlobWindow::new(15.0, 80.0);
        let sel = select(
            &[blob(20.0, 1.0, 1.0), blob(50.0, 2.0, 2.0), blob(200.0, 3.0, 3.0)],
            window,
        );
        assert_eq!(sel, blob(50.0, 2.0, 2.0));
    }

    #[test]
    fn test_non_finite_candidate_is_skipped() {
        let window = BlobWindow::new(15.0, 80.0);
        let sel = select(&[blob(30.0, 4.0, 4.0), blob(40.0, f64::NAN, 2.0)], window);
        assert_eq!(sel, blob(30.0, 4.0, 4.0));
        let sel = select(&[blob(40.0, 1.0, f64::INFINITY)], window);
        assert_eq!(sel, BlobSelection::NOT_FOUND);
        assert!(!select(&[blob(f64::NAN, 1.0, 1.0)], window).is_found());
    }

    #[test]
    fn test_window_is_caller_supplied() {
        let candidates = [blob(100.0, 5.0, 5.0)];
        assert!(!select(&candidates, BlobWindow::default()).is_found());
        assert!(select(&candidates, BlobWindow::new(50.0, 150.0)).is_found());
    }
}
