//! Marker geometry: corner quadrilaterals to orientation and position.

use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// Angle reported when no marker is visible. Outside (-180, 180].
pub const NO_MARKER_ANGLE: f64 = 1000.0;

/// 画像座標 (ピクセル, y は下向き)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ORIGIN: Point2 = Point2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: Point2, b: Point2) -> Point2 {
        Point2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point2 {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// One marker boundary in detector order: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerQuad {
    pub top_left: Point2,
    pub top_right: Point2,
    pub bottom_right: Point2,
    pub bottom_left: Point2,
}

impl CornerQuad {
    pub const CORNER_COUNT: usize = 4;

    pub fn new(top_left: Point2, top_right: Point2, bottom_right: Point2, bottom_left: Point2) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    pub fn corners(&self) -> [Point2; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }
}

impl TryFrom<&[Point2]> for CornerQuad {
    type Error = VisionError;

    fn try_from(points: &[Point2]) -> Result<Self, Self::Error> {
        match points {
            &[tl, tr, br, bl] => Ok(CornerQuad::new(tl, tr, br, bl)),
            _ => Err(VisionError::InvalidDetectionShape {
                expected: Self::CORNER_COUNT,
                actual: points.len(),
            }),
        }
    }
}

/// Marker orientation in degrees and its center in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub angle_degrees: f64,
    pub position: Point2,
}

impl MarkerPose {
    /// "No marker in this frame".
    pub const NOT_FOUND: MarkerPose = MarkerPose {
        angle_degrees: NO_MARKER_ANGLE,
        position: Point2::ORIGIN,
    };

    pub fn new(angle_degrees: f64, position: Point2) -> Self {
        Self {
            angle_degrees,
            position,
        }
    }

    pub fn is_found(&self) -> bool {
        self.angle_degrees != NO_MARKER_ANGLE
    }
}

/// Orientation and position of a single marker.
///
/// The marker x-axis runs from the midpoint of the left edge (top-left,
/// bottom-left) to the midpoint of the right edge (top-right, bottom-right).
/// The angle is `atan(dy/dx)` in degrees, shifted by 180 when the axis points
/// towards negative x so the result covers (-180, 180]. A vertical axis gives
/// +/-90 by the sign of dy.
///
/// Position is the mean of the four corners, not the area centroid.
pub fn compute_marker_pose(quad: &CornerQuad) -> MarkerPose {
    let left = Point2::midpoint(quad.top_left, quad.bottom_left);
    let right = Point2::midpoint(quad.top_right, quad.bottom_right);
    MarkerPose::new(axis_angle_degrees(left, right), corner_mean(quad))
}

fn axis_angle_degrees(left: Point2, right: Point2) -> f64 {
    let dx = right.x - left.x;
    let dy = right.y - left.y;

    let mut angle = if dx == 0.0 {
        if dy > 0.0 {
            90.0
        } else if dy < 0.0 {
            -90.0
        } else {
            0.0
        }
    } else {
        (dy / dx).atan().to_degrees()
    };

    // 後ろ向きの軸
    if left.x > right.x {
        if left.y > right.y {
            angle -= 180.0;
        } else {
            angle += 180.0;
        }
    }
    angle
}

fn corner_mean(quad: &CornerQuad) -> Point2 {
    let c = quad.corners();
    Point2::new(
        (c[0].x + c[1].x + c[2].x + c[3].x) / 4.0,
        (c[0].y + c[1].y + c[2].y + c[3].y) / 4.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    /// Square of half-size 10 centred at (cx, cy), rotated by `deg` (y down).
    fn rotated_square(cx: f64, cy: f64, deg: f64) -> CornerQuad {
        let (s, c) = deg.to_radians().sin_cos();
        let rot = |x: f64, y: f64| Point2::new(cx + x * c - y * s, cy + x * s + y * c);
        CornerQuad::new(rot(-10.0, -10.0), rot(10.0, -10.0), rot(10.0, 10.0), rot(-10.0, 10.0))
    }

    #[test]
    fn test_horizontal_marker_is_zero() {
        let quad = CornerQuad::new(
            Point2::new(100.0, 50.0),
            Point2::new(140.0, 50.0),
            Point2::new(140.0, 90.0),
            Point2::new(100.0, 90.0),
        );
        let pose = compute_marker_pose(&quad);
        assert_eq!(pose.angle_degrees, 0.0);
        assert_eq!(pose.position, Point2::new(120.0, 70.0));
    }

    #[test]
    fn test_rotation_within_quarter_turn() {
        for deg in [-89.0, -60.0, -45.0, -12.5, 0.0, 1.0, 30.0, 45.0, 75.0, 89.9] {
            let pose = compute_marker_pose(&rotated_square(320.0, 240.0, deg));
            assert!(
                approx_eq(pose.angle_degrees, deg, EPS),
                "expected {}, got {}",
                deg,
                pose.angle_degrees
            );
        }
    }

    #[test]
    fn test_backwards_axis_correction() {
        // dx < 0, dy > 0: +180 branch lands in (90, 180]
        for deg in [100.0, 135.0, 170.0, 180.0] {
            let pose = compute_marker_pose(&rotated_square(0.0, 0.0, deg));
            assert!(approx_eq(pose.angle_degrees, deg, EPS), "{} -> {}", deg, pose.angle_degrees);
        }
        // dx < 0, dy < 0: -180 branch lands in (-180, -90)
        for deg in [-100.0, -135.0, -170.0] {
            let pose = compute_marker_pose(&rotated_square(0.0, 0.0, deg));
            assert!(approx_eq(pose.angle_degrees, deg, EPS), "{} -> {}", deg, pose.angle_degrees);
        }
    }

    #[test]
    fn test_flipped_marker_is_exactly_180() {
        // right edge on the left, same height
        let quad = CornerQuad::new(
            Point2::new(40.0, 40.0),
            Point2::new(0.0, 40.0),
            Point2::new(0.0, 0.0),
            Point2::new(40.0, 0.0),
        );
        assert_eq!(compute_marker_pose(&quad).angle_degrees, 180.0);
    }

    #[test]
    fn test_vertical_axis_does_not_divide_by_zero() {
        let down = CornerQuad::new(
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 20.0),
            Point2::new(0.0, 20.0),
            Point2::new(0.0, 0.0),
        );
        let pose = compute_marker_pose(&down);
        assert_eq!(pose.angle_degrees, 90.0);
        assert_eq!(pose.position, Point2::new(5.0, 10.0));

        let up = CornerQuad::new(
            Point2::new(0.0, 20.0),
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 20.0),
        );
        assert_eq!(compute_marker_pose(&up).angle_degrees, -90.0);
    }

    #[test]
    fn test_position_is_corner_mean() {
        // 非対称な四角形
        let quad = CornerQuad::new(
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(30.0, 10.0),
            Point2::new(0.0, 10.0),
        );
        let pose = compute_marker_pose(&quad);
        assert!(approx_eq(pose.position.x, 10.0, EPS));
        assert!(approx_eq(pose.position.y, 5.0, EPS));
    }

    #[test]
    fn test_try_from_rejects_wrong_corner_count() {
        let three = [Point2::ORIGIN; 3];
        match CornerQuad::try_from(&three[..]) {
            Err(VisionError::InvalidDetectionShape { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        let four = [Point2::new(1.0, 2.0); 4];
        assert!(CornerQuad::try_from(&four[..]).is_ok());
    }

    #[test]
    fn test_not_found_sentinel() {
        assert!(!MarkerPose::NOT_FOUND.is_found());
        assert_eq!(MarkerPose::NOT_FOUND.position, Point2::ORIGIN);
        assert!(MarkerPose::new(180.0, Point2::ORIGIN).is_found());
    }
}
