//! 2D geometry shared by the canvas and the items: points, item matrices
//! and the segment projection used by line ports.

pub use kurbo::{Affine, Point, Vec2};

/// An item transform. Persisted as its six affine coefficients.
pub type Matrix = Affine;

/// Closest point to `p` on the segment `start..end`.
///
/// A degenerate segment projects everything onto `start`.
pub fn project_on_segment(p: Point, start: Point, end: Point) -> Point {
    let seg = end - start;
    let len2 = seg.hypot2();
    if len2 <= f64::EPSILON {
        return start;
    }
    let t = ((p - start).dot(seg) / len2).clamp(0.0, 1.0);
    start + seg * t
}
