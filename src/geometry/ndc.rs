use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Screen point in normalized device coordinates, with depth.
///
/// `x`/`y` span the viewport's NDC rectangle (shorter axis `[-1, 1]`); `z`
/// is the post-projection depth, carried along for depth-tested raster
/// writes. All arc lengths in the pipeline are planar: depth never
/// contributes to distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NdcZPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl NdcZPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn planar(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Screen-plane distance, ignoring depth.
    pub fn planar_dist(&self, other: &NdcZPoint) -> f64 {
        (self.planar() - other.planar()).norm()
    }

    pub fn planar_eq(&self, other: &NdcZPoint) -> bool {
        self.x == other.x && self.y == other.y
    }

    pub fn lerp(&self, other: &NdcZPoint, u: f64) -> NdcZPoint {
        NdcZPoint {
            x: self.x + (other.x - self.x) * u,
            y: self.y + (other.y - self.y) * u,
            z: self.z + (other.z - self.z) * u,
        }
    }

    pub fn offset(&self, v: Vector2<f64>) -> NdcZPoint {
        NdcZPoint {
            x: self.x + v.x,
            y: self.y + v.y,
            z: self.z,
        }
    }
}

/// Closest point to `p` on segment `ab`, returned with its segment
/// parameter in `[0, 1]`.
pub fn project_to_segment(
    a: Vector2<f64>,
    b: Vector2<f64>,
    p: Vector2<f64>,
) -> (Vector2<f64>, f64) {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::EPSILON {
        return (a, 0.0);
    }
    let u = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (a + ab * u, u)
}

/// Rotate a planar vector a quarter turn counterclockwise.
pub fn perpend(v: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-v.y, v.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_dist_ignores_depth() {
        let a = NdcZPoint::new(0.0, 0.0, 0.0);
        let b = NdcZPoint::new(3.0, 4.0, 9.0);
        assert!((a.planar_dist(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn segment_projection_clamps_to_endpoints() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(1.0, 0.0);
        let (q, u) = project_to_segment(a, b, Vector2::new(2.0, 1.0));
        assert_eq!(q, b);
        assert_eq!(u, 1.0);
        let (q, u) = project_to_segment(a, b, Vector2::new(0.25, 0.5));
        assert!((q - Vector2::new(0.25, 0.0)).norm() < 1e-12);
        assert!((u - 0.25).abs() < 1e-12);
    }

    #[test]
    fn perpend_is_quarter_turn() {
        let v = Vector2::new(1.0, 0.0);
        let p = perpend(v);
        assert!((p - Vector2::new(0.0, 1.0)).norm() < 1e-12);
        assert!(v.dot(&p).abs() < 1e-12);
    }
}
