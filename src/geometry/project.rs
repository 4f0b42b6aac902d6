use nalgebra::{Matrix4, Point3, Vector2, Vector3, Vector4};

use super::ndc::NdcZPoint;

const MIN_W: f64 = 1e-12;

/// Object-to-NDC projection for one patch, with the inverse cached at
/// construction so world positions can be recovered from screen samples.
#[derive(Clone, Copy, Debug)]
pub struct Projector {
    obj_to_ndc: Matrix4<f64>,
    ndc_to_obj: Option<Matrix4<f64>>,
}

impl Projector {
    pub fn new(obj_to_ndc: Matrix4<f64>) -> Self {
        Self {
            obj_to_ndc,
            ndc_to_obj: obj_to_ndc.try_inverse(),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.obj_to_ndc
    }

    /// Project an object-space point. `None` when the point sits on or
    /// behind the projection plane (non-positive clip `w`).
    pub fn project(&self, p: &Point3<f64>) -> Option<NdcZPoint> {
        let q = self.obj_to_ndc * Vector4::new(p.x, p.y, p.z, 1.0);
        if q.w <= MIN_W {
            return None;
        }
        let inv_w = 1.0 / q.w;
        Some(NdcZPoint::new(q.x * inv_w, q.y * inv_w, q.z * inv_w))
    }

    /// Recover the object-space point of an NDC sample. `None` when the
    /// projection is singular or the unprojected point lands at infinity.
    pub fn unproject(&self, ndc: &NdcZPoint) -> Option<Point3<f64>> {
        let inv = self.ndc_to_obj?;
        let q = inv * Vector4::new(ndc.x, ndc.y, ndc.z, 1.0);
        if q.w.abs() <= MIN_W {
            return None;
        }
        let inv_w = 1.0 / q.w;
        Some(Point3::new(q.x * inv_w, q.y * inv_w, q.z * inv_w))
    }

    /// Screen-space image of an object-space direction under the local
    /// linearization of the projection at `at` (quotient rule on the
    /// perspective divide).
    pub fn screen_vector(&self, at: &Point3<f64>, dir: &Vector3<f64>) -> Vector2<f64> {
        let q = self.obj_to_ndc * Vector4::new(at.x, at.y, at.z, 1.0);
        let dq = self.obj_to_ndc * Vector4::new(dir.x, dir.y, dir.z, 0.0);
        if q.w.abs() <= MIN_W {
            return Vector2::zeros();
        }
        let inv_w2 = 1.0 / (q.w * q.w);
        Vector2::new(
            (dq.x * q.w - q.x * dq.w) * inv_w2,
            (dq.y * q.w - q.y * dq.w) * inv_w2,
        )
    }
}
