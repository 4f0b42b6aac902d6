use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::ndc::NdcZPoint;

/// Viewport scales and frustum bounds shared by every screen-space stage.
///
/// NDC maps the shorter window axis to `[-1, 1]`; the longer axis extends
/// past 1 by the aspect ratio, so the frustum slab is `[-xb, xb] x [-yb, yb]`
/// with `min(xb, yb) == 1`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Viewport {
    width: u32,
    height: u32,
    eye: Point3<f64>,
}

impl Viewport {
    pub fn new(width: u32, height: u32, eye: Point3<f64>) -> Self {
        Self { width, height, eye }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// World-space eye point, used for facing tests during extraction.
    pub fn eye(&self) -> Point3<f64> {
        self.eye
    }

    /// NDC units covered by one screen pixel.
    pub fn pix_to_ndc_scale(&self) -> f64 {
        2.0 / self.width.min(self.height).max(1) as f64
    }

    /// Screen pixels covered by one NDC unit.
    pub fn ndc_to_pix_scale(&self) -> f64 {
        self.width.min(self.height).max(1) as f64 / 2.0
    }

    /// Frustum half-extents `(xb, yb)` in NDC.
    pub fn frustum_bounds(&self) -> (f64, f64) {
        let short = self.width.min(self.height).max(1) as f64;
        (self.width as f64 / short, self.height as f64 / short)
    }

    /// Planar bounds plus the depth slab: z runs `[0, 1]` between the near
    /// and far planes.
    pub fn in_frustum(&self, p: &NdcZPoint) -> bool {
        let (xb, yb) = self.frustum_bounds();
        p.x.abs() <= xb && p.y.abs() <= yb && (0.0..=1.0).contains(&p.z)
    }
}
