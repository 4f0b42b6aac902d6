use log::debug;

use super::encoding::{length_byte, masked};
use crate::geometry::{NdcZPoint, Projector, Viewport};
use crate::mesh::Surface;

/// CPU reference raster holding encoded id words plus a depth plane.
///
/// The raster covers the same NDC rectangle as the viewport but may run at
/// a lower resolution; callers derive the screen-to-reference pixel ratio
/// from the two widths. Write order within a frame is fixed: depth fill,
/// hidden pass (no depth test), visible pass (depth tested), then reads.
#[derive(Clone, Debug)]
pub struct IdBuffer {
    width: usize,
    height: usize,
    ids: Vec<u32>,
    depth: Vec<f32>,
    xbound: f64,
    ybound: f64,
    depth_bias: f64,
}

impl IdBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            ids: vec![0; width.max(1) * height.max(1)],
            depth: vec![f32::INFINITY; width.max(1) * height.max(1)],
            xbound: 1.0,
            ybound: 1.0,
            depth_bias: 1e-3,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_depth_bias(&mut self, bias: f64) {
        self.depth_bias = bias;
    }

    /// Clear ids and depth and adopt the viewport's frustum rectangle.
    pub fn begin_frame(&mut self, viewport: &Viewport) {
        let (xb, yb) = viewport.frustum_bounds();
        self.xbound = xb;
        self.ybound = yb;
        self.ids.fill(0);
        self.depth.fill(f32::INFINITY);
    }

    /// NDC units per reference pixel along the short axis.
    pub fn pix_to_ndc_scale(&self) -> f64 {
        (2.0 * self.xbound / self.width as f64).min(2.0 * self.ybound / self.height as f64)
    }

    pub fn ndc_to_pix(&self, p: &NdcZPoint) -> (i64, i64) {
        let px = ((p.x + self.xbound) / (2.0 * self.xbound) * self.width as f64).floor();
        let py = ((self.ybound - p.y) / (2.0 * self.ybound) * self.height as f64).floor();
        (px as i64, py as i64)
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        (x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height)
            .then(|| y as usize * self.width + x as usize)
    }

    /// Id word at a pixel; 0 (background) outside the raster.
    pub fn read(&self, x: i64, y: i64) -> u32 {
        self.index(x, y).map_or(0, |i| self.ids[i])
    }

    /// Rasterize face depths so the visible pass can be occlusion-tested.
    pub fn fill_depth<S: Surface>(&mut self, surface: &S, projector: &Projector) {
        for face in 0..surface.face_count() {
            let [a, b, c] = surface.face_vertices(face);
            let (Some(p0), Some(p1), Some(p2)) = (
                projector.project(&surface.vertex_position(a)),
                projector.project(&surface.vertex_position(b)),
                projector.project(&surface.vertex_position(c)),
            ) else {
                continue;
            };
            self.fill_triangle_depth(&p0, &p1, &p2);
        }
    }

    fn fill_triangle_depth(&mut self, p0: &NdcZPoint, p1: &NdcZPoint, p2: &NdcZPoint) {
        let to_px = |p: &NdcZPoint| {
            (
                (p.x + self.xbound) / (2.0 * self.xbound) * self.width as f64,
                (self.ybound - p.y) / (2.0 * self.ybound) * self.height as f64,
            )
        };
        let (x0, y0) = to_px(p0);
        let (x1, y1) = to_px(p1);
        let (x2, y2) = to_px(p2);
        let area = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
        if area.abs() <= f64::EPSILON {
            return;
        }
        let min_x = x0.min(x1).min(x2).floor().max(0.0) as i64;
        let max_x = (x0.max(x1).max(x2).ceil() as i64).min(self.width as i64 - 1);
        let min_y = y0.min(y1).min(y2).floor().max(0.0) as i64;
        let max_y = (y0.max(y1).max(y2).ceil() as i64).min(self.height as i64 - 1);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
                let w0 = ((x1 - cx) * (y2 - cy) - (x2 - cx) * (y1 - cy)) / area;
                let w1 = ((x2 - cx) * (y0 - cy) - (x0 - cx) * (y2 - cy)) / area;
                let w2 = 1.0 - w0 - w1;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = (w0 * p0.z + w1 * p1.z + w2 * p2.z) as f32;
                let idx = y as usize * self.width + x as usize;
                if z < self.depth[idx] {
                    self.depth[idx] = z;
                }
            }
        }
    }

    /// Draw one segment, interpolating the length byte between the endpoint
    /// words. Both words must carry the same masked id.
    pub fn draw_segment(
        &mut self,
        a: &NdcZPoint,
        b: &NdcZPoint,
        word_a: u32,
        word_b: u32,
        depth_test: bool,
    ) {
        debug_assert_eq!(masked(word_a), masked(word_b));
        let id = masked(word_a);
        let byte_a = length_byte(word_a) as f64;
        let byte_b = length_byte(word_b) as f64;
        let (x0, y0) = self.ndc_to_pix(a);
        let (x1, y1) = self.ndc_to_pix(b);
        let steps = (x1 - x0).abs().max((y1 - y0).abs());
        if steps > 4 * (self.width + self.height) as i64 {
            debug!("segment spans {steps} pixels, clipping upstream failed; skipped");
            return;
        }
        for i in 0..=steps {
            let u = if steps == 0 { 0.0 } else { i as f64 / steps as f64 };
            let x = x0 + ((x1 - x0) as f64 * u).round() as i64;
            let y = y0 + ((y1 - y0) as f64 * u).round() as i64;
            let Some(idx) = self.index(x, y) else { continue };
            if depth_test {
                let z = a.z + (b.z - a.z) * u;
                if z > self.depth[idx] as f64 + self.depth_bias {
                    continue;
                }
            }
            let byte = (byte_a + (byte_b - byte_a) * u).round().clamp(0.0, 255.0) as u32;
            self.ids[idx] = id | byte;
        }
    }

    /// Search a `(2 * radius + 1)^2` box for a word matching `target`'s
    /// masked id with a length byte within `byte_tol`.
    pub fn find_masked_in_box(
        &self,
        center: (i64, i64),
        target: u32,
        byte_tol: i32,
        radius: i32,
    ) -> bool {
        let want = masked(target);
        let want_byte = length_byte(target) as i32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let word = self.read(center.0 + dx as i64, center.1 + dy as i64);
                if masked(word) == want && (length_byte(word) as i32 - want_byte).abs() <= byte_tol
                {
                    return true;
                }
            }
        }
        false
    }
}
