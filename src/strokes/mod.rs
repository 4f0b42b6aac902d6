//! Stroke span emission and per-path style bookkeeping.
//!
//! Once the group pipeline has fitted parameter tables, every good group
//! is sampled into a renderable span carrying fitted `t` values at each
//! point. The module also refreshes the per-path style values the fits
//! divide by and lays down the seed samples the next frame's propagation
//! marches from.

use serde::{Deserialize, Serialize};

use crate::geometry::Projector;
use crate::mesh::Surface;
use crate::paths::PathSet;
use crate::tracker::flags::RenderFlags;
use crate::types::{FitStatus, LineType, PathSample, SpanPoint, StrokeSpan, VisibilityMode};

/// Planar extent below which a two-point span is noise.
const DEGENERATE_SPAN_EPS: f64 = 1e-12;

/// Pixel period of one stylization repeat, per line type row.
///
/// Way paths and polylines ride the silhouette row, matching the render
/// flag table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StylePeriods {
    pub silhouette: f64,
    pub backfacing_silhouette: f64,
    pub border: f64,
    pub crease: f64,
}

impl Default for StylePeriods {
    fn default() -> Self {
        Self {
            silhouette: 1.0,
            backfacing_silhouette: 1.0,
            border: 1.0,
            crease: 1.0,
        }
    }
}

impl StylePeriods {
    /// Period for this type's style row, never below one pixel.
    pub fn get(&self, line_type: LineType) -> f64 {
        let period = match line_type {
            LineType::Silhouette | LineType::WayPath | LineType::Polyline => self.silhouette,
            LineType::BackfacingSilhouette => self.backfacing_silhouette,
            LineType::Border => self.border,
            LineType::Crease => self.crease,
        };
        period.max(1.0)
    }
}

/// Knobs for stroke emission and next-frame seeding.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrokeParams {
    /// Arc step between emitted span points, in pixels.
    pub span_step_pix: f64,
    /// Seed spacing along fitted groups, in multiples of the visibility
    /// sampling distance.
    pub seed_step_pix: f64,
    /// Lock every path's stretch to one, freezing the pattern period in
    /// pixels instead of tracking the mesh's apparent size.
    pub sigma_one: bool,
    /// Pattern period per line type, in pixels.
    pub periods: StylePeriods,
}

impl Default for StrokeParams {
    fn default() -> Self {
        Self {
            span_step_pix: 6.0,
            seed_step_pix: 4.0,
            sigma_one: false,
            periods: StylePeriods::default(),
        }
    }
}

/// Refresh the style values the fits divide by on every path.
///
/// `current_size` is the mesh's apparent size this frame and
/// `reference_size` the size captured when tracking began; their ratio
/// stretches the parameter so the pattern rides the mesh instead of the
/// screen.
pub fn cache_per_path_values(
    paths: &mut PathSet,
    params: &StrokeParams,
    reference_size: f64,
    current_size: f64,
) {
    let stretch = if params.sigma_one || current_size < f64::EPSILON {
        1.0
    } else {
        reference_size / current_size
    };
    for path in paths.iter_mut() {
        path.offset_pix_len = params.periods.get(path.line_type);
        path.stretch = stretch;
    }
}

/// Sample every good fitted group into a renderable span.
///
/// A span steps along the group's arc window at `span_step_pix` pixels
/// and always includes both window ends, so every span has at least two
/// points. Zero-span groups and two-point spans whose ends coincide are
/// culled.
pub fn generate_stroke_spans(
    paths: &PathSet,
    flags: &RenderFlags,
    mode: VisibilityMode,
    pix_to_ndc: f64,
    params: &StrokeParams,
) -> Vec<StrokeSpan> {
    let step_size = pix_to_ndc * params.span_step_pix;
    let mut out = Vec::new();
    if step_size <= 0.0 {
        return out;
    }
    for (k, path) in paths.iter().enumerate() {
        if !flags.renders(path.line_type, path.vis, mode) {
            continue;
        }
        let length = path.length();
        if length <= 0.0 {
            continue;
        }
        for g in &path.groups {
            if !g.status.is_good() {
                continue;
            }
            debug_assert_eq!(g.fit_status, FitStatus::Good);

            let sbegin = g.begin;
            let send = g.end;
            let sdelta = send - sbegin;
            if sdelta <= 0.0 {
                log::warn!(
                    "generate_stroke_spans: culled zero length group {} on path {}",
                    g.id,
                    k
                );
                continue;
            }
            let num = (sdelta / step_size).ceil().max(2.0) as usize;
            let sstep = sdelta / (num - 1) as f64;

            let beg = path.point_at(sbegin / length);
            let end = path.point_at(send / length);
            if num == 2 && beg.planar_dist(&end) < DEGENERATE_SPAN_EPS {
                continue;
            }

            let mut points = Vec::with_capacity(num);
            points.push(SpanPoint {
                pos: beg,
                t: g.get_t(sbegin),
                s: sbegin,
            });
            for j in 1..num - 1 {
                let s = sbegin + sstep * j as f64;
                points.push(SpanPoint {
                    pos: path.point_at(s / length),
                    t: g.get_t(s),
                    s,
                });
            }
            points.push(SpanPoint {
                pos: end,
                t: g.get_t(send),
                s: send,
            });

            out.push(StrokeSpan {
                stroke_id: g.id,
                path_index: k,
                line_type: path.line_type,
                vis: path.vis,
                points,
            });
        }
    }
    out
}

/// Replace the seed list with fresh samples along every fitted group.
///
/// Spacing is `seed_step_pix` visibility samples; the samples carry the
/// group's fitted parameter and a surface attachment and are matched
/// afresh on the next frame.
pub fn regenerate_seeds<S: Surface>(
    paths: &PathSet,
    surface: &S,
    projector: &Projector,
    vis_sampling: f64,
    pix_to_ndc: f64,
    params: &StrokeParams,
    out: &mut Vec<PathSample>,
) {
    out.clear();
    let spacing = vis_sampling * pix_to_ndc * params.seed_step_pix;
    paths.generate_seed_samples(spacing, surface, projector, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NdcZPoint;
    use crate::groups::VoteGroup;
    use crate::mesh::TriMesh;
    use crate::paths::ScreenPath;
    use crate::types::Visibility;
    use nalgebra::{Matrix4, Point3, Vector3};

    /// Straight path along y = 0 with x = s in [0, 1]; faces optionally
    /// attached to the given mesh's first triangle.
    fn fitted_path(line_type: LineType, mesh: Option<&TriMesh>) -> ScreenPath {
        let mut path = ScreenPath::new(line_type, Visibility::Visible);
        for k in 0..=10 {
            let rel = k as f64 / 10.0;
            let face = mesh.map(|m| m.face_ref(0));
            let bary = mesh
                .map(|m| m.project_barycentric(0, &Point3::new(rel, 0.0, 0.5)))
                .unwrap_or_else(Vector3::zeros);
            path.add(NdcZPoint::new(rel, 0.0, 0.5), 0, face, bary, rel);
        }
        path.complete();
        path
    }

    /// Group over [0.1, 0.7] fitted linearly from t = 2 to t = 8.
    fn fitted_group() -> VoteGroup {
        let mut g = VoteGroup::new(42);
        g.begin = 0.1;
        g.end = 0.7;
        g.fits = vec![(0.1, 2.0), (0.7, 8.0)];
        g.fit_status = FitStatus::Good;
        g
    }

    /// One-quad slab in the x-z plane at y = 0 covering the test path.
    fn slab() -> TriMesh {
        let positions = vec![
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(-1.0, 0.0, 1.0),
        ];
        TriMesh::new(positions, vec![[0, 1, 2], [0, 2, 3]])
    }

    #[test]
    fn spans_step_six_pixels_and_keep_both_ends() {
        let mut path = fitted_path(LineType::Silhouette, None);
        path.groups.push(fitted_group());
        let mut paths = PathSet::default();
        paths.paths.push(path);

        let spans = generate_stroke_spans(
            &paths,
            &RenderFlags::default(),
            VisibilityMode::DualChannel,
            0.008,
            &StrokeParams::default(),
        );

        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.stroke_id, 42);
        assert_eq!(span.path_index, 0);
        assert_eq!(span.line_type, LineType::Silhouette);
        // 0.6 of arc at 0.048 steps: thirteen points, ends included.
        assert_eq!(span.points.len(), 13);
        let first = span.points[0];
        let last = span.points[span.points.len() - 1];
        assert!((first.s - 0.1).abs() < 1e-9);
        assert!((first.t - 2.0).abs() < 1e-9);
        assert!((last.s - 0.7).abs() < 1e-9);
        assert!((last.t - 8.0).abs() < 1e-9);
        for p in &span.points {
            // The path runs x = s, and the fit has slope ten.
            assert!((p.pos.x - p.s).abs() < 1e-9);
            assert!((p.t - (2.0 + (p.s - 0.1) * 10.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn degenerate_groups_emit_no_span() {
        let mut path = fitted_path(LineType::Silhouette, None);
        let mut zero = fitted_group();
        zero.begin = 0.3;
        zero.end = 0.3;
        zero.fits = vec![(0.3, 1.0)];
        let mut tiny = fitted_group();
        tiny.begin = 0.2;
        tiny.end = 0.2 + 1e-14;
        path.groups.push(zero);
        path.groups.push(tiny);
        let mut paths = PathSet::default();
        paths.paths.push(path);

        let spans = generate_stroke_spans(
            &paths,
            &RenderFlags::default(),
            VisibilityMode::DualChannel,
            0.01,
            &StrokeParams::default(),
        );
        assert!(spans.is_empty());
    }

    #[test]
    fn render_flags_gate_span_emission() {
        let mut sil = fitted_path(LineType::Silhouette, None);
        sil.groups.push(fitted_group());
        // Creases are disabled in the default flag table.
        let mut crease = fitted_path(LineType::Crease, None);
        crease.groups.push(fitted_group());
        let mut paths = PathSet::default();
        paths.paths.push(crease);
        paths.paths.push(sil);

        let spans = generate_stroke_spans(
            &paths,
            &RenderFlags::default(),
            VisibilityMode::DualChannel,
            0.01,
            &StrokeParams::default(),
        );
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].path_index, 1);
        assert_eq!(spans[0].line_type, LineType::Silhouette);
    }

    #[test]
    fn cached_values_follow_period_table_and_apparent_size() {
        let mut paths = PathSet::default();
        paths
            .paths
            .push(ScreenPath::new(LineType::Silhouette, Visibility::Visible));
        paths
            .paths
            .push(ScreenPath::new(LineType::Crease, Visibility::Visible));

        let mut params = StrokeParams::default();
        params.periods.silhouette = 12.0;
        // Sub-pixel periods clamp up to one.
        params.periods.crease = 0.25;

        cache_per_path_values(&mut paths, &params, 2.0, 1.0);
        assert_eq!(paths.paths[0].offset_pix_len, 12.0);
        assert_eq!(paths.paths[0].stretch, 2.0);
        assert_eq!(paths.paths[1].offset_pix_len, 1.0);
        assert_eq!(paths.paths[1].stretch, 2.0);

        params.sigma_one = true;
        cache_per_path_values(&mut paths, &params, 2.0, 1.0);
        assert_eq!(paths.paths[0].stretch, 1.0);

        // A degenerate current size never divides.
        params.sigma_one = false;
        cache_per_path_values(&mut paths, &params, 2.0, 0.0);
        assert_eq!(paths.paths[0].stretch, 1.0);
    }

    #[test]
    fn seed_regeneration_replaces_the_list() {
        let mesh = slab();
        let mut path = fitted_path(LineType::Silhouette, Some(&mesh));
        path.groups.push(fitted_group());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        let projector = Projector::new(Matrix4::identity());

        let mut seeds = vec![PathSample {
            stroke_id: 999,
            pos: NdcZPoint::default(),
            dir: nalgebra::Vector2::zeros(),
            t: 0.0,
            face: None,
            bary: Vector3::zeros(),
            world: Point3::origin(),
            line_type: LineType::Silhouette,
            vis: Visibility::Visible,
            path_index: 7,
        }];
        regenerate_seeds(
            &paths,
            &mesh,
            &projector,
            2.0,
            0.01,
            &StrokeParams::default(),
            &mut seeds,
        );

        // Spacing 0.08 over a 0.6 window: eight segments, nine seeds.
        assert_eq!(seeds.len(), 9);
        assert!(seeds.iter().all(|s| s.stroke_id == 42));
        assert!(seeds.iter().all(|s| s.path_index == 0));
        assert!(seeds.iter().all(|s| s.face.is_some()));
        assert!((seeds[0].t - 2.0).abs() < 1e-9);
        assert!((seeds[8].t - 8.0).abs() < 1e-9);
        for w in seeds.windows(2) {
            assert!(w[0].t < w[1].t);
        }
    }
}
