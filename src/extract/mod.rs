//! Line extraction on the surface. Zero-crossing silhouette chains are
//! walked face to face, then split wherever the view gradient flips;
//! crease, border, way-path and polyline sources append their own runs.
//!
//! All sources emit the same flat stream of [`RawSegment`]s: consecutive
//! segments form a run until one carries the `end` flag. A segment's face
//! covers the span from its point to the next point in the run.

use nalgebra::{Point3, Vector3};

use crate::mesh::{EdgeStrip, FaceRef, Surface};
use crate::types::LineType;

mod zerocross;

pub use zerocross::extract_silhouettes;

/// One point of a pre-visibility line run in world space.
#[derive(Clone, Copy, Debug)]
pub struct RawSegment {
    pub point: Point3<f64>,
    /// Face containing the span to the next point. `None` marks run
    /// terminators and free polyline points.
    pub face: Option<FaceRef>,
    /// Eye side of the view gradient over the span to the next point.
    pub front_facing: bool,
    pub bary: Vector3<f64>,
    pub line_type: LineType,
    pub end: bool,
}

fn line_type_for(front: bool) -> LineType {
    if front {
        LineType::Silhouette
    } else {
        LineType::BackfacingSilhouette
    }
}

/// Split walked silhouette runs into gradient-homogeneous runs, appending
/// them to `out` tagged `Silhouette` or `BackfacingSilhouette`.
///
/// Closed loops whose seam is not a gradient boundary are reconnected
/// across it, so a loop that flips gradient twice still yields exactly two
/// runs. Disabled types are dropped after splitting.
pub fn split_gradient_runs<S: Surface>(
    surface: &S,
    raw: &[RawSegment],
    keep_front: bool,
    keep_back: bool,
    out: &mut Vec<RawSegment>,
) {
    let filter_from = out.len();
    let n = raw.len();
    let mut run_start = 0usize;
    while run_start < n {
        let mut run_end = run_start;
        while run_end + 1 < n {
            run_end += 1;
            if raw[run_end].end {
                break;
            }
        }

        let start_grad = raw[run_start].front_facing;
        let mut flip = run_start;
        while flip < run_end && raw[flip].front_facing == start_grad {
            flip += 1;
        }

        if flip == run_end {
            // Uniform gradient, pass the run through.
            let lt = line_type_for(start_grad);
            for seg in &raw[run_start..run_end] {
                let mut s = *seg;
                s.line_type = lt;
                out.push(s);
            }
            let mut last = raw[run_end];
            last.line_type = lt;
            last.front_facing = start_grad;
            out.push(last);
        } else {
            // Emit the sections from the first flip onward, each closed by
            // a duplicate of the next section's first point.
            let mut i = flip;
            while i < run_end {
                let mark_grad = raw[i].front_facing;
                let lt = line_type_for(mark_grad);
                while i < run_end && raw[i].front_facing == mark_grad {
                    let mut s = raw[i];
                    s.line_type = lt;
                    out.push(s);
                    i += 1;
                }
                out.push(section_cut(surface, &raw[i], &raw[i - 1], mark_grad, lt));
            }

            // A loop whose seam joins equal gradients reconnects: drop the
            // cut at the seam and let the head section continue it.
            if raw[run_start].point == raw[run_end].point
                && out.last().map(|s| s.front_facing) == Some(start_grad)
            {
                out.pop();
            }

            let lt = line_type_for(start_grad);
            for seg in &raw[run_start..flip] {
                let mut s = *seg;
                s.line_type = lt;
                out.push(s);
            }
            out.push(section_cut(surface, &raw[flip], &raw[flip - 1], start_grad, lt));
        }

        run_start = run_end + 1;
    }

    if keep_front && keep_back {
        return;
    }
    let mut j = filter_from;
    for i in filter_from..out.len() {
        let pass = match out[i].line_type {
            LineType::Silhouette => keep_front,
            _ => keep_back,
        };
        if pass {
            out[j] = out[i];
            j += 1;
        }
    }
    out.truncate(j);
}

/// Run terminator at `at.point`, attributed to the span it closes.
fn section_cut<S: Surface>(
    surface: &S,
    at: &RawSegment,
    prev: &RawSegment,
    grad: bool,
    lt: LineType,
) -> RawSegment {
    let mut cut = *at;
    cut.front_facing = grad;
    cut.line_type = lt;
    if let Some(f) = prev.face.and_then(|fr| surface.resolve(fr)) {
        cut.bary = surface.project_barycentric(f, &cut.point);
    }
    cut.face = None;
    cut.end = true;
    cut
}

/// Append crease strips. Edges without exactly two adjacent faces are
/// skipped, breaking the strip around them. `max_bend_angle` (radians)
/// additionally breaks runs at sharp turns when set.
pub fn append_crease_strips<S: Surface>(
    surface: &S,
    strips: &[EdgeStrip],
    max_bend_angle: Option<f64>,
    out: &mut Vec<RawSegment>,
) {
    for strip in strips {
        append_strip(surface, strip, LineType::Crease, max_bend_angle, true, out);
    }
}

/// Append border strips. Borders keep their single adjacent face and
/// never break on bend angle.
pub fn append_border_strips<S: Surface>(
    surface: &S,
    strips: &[EdgeStrip],
    out: &mut Vec<RawSegment>,
) {
    for strip in strips {
        append_strip(surface, strip, LineType::Border, None, false, out);
    }
}

/// Append an authored edge path. Rendered with silhouette styling but
/// tracked under its own type.
pub fn append_way_path<S: Surface>(surface: &S, strip: &EdgeStrip, out: &mut Vec<RawSegment>) {
    append_strip(surface, strip, LineType::WayPath, None, false, out);
}

/// Append a free polyline. No faces back these points, so downstream
/// stages fall back to endpoint interpolation for them.
pub fn append_polyline(points: &[Point3<f64>], out: &mut Vec<RawSegment>) {
    let n = points.len();
    for (i, p) in points.iter().enumerate() {
        out.push(RawSegment {
            point: *p,
            face: None,
            front_facing: true,
            bary: Vector3::zeros(),
            line_type: LineType::Polyline,
            end: i + 1 == n,
        });
    }
}

fn append_strip<S: Surface>(
    surface: &S,
    strip: &EdgeStrip,
    line_type: LineType,
    max_bend_angle: Option<f64>,
    require_two_faces: bool,
    out: &mut Vec<RawSegment>,
) {
    let edges = &strip.edges;
    for (i, edge) in edges.iter().enumerate() {
        if require_two_faces && edge.adjacent_faces != 2 {
            continue;
        }
        let face = edge.face.and_then(|fr| surface.resolve(fr));
        let a_pos = surface.vertex_position(edge.a);
        let bary = face
            .map(|f| surface.project_barycentric(f, &a_pos))
            .unwrap_or_else(Vector3::zeros);
        out.push(RawSegment {
            point: a_pos,
            face: face.map(|f| surface.face_ref(f)),
            front_facing: true,
            bary,
            line_type,
            end: false,
        });

        let next = edges.get(i + 1);
        let next_ok = edge.continues
            && next.is_some_and(|e| !require_two_faces || e.adjacent_faces == 2);
        let bend_break = match (max_bend_angle, next) {
            (Some(thresh), Some(nx)) if next_ok => {
                exterior_angle(
                    &a_pos,
                    &surface.vertex_position(edge.b),
                    &surface.vertex_position(nx.b),
                ) > thresh
            }
            _ => false,
        };
        if !next_ok || bend_break {
            let b_pos = surface.vertex_position(edge.b);
            let bary = face
                .map(|f| surface.project_barycentric(f, &b_pos))
                .unwrap_or_else(Vector3::zeros);
            out.push(RawSegment {
                point: b_pos,
                face: None,
                front_facing: true,
                bary,
                line_type,
                end: true,
            });
        }
    }
}

/// Exterior angle at `b` for the ordered points `a`, `b`, `c`, in
/// `[0, pi]`. Collinear points give 0.
fn exterior_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (c - b).angle(&(b - a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriMesh;

    fn quad_mesh() -> TriMesh {
        TriMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    fn seg(mesh: &TriMesh, face: usize, x: f64, grad: bool, end: bool) -> RawSegment {
        let point = Point3::new(x, 0.25, 0.0);
        RawSegment {
            point,
            face: Some(mesh.face_ref(face)),
            front_facing: grad,
            bary: mesh.project_barycentric(face, &point),
            line_type: LineType::Silhouette,
            end,
        }
    }

    fn run_bounds(segs: &[RawSegment]) -> Vec<(usize, usize)> {
        let mut bounds = Vec::new();
        let mut start = 0;
        while start < segs.len() {
            let mut end = start;
            while end + 1 < segs.len() {
                end += 1;
                if segs[end].end {
                    break;
                }
            }
            bounds.push((start, end));
            start = end + 1;
        }
        bounds
    }

    #[test]
    fn uniform_run_passes_through_once() {
        let mesh = quad_mesh();
        let raw = vec![
            seg(&mesh, 0, 0.1, true, false),
            seg(&mesh, 0, 0.2, true, false),
            seg(&mesh, 0, 0.3, true, true),
        ];
        let mut out = Vec::new();
        split_gradient_runs(&mesh, &raw, true, true, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| s.line_type == LineType::Silhouette));
        assert!(out[2].end);
    }

    #[test]
    fn mixed_run_splits_with_shared_boundary_points() {
        let mesh = quad_mesh();
        let raw = vec![
            seg(&mesh, 0, 0.1, true, false),
            seg(&mesh, 0, 0.2, true, false),
            seg(&mesh, 0, 0.3, false, false),
            seg(&mesh, 0, 0.4, false, false),
            seg(&mesh, 0, 0.5, false, true),
        ];
        let mut out = Vec::new();
        split_gradient_runs(&mesh, &raw, true, true, &mut out);
        let bounds = run_bounds(&out);
        assert_eq!(bounds.len(), 2);
        // Back-facing section first, then the head section, each closed by
        // a duplicated boundary point.
        let (b0, e0) = bounds[0];
        let (b1, e1) = bounds[1];
        assert_eq!(out[b0].line_type, LineType::BackfacingSilhouette);
        assert_eq!(out[b1].line_type, LineType::Silhouette);
        assert!(out[e0].end && out[e1].end);
        // Head run ends where the backfacing run starts.
        assert_eq!(out[e1].point, out[b0].point);
    }

    #[test]
    fn loop_with_matching_seam_gradient_reconnects() {
        let mesh = quad_mesh();
        let mut raw = vec![
            seg(&mesh, 0, 0.1, true, false),
            seg(&mesh, 0, 0.2, false, false),
            seg(&mesh, 0, 0.3, false, false),
            seg(&mesh, 0, 0.4, true, false),
            seg(&mesh, 0, 0.1, true, true),
        ];
        raw[4].point = raw[0].point;
        let mut out = Vec::new();
        split_gradient_runs(&mesh, &raw, true, true, &mut out);
        let bounds = run_bounds(&out);
        assert_eq!(bounds.len(), 2);
        // The front-facing run wraps across the loop seam.
        let (b1, e1) = bounds[1];
        assert_eq!(out[b1].line_type, LineType::Silhouette);
        assert_eq!(e1 - b1 + 1, 3);
        assert_eq!(out[b1].point, raw[3].point);
        assert_eq!(out[b1 + 1].point, raw[0].point);
    }

    #[test]
    fn postfilter_drops_disabled_type() {
        let mesh = quad_mesh();
        let raw = vec![
            seg(&mesh, 0, 0.1, true, false),
            seg(&mesh, 0, 0.2, false, false),
            seg(&mesh, 0, 0.3, false, true),
        ];
        let mut out = Vec::new();
        split_gradient_runs(&mesh, &raw, true, false, &mut out);
        assert!(out.iter().all(|s| s.line_type == LineType::Silhouette));
        assert!(!out.is_empty());
    }

    #[test]
    fn polyline_appends_single_run() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let mut out = Vec::new();
        append_polyline(&pts, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out[2].end && !out[0].end && !out[1].end);
        assert!(out.iter().all(|s| s.face.is_none()));
        assert!(out.iter().all(|s| s.line_type == LineType::Polyline));
    }

    #[test]
    fn border_strip_emits_run_with_terminator() {
        let mesh = quad_mesh();
        let strips = mesh.border_strips();
        assert!(!strips.is_empty());
        let mut out = Vec::new();
        append_border_strips(&mesh, &strips, &mut out);
        let bounds = run_bounds(&out);
        assert!(!bounds.is_empty());
        for (b, e) in bounds {
            assert!(out[e].end);
            assert!(out[e].face.is_none());
            for s in &out[b..e] {
                assert!(s.face.is_some());
                assert_eq!(s.line_type, LineType::Border);
            }
        }
    }

    #[test]
    fn bend_angle_breaks_crease_run() {
        // Fan of faces along a zig-zag crease line.
        let mesh = TriMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
                Point3::new(0.5, -1.0, 0.5),
                Point3::new(1.5, 0.0, 0.5),
                Point3::new(1.5, 2.0, 0.5),
            ],
            vec![[0, 1, 4], [1, 2, 5], [2, 3, 6], [1, 0, 5], [2, 1, 6], [3, 2, 4]],
        );
        let mut mesh = mesh;
        mesh.mark_crease(0, 1);
        mesh.mark_crease(1, 2);
        mesh.mark_crease(2, 3);
        let strips = mesh.crease_strips();
        assert_eq!(strips.len(), 1);

        let mut joined = Vec::new();
        append_crease_strips(&mesh, &strips, None, &mut joined);
        assert_eq!(run_bounds(&joined).len(), 1);

        // The turn at each shared vertex is 45 degrees or more.
        let mut split = Vec::new();
        append_crease_strips(&mesh, &strips, Some(0.2), &mut split);
        assert!(run_bounds(&split).len() > 1);
    }
}
