use log::warn;
use nalgebra::{Point3, Vector3};

use super::RawSegment;
use crate::mesh::Surface;
use crate::types::LineType;

// Vertex g-values of exactly 0 are nudged negative so sign tests never
// see a zero.
const G_NUDGE: f64 = -1e-8;

/// Walk every zero-crossing silhouette chain on the surface.
///
/// `visited` must hold one flag per face and is consumed as the per-frame
/// marker: faces are tested at most once, so repeated calls within a frame
/// are no-ops for already-covered regions.
pub fn extract_silhouettes<S: Surface>(
    surface: &S,
    eye: &Point3<f64>,
    visited: &mut [bool],
    out: &mut Vec<RawSegment>,
) {
    debug_assert_eq!(visited.len(), surface.face_count());
    let mut walk = Walk {
        surface,
        eye: *eye,
        visited,
        out,
    };
    for face in 0..surface.face_count() {
        if walk.mark_and_has_crossing(face) {
            walk.start(face);
        }
    }
}

struct Walk<'a, S: Surface> {
    surface: &'a S,
    eye: Point3<f64>,
    visited: &'a mut [bool],
    out: &'a mut Vec<RawSegment>,
}

impl<'a, S: Surface> Walk<'a, S> {
    fn g_value(&self, v: u32) -> f64 {
        let dir = self.eye - self.surface.vertex_position(v);
        let len = dir.norm();
        if len <= f64::EPSILON {
            return G_NUDGE;
        }
        let g = (dir / len).dot(&self.surface.vertex_normal(v));
        if g == 0.0 {
            G_NUDGE
        } else {
            g
        }
    }

    /// Marks the face as seen this frame either way.
    fn mark_and_has_crossing(&mut self, face: usize) -> bool {
        if self.visited[face] {
            return false;
        }
        self.visited[face] = true;
        let [a, b, c] = self.surface.face_vertices(face);
        let g0 = self.g_value(a);
        let g1 = self.g_value(b);
        let g2 = self.g_value(c);
        (g0 > 0.0 && (g1 < 0.0 || g2 < 0.0)) || (g0 < 0.0 && (g1 > 0.0 || g2 > 0.0))
    }

    /// Per-vertex g plus the local indices of the two crossing edges
    /// (edge `i` runs from vertex `i` to vertex `(i + 1) % 3`).
    fn face_g(&self, face: usize) -> ([f64; 3], usize, usize) {
        let verts = self.surface.face_vertices(face);
        let g = [
            self.g_value(verts[0]),
            self.g_value(verts[1]),
            self.g_value(verts[2]),
        ];
        let (ex1, ex2) = if g[0] > 0.0 {
            if g[1] > 0.0 {
                (1, 2)
            } else if g[2] > 0.0 {
                (0, 1)
            } else {
                (0, 2)
            }
        } else if g[1] < 0.0 {
            (1, 2)
        } else if g[2] < 0.0 {
            (0, 1)
        } else {
            (0, 2)
        };
        (g, ex1, ex2)
    }

    fn pos(&self, v: u32) -> Point3<f64> {
        self.surface.vertex_position(v)
    }

    fn local_index(&self, face: usize, v: u32) -> usize {
        let verts = self.surface.face_vertices(face);
        verts.iter().position(|&x| x == v).unwrap_or(0)
    }

    fn crossing_neighbor(&self, face: usize, a: u32, b: u32) -> Option<usize> {
        if self.surface.is_crease_edge(a, b) {
            None
        } else {
            self.surface.neighbor_across(face, a, b)
        }
    }

    fn push(&mut self, face: Option<usize>, point: Point3<f64>, front: bool, bary: Vector3<f64>) {
        self.out.push(RawSegment {
            point,
            face: face.map(|f| self.surface.face_ref(f)),
            front_facing: front,
            bary,
            line_type: LineType::Silhouette,
            end: face.is_none(),
        });
    }

    fn start(&mut self, face: usize) {
        let verts = self.surface.face_vertices(face);
        let (g, mut ex1, mut ex2) = self.face_g(face);
        let mut nex1 = (ex1 + 1) % 3;
        let mut nex2 = (ex2 + 1) % 3;

        // A crease is a discontinuity in the iso-surface; the walk never
        // crosses one.
        let mut f1 = self.crossing_neighbor(face, verts[ex1], verts[nex1]);
        let mut f2 = self.crossing_neighbor(face, verts[ex2], verts[nex2]);

        let mut alph1 = -g[ex1] / (g[nex1] - g[ex1]);
        let mut pt1 = self.pos(verts[ex1]).lerp(&self.pos(verts[nex1]), alph1);
        let mut alph2 = -g[ex2] / (g[nex2] - g[ex2]);
        let mut pt2 = self.pos(verts[ex2]).lerp(&self.pos(verts[nex2]), alph2);

        let mut gmax = if g[0] > g[1] { 0 } else { 1 };
        if g[2] > g[gmax] {
            gmax = 2;
        }
        let v_iso = pt1 - pt2;
        let v_grad = orthogonalized(self.pos(verts[gmax]) - pt2, v_iso);
        let bgrad = (self.eye - pt2).dot(&v_grad) > 0.0;

        // Fix the traversal orientation so every chain is walked the same
        // way around the surface.
        if v_grad.cross(&self.surface.face_normal(face)).dot(&v_iso) > 0.0 {
            std::mem::swap(&mut pt1, &mut pt2);
            std::mem::swap(&mut alph1, &mut alph2);
            std::mem::swap(&mut f1, &mut f2);
            std::mem::swap(&mut ex1, &mut ex2);
            std::mem::swap(&mut nex1, &mut nex2);
        }

        let mut bary = Vector3::zeros();
        bary[ex2] = 1.0 - alph2;
        bary[nex2] = alph2;

        let chain_start = self.out.len();
        self.push(Some(face), pt2, bgrad, bary);

        let mut vrt = [verts[ex2], verts[nex2], u32::MAX];
        let mut sg = [g[ex2], g[nex2], 0.0];

        if f1.is_some() {
            let mut iter_f = Some(face);
            let mut guard = 0usize;
            while let Some(cur) = iter_f {
                iter_f = self.step(cur, &mut vrt, &mut sg);
                if iter_f == Some(face) {
                    // Closed loop: snap the duplicate onto the seed point
                    // and terminate.
                    let first_pt = self.out[chain_start].point;
                    let closing_bary =
                        f2.map(|f| self.surface.project_barycentric(f, &first_pt));
                    let last = self.out.last_mut().expect("walk emitted segments");
                    last.point = first_pt;
                    last.face = None;
                    last.end = true;
                    if let Some(bc) = closing_bary {
                        last.bary = bc;
                    }
                    return;
                }
                guard += 1;
                if guard > 2 * self.surface.face_count() + 4 {
                    warn!("silhouette walk exceeded the face visit limit; chain truncated");
                    break;
                }
            }
        } else {
            let term_bary = self.surface.project_barycentric(face, &pt1);
            self.push(None, pt1, bgrad, term_bary);
        }

        // The forward chain hit a discontinuity; pick up the stretch
        // running the other way from the seed face.
        let back_start = self.out.len();
        let Some(back_face) = f2 else { return };

        let seed_bary = self.surface.project_barycentric(back_face, &pt2);
        self.push(Some(back_face), pt2, bgrad, seed_bary);

        vrt = [verts[ex2], verts[nex2], u32::MAX];
        sg = [g[ex2], g[nex2], 0.0];
        let mut iter_f = Some(back_face);
        let mut guard = 0usize;
        while let Some(cur) = iter_f {
            iter_f = self.step(cur, &mut vrt, &mut sg);
            guard += 1;
            if guard > 2 * self.surface.face_count() + 4 {
                warn!("silhouette walk exceeded the face visit limit; chain truncated");
                break;
            }
        }

        self.reverse_chain(chain_start, back_start);
    }

    /// Reverse the backward chain in front of the forward one, shifting
    /// per-face attribution by one so each segment still names the face
    /// containing the stretch to the next point.
    fn reverse_chain(&mut self, chain_start: usize, back_start: usize) {
        let back_len = self.out.len() - back_start;
        if back_len < 2 {
            self.out.truncate(back_start);
            return;
        }
        let mut back: Vec<RawSegment> = self.out.split_off(back_start);
        for i in (1..back.len()).rev() {
            back[i].face = back[i - 1].face;
            back[i].front_facing = back[i - 1].front_facing;
            if let Some(fref) = back[i].face {
                if let Some(f) = self.surface.resolve(fref) {
                    back[i].bary = self.surface.project_barycentric(f, &back[i].point);
                }
            }
        }
        // Drop the duplicated seed point, reverse, and clear the stale end
        // flag on what is now the chain head.
        back.remove(0);
        back.reverse();
        if let Some(head) = back.first_mut() {
            head.end = false;
        }
        self.out.splice(chain_start..chain_start, back);
    }

    /// Advance one face: find the exit crossing, emit it, and return the
    /// face it enters (`None` at creases and borders, after emitting the
    /// run terminator).
    fn step(&mut self, face: usize, vrt: &mut [u32; 3], sg: &mut [f64; 3]) -> Option<usize> {
        debug_assert_eq!(
            self.out.last().and_then(|s| s.face.map(|f| f.index as usize)),
            Some(face)
        );
        self.visited[face] = true;

        let Some(third) = self.surface.other_vertex(face, vrt[0], vrt[1]) else {
            warn!("degenerate face {face} in silhouette walk; chain terminated");
            let last_pt = self.out.last().map(|s| s.point).unwrap_or_else(Point3::origin);
            let bary = self.surface.project_barycentric(face, &last_pt);
            let front = self.out.last().map(|s| s.front_facing).unwrap_or(true);
            self.push(None, last_pt, front, bary);
            return None;
        };
        vrt[2] = third;
        sg[2] = self.g_value(third);
        let last_pt = self.out.last().expect("walk emitted segments").point;

        // Entering edge endpoints carry opposite signs, so the exit edge is
        // always third-to-one-of-them.
        let cross_vrt = if sg[2] > 0.0 {
            usize::from(sg[0] >= 0.0)
        } else {
            usize::from(sg[0] <= 0.0)
        };
        let alph = -sg[2] / (sg[cross_vrt] - sg[2]);
        let new_pt = self.pos(vrt[2]).lerp(&self.pos(vrt[cross_vrt]), alph);

        let mut gmax = if sg[0] > sg[1] { 0 } else { 1 };
        if sg[2] > sg[gmax] {
            gmax = 2;
        }
        let v_iso = last_pt - new_pt;
        let v_grad = orthogonalized(self.pos(vrt[gmax]) - new_pt, v_iso);
        let bgrad = (self.eye - new_pt).dot(&v_grad) > 0.0;

        // The gradient belongs to the span between the previous point and
        // this one, so it lands on the previous segment.
        if let Some(prev) = self.out.last_mut() {
            prev.front_facing = bgrad;
        }

        let exit_a = vrt[2];
        let exit_b = vrt[cross_vrt];
        let next = self
            .surface
            .neighbor_across(face, exit_a, exit_b)
            .filter(|_| !self.surface.is_crease_edge(exit_a, exit_b));

        match next {
            Some(nf) => {
                let mut bary = Vector3::zeros();
                bary[self.local_index(nf, exit_a)] = 1.0 - alph;
                bary[self.local_index(nf, exit_b)] = alph;
                self.push(Some(nf), new_pt, bgrad, bary);
            }
            None => {
                let mut bary = Vector3::zeros();
                bary[self.local_index(face, exit_a)] = 1.0 - alph;
                bary[self.local_index(face, exit_b)] = alph;
                self.push(None, new_pt, bgrad, bary);
            }
        }

        vrt[1 - cross_vrt] = vrt[2];
        sg[1 - cross_vrt] = sg[2];
        next
    }
}

fn orthogonalized(v: Vector3<f64>, against: Vector3<f64>) -> Vector3<f64> {
    let len2 = against.norm_squared();
    if len2 <= f64::EPSILON {
        return v;
    }
    v - against * (v.dot(&against) / len2)
}
