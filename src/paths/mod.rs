//! Screen polylines assembled from classified segments.
//!
//! A [`ScreenPath`] keeps, per point, the raster id word it was drawn
//! with and its arc position inside that identifier run. The id index
//! built at assembly time maps any read-back word to a short arc window
//! on the path, so cross-frame matching never scans whole paths.

pub mod assemble;
pub mod resample;

use std::sync::atomic::{AtomicU32, Ordering};

use nalgebra::{Point3, Vector2, Vector3};

use crate::geometry::{perpend, project_to_segment, NdcZPoint, Projector};
use crate::groups::VoteGroup;
use crate::mesh::{FaceRef, Surface};
use crate::raster::encoding;
use crate::types::{LineType, ParamVote, PathSample, Visibility, VoteStatus};
use crate::visibility::RunLengths;

pub use assemble::{assemble_paths, join_small_breaks};
pub use resample::resample;

static NEXT_STROKE_ID: AtomicU32 = AtomicU32::new(1);

/// Fresh nonzero stroke id, unique within the process.
pub fn gen_stroke_id() -> u32 {
    let id = NEXT_STROKE_ID.fetch_add(1, Ordering::Relaxed);
    if id != 0 {
        id
    } else {
        NEXT_STROKE_ID.fetch_add(1, Ordering::Relaxed)
    }
}

/// Narrow `[l, r]` so that `values[l] <= target < values[r]`, reading the
/// window modulo `n`; window indices may run past the end for identifier
/// runs that wrap a loop seam.
fn bisect_window(values: &[f64], n: usize, mut l: usize, mut r: usize, target: f64) -> (usize, usize) {
    loop {
        let m = (l + r) / 2;
        if m == l {
            return (l, r);
        }
        if target > values[m % n] {
            l = m;
        } else {
            r = m;
        }
    }
}

/// One assembled polyline with per-point surface attribution, the id
/// index over its points, and the votes and fitted groups of the current
/// frame.
#[derive(Clone, Debug)]
pub struct ScreenPath {
    points: Vec<NdcZPoint>,
    ids: Vec<u32>,
    faces: Vec<Option<FaceRef>>,
    barys: Vec<Vector3<f64>>,
    /// Arc position of each point within its identifier run, as drawn on
    /// the reference pass.
    run_pos: Vec<f64>,
    /// Cumulative planar arc length per point; rebuilt by [`complete`].
    ///
    /// [`complete`]: ScreenPath::complete
    arc: Vec<f64>,
    /// Distinct masked ids in first-appearance order. A run that wraps a
    /// loop seam re-appends the first id, so an id may map to two
    /// windows.
    id_set: Vec<u32>,
    /// Start index of each id window, terminated by the point count.
    id_offsets: Vec<usize>,
    /// Raster run length per `id_set` entry.
    run_lengths: Vec<f64>,
    pub line_type: LineType,
    pub vis: Visibility,
    pub votes: Vec<ParamVote>,
    pub groups: Vec<VoteGroup>,
    /// Reference-to-current apparent size ratio; scales the stroke
    /// parameter frequency so the pattern period tracks the mesh.
    pub stretch: f64,
    /// Pixel length of one period of the stroke pattern for this path's
    /// style row.
    pub offset_pix_len: f64,
}

impl ScreenPath {
    pub fn new(line_type: LineType, vis: Visibility) -> Self {
        Self {
            points: Vec::new(),
            ids: Vec::new(),
            faces: Vec::new(),
            barys: Vec::new(),
            run_pos: Vec::new(),
            arc: Vec::new(),
            id_set: Vec::new(),
            id_offsets: Vec::new(),
            run_lengths: Vec::new(),
            line_type,
            vis,
            votes: Vec::new(),
            groups: Vec::new(),
            stretch: 1.0,
            offset_pix_len: 1.0,
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, i: usize) -> NdcZPoint {
        self.points[i]
    }

    pub fn points(&self) -> &[NdcZPoint] {
        &self.points
    }

    pub fn id(&self, i: usize) -> u32 {
        self.ids[i]
    }

    pub fn face(&self, i: usize) -> Option<FaceRef> {
        self.faces[i]
    }

    pub fn id_set(&self) -> &[u32] {
        &self.id_set
    }

    pub fn id_offsets(&self) -> &[usize] {
        &self.id_offsets
    }

    pub fn run_length(&self, ind: usize) -> f64 {
        self.run_lengths[ind]
    }

    pub fn run_pos(&self, i: usize) -> f64 {
        self.run_pos[i]
    }

    /// Total planar arc length.
    pub fn length(&self) -> f64 {
        self.arc.last().copied().unwrap_or(0.0)
    }

    pub fn owns_id(&self, masked: u32) -> bool {
        self.id_set.contains(&masked)
    }

    pub fn add(
        &mut self,
        pos: NdcZPoint,
        word: u32,
        face: Option<FaceRef>,
        bary: Vector3<f64>,
        run_pos: f64,
    ) {
        self.points.push(pos);
        self.ids.push(word);
        self.faces.push(face);
        self.barys.push(bary);
        self.run_pos.push(run_pos);
        let masked = encoding::masked(word);
        if masked != 0 && !self.id_set.contains(&masked) {
            self.id_set.push(masked);
            self.id_offsets.push(self.points.len() - 1);
        }
    }

    /// Rebuild the cumulative arc lengths after points changed.
    pub fn complete(&mut self) {
        self.arc.clear();
        self.arc.reserve(self.points.len());
        let mut total = 0.0;
        for i in 0..self.points.len() {
            if i > 0 {
                total += self.points[i].planar_dist(&self.points[i - 1]);
            }
            self.arc.push(total);
        }
    }

    /// Attach run lengths to each id window and close the index.
    ///
    /// When the raster run's start fell inside the path (the seam of a
    /// clipped loop), the first id gets a second window over the path
    /// tail so arc lookups stay monotone within every window.
    pub(crate) fn build_id_index(&mut self, lengths: &RunLengths) {
        let n = self.points.len();
        debug_assert!(n > 1);
        for &id in &self.id_set {
            self.run_lengths.push(lengths.get(&id).copied().unwrap_or_else(|| {
                log::warn!("no run length recorded for id {id:#010x}");
                0.0
            }));
        }
        if self.id_set.len() == 1 && self.run_pos[0] > self.run_pos[n - 1] {
            let mut offset = n - 1;
            while offset > 0 && self.run_pos[offset] > self.run_pos[offset - 1] {
                offset -= 1;
            }
            self.id_offsets.push(offset);
            self.id_set.push(self.id_set[0]);
            self.run_lengths.push(self.run_lengths[0]);
        } else if self.id_set.len() > 1
            && self.id_set[0] == encoding::masked(self.ids[n - 1])
        {
            let first = self.id_set[0];
            let mut offset = n - 1;
            while offset > 0 && encoding::masked(self.ids[offset - 1]) == first {
                offset -= 1;
            }
            self.id_offsets.push(offset);
            self.id_set.push(first);
            self.run_lengths.push(self.run_lengths[0]);
        }
        self.id_offsets.push(n);
    }

    pub fn is_closed(&self) -> bool {
        self.points.len() > 2 && self.points[0] == self.points[self.points.len() - 1]
    }

    /// Arc length at point `i`, clamped to the path's ends.
    pub fn get_s(&self, i: usize) -> f64 {
        self.arc.get(i).copied().unwrap_or_else(|| self.length())
    }

    fn seg_dir(&self, i: usize) -> Vector2<f64> {
        (self.points[i + 1].planar() - self.points[i].planar())
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector2::zeros)
    }

    /// Unit tangent at point `i`, averaging the two adjacent segment
    /// directions at interior points.
    pub fn tan(&self, i: usize) -> Vector2<f64> {
        let n = self.points.len();
        if n < 2 {
            return Vector2::zeros();
        }
        if i == 0 {
            self.seg_dir(0)
        } else if i >= n - 1 {
            self.seg_dir(n - 2)
        } else {
            (self.seg_dir(i) + self.seg_dir(i - 1))
                .try_normalize(f64::EPSILON)
                .unwrap_or_else(Vector2::zeros)
        }
    }

    /// Point at normalized arc position `u` in `[0, 1]`.
    pub fn point_at(&self, u: f64) -> NdcZPoint {
        let n = self.points.len();
        if n == 0 {
            return NdcZPoint::default();
        }
        if n == 1 {
            return self.points[0];
        }
        let target = u.clamp(0.0, 1.0) * self.length();
        let j = self.arc.partition_point(|&a| a <= target);
        if j == 0 {
            return self.points[0];
        }
        if j >= n {
            return self.points[n - 1];
        }
        let span = self.arc[j] - self.arc[j - 1];
        if span <= f64::EPSILON {
            return self.points[j];
        }
        self.points[j - 1].lerp(&self.points[j], (target - self.arc[j - 1]) / span)
    }

    /// Object-space position of point `i`, evaluated on its recorded face
    /// so the point rides a deforming surface. Falls back to the previous
    /// point's face, then to unprojecting the screen position.
    pub fn world_point<S: Surface>(
        &self,
        i: usize,
        surface: &S,
        projector: &Projector,
    ) -> Point3<f64> {
        let on_face = |face: Option<FaceRef>| {
            face.and_then(|f| surface.resolve(f))
                .map(|fidx| surface.barycentric_position(fidx, &self.barys[i]))
        };
        on_face(self.faces[i])
            .or_else(|| if i > 0 { on_face(self.faces[i - 1]) } else { None })
            .or_else(|| projector.unproject(&self.points[i]))
            .unwrap_or_else(Point3::origin)
    }

    pub fn reset_votes(&mut self) {
        self.votes.clear();
    }

    fn id_index(&self, masked: u32) -> Option<usize> {
        self.id_set.iter().rposition(|&id| id == masked)
    }

    /// Whether the arc position encoded in `word` falls inside the
    /// matching id window (open interval; the window's boundary points
    /// are excluded).
    pub fn in_range(&self, word: u32) -> bool {
        if self.points.len() < 2 {
            return false;
        }
        let n = self.id_set.len();
        if n == 0 || self.id_offsets.len() != n + 1 {
            return false;
        }
        let id = encoding::masked(word);
        let lval = encoding::length_byte(word) as f64;
        if id == self.id_set[0] {
            let len = lval * self.run_lengths[0] / 255.0;
            if self.run_pos[self.id_offsets[0]] < len
                && len < self.run_pos[self.id_offsets[1] - 1]
            {
                return true;
            }
            if n > 1 && self.id_set[n - 1] == id {
                // The first id owns a second window over the path tail.
                if self.is_closed()
                    && self.run_pos[self.id_offsets[n - 1]] < len
                    && len < self.run_pos[0]
                {
                    return true;
                }
                return self.run_pos[self.id_offsets[n - 1]] < len
                    && len < self.run_pos[self.id_offsets[n] - 1];
            }
            false
        } else if let Some(ind) = self.id_index(id) {
            let len = lval * self.run_lengths[ind] / 255.0;
            self.run_pos[self.id_offsets[ind]] < len
                && len < self.run_pos[self.id_offsets[ind + 1] - 1]
        } else {
            false
        }
    }

    /// Nearest point to `p` over the whole path: `(distance, point,
    /// segment index)`.
    pub fn closest_point(&self, p: Vector2<f64>) -> Option<(f64, Vector2<f64>, usize)> {
        let n = self.points.len();
        let mut best: Option<(f64, Vector2<f64>, usize)> = None;
        for i in 0..n.saturating_sub(1) {
            let (q, _) =
                project_to_segment(self.points[i].planar(), self.points[i + 1].planar(), p);
            let d = (q - p).norm();
            if best.map_or(true, |(bd, _, _)| d < bd) {
                best = Some((d, q, i));
            }
        }
        best
    }

    /// Nearest point to `p` restricted to the arc window the id word
    /// names, padded by the word's quantization error. The window is
    /// found by bisecting the per-point run positions; for a wrapped
    /// first id it spans the loop seam, and a single-id path widens past
    /// either end when the padded window leaves `[0, run length]`.
    pub fn closest_point_in_id_window(
        &self,
        word: u32,
        p: Vector2<f64>,
        pix_to_ndc: f64,
    ) -> Option<(f64, Vector2<f64>, usize)> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let pathn = self.id_set.len();
        if pathn == 0 || self.id_offsets.len() != pathn + 1 {
            return None;
        }
        let id = encoding::masked(word);
        let lval = encoding::length_byte(word) as f64;
        let wrap = pathn > 1 && id == self.id_set[0] && id == self.id_set[pathn - 1];
        let ind = if wrap { 0 } else { self.id_index(id)? };

        let len = self.run_lengths[ind] * lval / 255.0;
        let error_margin = (self.run_lengths[ind] / 255.0).max(pix_to_ndc * 2.0);
        let len_delta = 3.0 * error_margin;
        let upper_len = len + len_delta;
        let lower_len = len - len_delta;

        let l0 = if wrap {
            self.id_offsets[pathn - 1]
        } else {
            self.id_offsets[ind]
        };
        let r0 = if wrap {
            n + self.id_offsets[1] - 1
        } else {
            self.id_offsets[ind + 1] - 1
        };

        let (l1, _) = bisect_window(&self.run_pos, n, l0, r0, lower_len);
        let mut lower_ind = l1;
        let (_, r1) = bisect_window(&self.run_pos, n, l1, r0, upper_len);
        let mut upper_ind = r1;

        // A lone id can spill past either end of the run; wrap the spilled
        // remainder around the loop.
        if pathn == 1 {
            if upper_len > self.run_pos[n - 1] {
                let (_, r2) =
                    bisect_window(&self.run_pos, n, 0, n - 1, upper_len - self.run_pos[n - 1]);
                upper_ind = r2 + n;
            }
            if lower_len < 0.0 {
                let (l2, _) =
                    bisect_window(&self.run_pos, n, 0, n - 1, lower_len + self.run_pos[n - 1]);
                lower_ind = l2;
                upper_ind += n;
            }
        }

        let mut best: Option<(f64, Vector2<f64>, usize)> = None;
        for j in lower_ind..upper_ind {
            let i = j % n;
            if i == n - 1 {
                // Synthetic closing segment of a loop.
                continue;
            }
            let (q, _) =
                project_to_segment(self.points[i].planar(), self.points[i + 1].planar(), p);
            let d = (q - p).norm();
            if best.map_or(true, |(bd, _, _)| d < bd) {
                best = Some((d, q, i));
            }
        }
        best
    }

    /// Record a parameter vote where a propagated sample landed. Rejects
    /// hits farther from the reprojected sample than one pixel beyond the
    /// search range.
    #[allow(clippy::too_many_arguments)]
    pub fn register_vote<S: Surface>(
        &mut self,
        sample: &PathSample,
        world_vote: Point3<f64>,
        hit: Vector2<f64>,
        index: usize,
        surface: &S,
        projector: &Projector,
        ndc_to_pix: f64,
        mesh_pixels: f64,
        max_steps: usize,
    ) -> bool {
        let Some(sample_ndc) = projector.project(&world_vote) else {
            return false;
        };
        let pix_dist = (hit - sample_ndc.planar()).norm() * ndc_to_pix;
        if pix_dist >= (max_steps + 1) as f64 {
            return false;
        }
        let s = self.get_s(index) + (hit - self.points[index].planar()).norm();
        let span = self.get_s(index + 1) - self.get_s(index);
        let alph = if span > f64::EPSILON {
            (s - self.get_s(index)) / span
        } else {
            0.0
        };
        let a = self.world_point(index, surface, projector);
        let b = self.world_point(index + 1, surface, projector);
        let on_path = a + (b - a) * alph;
        self.votes.push(ParamVote {
            s,
            t: sample.t,
            confidence: 1.0,
            status: VoteStatus::Good,
            path_index: sample.path_index,
            stroke_id: sample.stroke_id,
            pix_dist,
            world_dist: (on_path - world_vote).norm() / mesh_pixels,
        });
        true
    }

    /// Emit next-frame seed samples along every good group, spaced evenly
    /// over the group's arc span. Samples carry the group's fitted
    /// parameter and a surface attachment so they ride the mesh.
    pub fn generate_seed_samples<S: Surface>(
        &self,
        spacing: f64,
        path_index: usize,
        surface: &S,
        projector: &Projector,
        out: &mut Vec<PathSample>,
    ) {
        if self.points.len() < 2 || spacing <= 0.0 {
            return;
        }
        let n = self.points.len() - 1;
        let b = 0usize;
        for g in &self.groups {
            if !g.status.is_good() {
                continue;
            }
            let span = g.end - g.begin;
            if span < spacing * 0.1 {
                continue;
            }
            let nsegs = (span / spacing).ceil() as usize;
            let nspacing = span / nsegs as f64;
            let mut last_added = 0usize;
            let mut l = b;
            let mut k = 0usize;
            while k <= nsegs && l != n {
                let target_s = g.begin + nspacing * k as f64;
                let (nl, _) = bisect_window(&self.arc, self.arc.len(), l, n, target_s);
                l = nl;
                let r = l + 1;

                if n - b != 1 && self.faces[l] == self.faces[r] {
                    // Interior of one face: interpolate between the
                    // bracketing points.
                    if let Some((face, fidx)) = self
                        .faces[l]
                        .and_then(|f| surface.resolve(f).map(|fidx| (f, fidx)))
                    {
                        let sl = self.arc[l];
                        let sr = self.arc[r];
                        let weight = if sr - sl > f64::EPSILON {
                            (target_s - sl) / (sr - sl)
                        } else {
                            0.0
                        };
                        let pt = self.points[l].lerp(&self.points[r], weight);
                        if let Some(world) = projector.unproject(&pt) {
                            out.push(PathSample {
                                stroke_id: g.id,
                                pos: pt,
                                dir: perpend(self.tan(l)),
                                t: g.get_t(target_s),
                                face: Some(face),
                                bary: surface.project_barycentric(fidx, &world),
                                world,
                                line_type: self.line_type,
                                vis: self.vis,
                                path_index,
                            });
                            last_added = l;
                        }
                    }
                } else {
                    // Face changes inside the bracket: snap to whichever
                    // bracketing point was not emitted yet.
                    let add = if last_added != l { l } else { r };
                    let face = if add != n {
                        self.faces[add]
                    } else {
                        self.faces[add - 1]
                    };
                    if let Some((face, fidx)) =
                        face.and_then(|f| surface.resolve(f).map(|fidx| (f, fidx)))
                    {
                        let pt = self.points[add];
                        if let Some(world) = projector.unproject(&pt) {
                            out.push(PathSample {
                                stroke_id: g.id,
                                pos: pt,
                                dir: perpend(self.tan(add)),
                                t: g.get_t(self.arc[add]),
                                face: Some(face),
                                bary: surface.project_barycentric(fidx, &world),
                                world,
                                line_type: self.line_type,
                                vis: self.vis,
                                path_index,
                            });
                            last_added = add;
                            l = r;
                        }
                    }
                }
                k += 1;
            }
        }
    }
}

/// All paths of one frame, with id lookup and cross-frame majority
/// queries over their votes.
#[derive(Clone, Debug, Default)]
pub struct PathSet {
    pub paths: Vec<ScreenPath>,
    /// Frame stamp of the last assembly.
    pub path_stamp: u64,
    /// Frame stamp of the last group build.
    pub group_stamp: u64,
}

impl PathSet {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScreenPath> {
        self.paths.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ScreenPath> {
        self.paths.iter_mut()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn reset_votes(&mut self) {
        for path in &mut self.paths {
            path.reset_votes();
        }
    }

    /// Every path whose id index contains `masked`, with its index.
    pub fn paths_owning(&self, masked: u32) -> impl Iterator<Item = (usize, &ScreenPath)> {
        self.paths
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.owns_id(masked))
    }

    /// Path holding the most votes cast from the given previous-frame
    /// path. Ties keep the first; `None` when no path has any.
    pub fn path_with_most_votes_from(&self, prev_path: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, path) in self.paths.iter().enumerate() {
            let count = path.votes.iter().filter(|v| v.path_index == prev_path).count();
            if count > 0 && best.map_or(true, |(_, bc)| count > bc) {
                best = Some((i, count));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Good group of `path_index` holding the most votes from the given
    /// previous-frame stroke.
    pub fn group_with_most_votes_from(
        &self,
        stroke_id: u32,
        path_index: usize,
    ) -> Option<usize> {
        let path = self.paths.get(path_index)?;
        let mut best: Option<(usize, usize)> = None;
        for (i, g) in path.groups.iter().enumerate() {
            if !g.status.is_good() {
                continue;
            }
            let count = g.votes.iter().filter(|v| v.stroke_id == stroke_id).count();
            if count > 0 && best.map_or(true, |(_, bc)| count > bc) {
                best = Some((i, count));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Path and group indices holding the most votes from the given
    /// previous-frame stroke, across the whole set.
    pub fn find_stroke(&self, stroke_id: u32) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (i, path) in self.paths.iter().enumerate() {
            for (j, g) in path.groups.iter().enumerate() {
                if !g.status.is_good() {
                    continue;
                }
                let count = g.votes.iter().filter(|v| v.stroke_id == stroke_id).count();
                if count > 0 && best.map_or(true, |(_, _, bc)| count > bc) {
                    best = Some((i, j, count));
                }
            }
        }
        best.map(|(i, j, _)| (i, j))
    }

    /// Emit next-frame seeds for every path.
    pub fn generate_seed_samples<S: Surface>(
        &self,
        spacing: f64,
        surface: &S,
        projector: &Projector,
        out: &mut Vec<PathSample>,
    ) {
        for (i, path) in self.paths.iter().enumerate() {
            path.generate_seed_samples(spacing, i, surface, projector, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriMesh;
    use crate::raster::encoding::IdAllocator;
    use crate::types::GroupStatus;
    use nalgebra::Matrix4;

    fn word_at(id: u32, rel: f64, run_len: f64) -> u32 {
        id | encoding::encode_length_byte(rel, run_len)
    }

    /// Straight path along x with one id run of raster length 1.0.
    fn straight_path(id: u32) -> (ScreenPath, RunLengths) {
        let mut path = ScreenPath::new(LineType::Silhouette, Visibility::Visible);
        let mut lengths = RunLengths::new();
        lengths.insert(id, 1.0);
        for k in 0..=10 {
            let rel = k as f64 / 10.0;
            path.add(
                NdcZPoint::new(rel, 0.0, 0.5),
                word_at(id, rel, 1.0),
                None,
                Vector3::zeros(),
                rel,
            );
        }
        path.complete();
        path.build_id_index(&lengths);
        (path, lengths)
    }

    fn fresh_visible_id() -> u32 {
        let mut alloc = IdAllocator::default();
        alloc.reset(7);
        encoding::masked(alloc.fresh(true))
    }

    #[test]
    fn id_index_partitions_the_points() {
        let id_a = fresh_visible_id();
        let id_b = id_a ^ 0x0000_1100;
        let mut lengths = RunLengths::new();
        lengths.insert(id_a, 0.5);
        lengths.insert(id_b, 0.4);
        let mut path = ScreenPath::new(LineType::Crease, Visibility::Visible);
        for k in 0..4 {
            let rel = 0.1 * k as f64;
            path.add(
                NdcZPoint::new(rel, 0.0, 0.5),
                word_at(id_a, rel, 0.5),
                None,
                Vector3::zeros(),
                rel,
            );
        }
        for k in 0..3 {
            let rel = 0.1 * k as f64;
            path.add(
                NdcZPoint::new(0.4 + rel, 0.0, 0.5),
                word_at(id_b, rel, 0.4),
                None,
                Vector3::zeros(),
                rel,
            );
        }
        path.complete();
        path.build_id_index(&lengths);

        assert_eq!(path.id_set(), &[id_a, id_b]);
        assert_eq!(path.id_offsets(), &[0, 4, 7]);
        assert!((path.run_length(0) - 0.5).abs() < 1e-12);
        assert!((path.run_length(1) - 0.4).abs() < 1e-12);
        assert!(path.owns_id(id_a) && path.owns_id(id_b));
        assert!(!path.owns_id(id_a ^ 0x0000_0400));
    }

    #[test]
    fn in_range_follows_the_window_interior() {
        let id = fresh_visible_id();
        let (path, _) = straight_path(id);
        // Interior arc positions resolve, the window boundaries do not.
        assert!(path.in_range(word_at(id, 0.5, 1.0)));
        assert!(!path.in_range(word_at(id, 0.0, 1.0)));
        assert!(!path.in_range(id | 255));
        assert!(!path.in_range(word_at(id ^ 0x0000_3300, 0.5, 1.0)));
    }

    #[test]
    fn wrapped_run_gets_a_second_window() {
        let id = fresh_visible_id();
        let mut lengths = RunLengths::new();
        lengths.insert(id, 0.8);
        let mut path = ScreenPath::new(LineType::Silhouette, Visibility::Visible);
        // Square loop whose identifier run starts at the third corner:
        // run positions wrap from high back to low mid-path.
        let corners = [
            (0.0, 0.0, 0.4),
            (0.2, 0.0, 0.6),
            (0.2, 0.2, 0.0),
            (0.0, 0.2, 0.2),
            (0.0, 0.0, 0.3),
        ];
        for &(x, y, rel) in &corners {
            path.add(
                NdcZPoint::new(x, y, 0.5),
                word_at(id, rel, 0.8),
                None,
                Vector3::zeros(),
                rel,
            );
        }
        path.complete();
        path.build_id_index(&lengths);

        assert!(path.is_closed());
        assert_eq!(path.id_set(), &[id, id]);
        // Tail window starts where run positions drop back down.
        assert_eq!(path.id_offsets(), &[0, 2, 5]);
        // Head window interior is (0.4, 0.6); the closed-loop tail window
        // covers (0.0, 0.4).
        assert!(path.in_range(word_at(id, 0.3, 0.8)));
        assert!(path.in_range(word_at(id, 0.5, 0.8)));
        assert!(!path.in_range(word_at(id, 0.7, 0.8)));
    }

    #[test]
    fn windowed_search_matches_brute_force() {
        let id = fresh_visible_id();
        let (path, _) = straight_path(id);
        let pix_to_ndc = 2.0 / 512.0;
        for k in 1..10 {
            let rel = k as f64 / 10.0;
            let word = word_at(id, rel, 1.0);
            let probe = Vector2::new(rel + 0.003, 0.02);
            let brute = path.closest_point(probe);
            let ranged = path.closest_point_in_id_window(word, probe, pix_to_ndc);
            let (bd, bq, bi) = brute.expect("brute search found a segment");
            let (rd, rq, ri) = ranged.expect("windowed search found a segment");
            assert_eq!(bi, ri);
            assert!((bd - rd).abs() < 1e-12);
            assert!((bq - rq).norm() < 1e-12);
        }
    }

    #[test]
    fn arc_queries_clamp_and_interpolate() {
        let id = fresh_visible_id();
        let (path, _) = straight_path(id);
        assert!((path.length() - 1.0).abs() < 1e-12);
        assert_eq!(path.get_s(0), 0.0);
        assert!((path.get_s(5) - 0.5).abs() < 1e-12);
        assert!((path.get_s(99) - 1.0).abs() < 1e-12);
        for i in 1..path.num_points() {
            assert!(path.get_s(i) > path.get_s(i - 1));
        }
        let mid = path.point_at(0.55);
        assert!((mid.x - 0.55).abs() < 1e-12);
        let t = path.tan(5);
        assert!((t - Vector2::new(1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn votes_past_the_search_reach_are_dropped() {
        let id = fresh_visible_id();
        let (mut path, _) = straight_path(id);
        let mesh = TriMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let projector = Projector::new(Matrix4::identity());
        let hit = Vector2::new(0.5, 0.0);
        let sample_at = |dy: f64| PathSample {
            stroke_id: 3,
            pos: NdcZPoint::new(0.5, dy, 0.5),
            dir: Vector2::new(0.0, -1.0),
            t: 1.25,
            face: None,
            bary: Vector3::zeros(),
            world: Point3::new(0.5, dy, 0.5),
            line_type: LineType::Silhouette,
            vis: Visibility::Visible,
            path_index: 0,
        };

        // With a unit pixel scale the sample's offset along y is its pixel
        // distance. Six steps of reach accept six pixels.
        let landed = path.register_vote(
            &sample_at(6.0),
            Point3::new(0.5, 6.0, 0.5),
            hit,
            5,
            &mesh,
            &projector,
            1.0,
            500.0,
            6,
        );
        assert!(landed, "a vote six pixels out lands");
        assert_eq!(path.votes.len(), 1);
        assert!((path.votes[0].pix_dist - 6.0).abs() < 1e-12);
        assert!((path.votes[0].s - 0.5).abs() < 1e-12);
        assert!((path.votes[0].t - 1.25).abs() < 1e-12);

        // One more pixel is past the reach.
        let landed = path.register_vote(
            &sample_at(7.0),
            Point3::new(0.5, 7.0, 0.5),
            hit,
            5,
            &mesh,
            &projector,
            1.0,
            500.0,
            6,
        );
        assert!(!landed, "a vote seven pixels out is rejected");
        assert_eq!(path.votes.len(), 1);
    }

    #[test]
    fn vote_majorities_pick_the_heaviest_path() {
        let id = fresh_visible_id();
        let (mut a, _) = straight_path(id);
        let (mut b, _) = straight_path(id);
        let vote = |prev: usize| ParamVote {
            s: 0.1,
            t: 0.0,
            confidence: 1.0,
            status: VoteStatus::Good,
            path_index: prev,
            stroke_id: 9,
            pix_dist: 0.0,
            world_dist: 0.0,
        };
        a.votes = vec![vote(3)];
        b.votes = vec![vote(3), vote(3), vote(5)];
        let set = PathSet {
            paths: vec![a, b],
            ..Default::default()
        };
        assert_eq!(set.path_with_most_votes_from(3), Some(1));
        assert_eq!(set.path_with_most_votes_from(5), Some(1));
        assert_eq!(set.path_with_most_votes_from(8), None);
    }

    #[test]
    fn stroke_lookups_only_count_good_groups() {
        let id = fresh_visible_id();
        let (mut a, _) = straight_path(id);
        let (mut b, _) = straight_path(id);
        let vote = |stroke: u32| ParamVote {
            s: 0.1,
            t: 0.0,
            confidence: 1.0,
            status: VoteStatus::Good,
            path_index: 0,
            stroke_id: stroke,
            pix_dist: 0.0,
            world_dist: 0.0,
        };

        let mut heavy = VoteGroup::new(100);
        heavy.votes = vec![vote(9), vote(9)];
        let mut demoted = VoteGroup::new(101);
        demoted.votes = vec![vote(9), vote(9), vote(9)];
        demoted.status = GroupStatus::LowLength;
        a.groups = vec![demoted, heavy];

        let mut light = VoteGroup::new(102);
        light.votes = vec![vote(9), vote(4)];
        b.groups = vec![light];

        let set = PathSet {
            paths: vec![a, b],
            ..Default::default()
        };
        // The demoted group never wins despite holding the most votes.
        assert_eq!(set.group_with_most_votes_from(9, 0), Some(1));
        assert_eq!(set.group_with_most_votes_from(4, 0), None);
        assert_eq!(set.group_with_most_votes_from(9, 7), None);
        assert_eq!(set.find_stroke(9), Some((0, 1)));
        assert_eq!(set.find_stroke(4), Some((1, 0)));
        assert_eq!(set.find_stroke(77), None);
    }
}
