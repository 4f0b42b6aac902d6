//! Cross-frame parameter propagation.
//!
//! Seed samples generated at the end of the previous frame ride the mesh
//! into the current one. Each sample is reprojected through the current
//! transform and marched along its screen-space normal through the id
//! raster, one reference pixel per step, until it reads a word owned by
//! one of this frame's paths. The nearest owning path receives the
//! sample's carried parameter as a vote at the hit point; the group
//! pipeline later clusters and fits those votes per stroke.
//!
//! The search phase only reads shared state, so samples run in parallel;
//! votes are then registered serially in sample order.

use nalgebra::{Point3, Vector2};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{Projector, Viewport};
use crate::mesh::Surface;
use crate::paths::{PathSet, ScreenPath};
use crate::raster::{encoding, IdBuffer};
use crate::types::{LineType, PathSample, Visibility, VisibilityMode};

/// Steps after which a background read aborts the march. The march crawls
/// from the mesh interior toward a silhouette, so background this far out
/// means there is nothing left to find; closer in, the sample may simply
/// sit over empty pixels beside its own line.
const AIR_BALL_STEPS: usize = 2;

/// Pixel neighborhood probed at the sample's starting position.
const BOX_OFFSETS: [(i64, i64); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropagationParams {
    /// Search length along the sample normal, in reference pixels.
    pub max_steps: usize,
    /// Probe a single pixel instead of a 3x3 box at the starting position.
    pub no_box_check: bool,
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            max_steps: 6,
            no_box_check: false,
        }
    }
}

/// Outcome counts for one propagation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationReport {
    pub samples: usize,
    /// Expired before the search: stale face, out of frustum, or a
    /// degenerate screen normal.
    pub culled: usize,
    /// Searched but found no line, or found one too far away to trust.
    pub missed: usize,
    pub voted: usize,
}

struct SampleHit {
    path: usize,
    /// Screen point on the receiving path where the sample landed.
    point: Vector2<f64>,
    /// Segment index of the hit.
    segment: usize,
    /// The sample's surface position this frame, for the distance gate.
    world: Point3<f64>,
}

enum Outcome {
    Culled,
    Missed,
    Hit(SampleHit),
}

/// Carry every sample's parameter onto this frame's paths as votes.
///
/// Existing votes are cleared first, so a pass with no samples (the first
/// frame, or after a tracking reset) leaves the paths voteless rather
/// than stale.
#[allow(clippy::too_many_arguments)]
pub fn propagate_parameterization<S: Surface + Sync>(
    samples: &[PathSample],
    paths: &mut PathSet,
    buffer: &IdBuffer,
    surface: &S,
    projector: &Projector,
    viewport: &Viewport,
    mode: VisibilityMode,
    mesh_pixels: f64,
    params: &PropagationParams,
) -> PropagationReport {
    paths.reset_votes();
    let mut report = PropagationReport {
        samples: samples.len(),
        ..PropagationReport::default()
    };
    if samples.is_empty() {
        return report;
    }

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Outcome> = {
        let paths = &*paths;
        samples
            .par_iter()
            .map(|s| search_sample(s, paths, buffer, surface, projector, viewport, mode, params))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Outcome> = {
        let paths = &*paths;
        samples
            .iter()
            .map(|s| search_sample(s, paths, buffer, surface, projector, viewport, mode, params))
            .collect()
    };

    let ndc_to_pix = viewport.ndc_to_pix_scale();
    for (sample, outcome) in samples.iter().zip(outcomes) {
        match outcome {
            Outcome::Culled => report.culled += 1,
            Outcome::Missed => report.missed += 1,
            Outcome::Hit(hit) => {
                let landed = paths.paths[hit.path].register_vote(
                    sample,
                    hit.world,
                    hit.point,
                    hit.segment,
                    surface,
                    projector,
                    ndc_to_pix,
                    mesh_pixels,
                    params.max_steps,
                );
                if landed {
                    report.voted += 1;
                } else {
                    report.missed += 1;
                }
            }
        }
    }
    if report.missed > 3 {
        log::debug!(
            "propagation missed {} of {} samples",
            report.missed,
            report.samples
        );
    }
    report
}

#[allow(clippy::too_many_arguments)]
fn search_sample<S: Surface>(
    sample: &PathSample,
    paths: &PathSet,
    buffer: &IdBuffer,
    surface: &S,
    projector: &Projector,
    viewport: &Viewport,
    mode: VisibilityMode,
    params: &PropagationParams,
) -> Outcome {
    // The sample rides its face; if topology changed underneath, it has
    // expired.
    let Some(face) = sample.face.and_then(|f| surface.resolve(f)) else {
        return Outcome::Culled;
    };
    let world = surface.barycentric_position(face, &sample.bary);
    let Some(p) = projector.project(&world) else {
        return Outcome::Culled;
    };
    if !viewport.in_frustum(&p) {
        return Outcome::Culled;
    }

    let normal = surface.barycentric_normal(face, &sample.bary);
    let screen_n = projector.screen_vector(&world, &normal);
    let norm = screen_n.norm();
    if norm <= f64::EPSILON {
        return Outcome::Culled;
    }
    let step = buffer.pix_to_ndc_scale();
    let mut delt = screen_n * (step / norm);
    if sample.line_type == LineType::BackfacingSilhouette {
        // Backfacing silhouettes sit just past the limb; search inward.
        delt = -delt;
    }

    let mut fitting: Vec<u32> = Vec::new();
    let mut candidates: Vec<(usize, u32)> = Vec::new();
    let mut cur = p.planar();
    let mut word = 0u32;
    let mut j = 0usize;
    while j < params.max_steps && candidates.is_empty() {
        cur = p.planar() + delt * j as f64;
        let (cx, cy) = buffer.ndc_to_pix(&p.offset(delt * j as f64));
        if j == 0 && !params.no_box_check {
            for (dx, dy) in BOX_OFFSETS {
                word = buffer.read(cx + dx, cy + dy);
                if word_fits(word, sample.vis, mode) && !fitting.contains(&word) {
                    fitting.push(word);
                }
            }
        } else {
            word = buffer.read(cx, cy);
            if word_fits(word, sample.vis, mode) && !fitting.contains(&word) {
                fitting.push(word);
            }
        }

        for &w in &fitting {
            for (i, path) in paths.paths_owning(encoding::masked(w)) {
                if matches_path(sample, path, mode) && path.in_range(w) {
                    candidates.push((i, w));
                }
            }
        }
        // Words that fit the sample but match no path never will; drop
        // them instead of rescanning every step.
        if candidates.is_empty() {
            fitting.clear();
        }
        if j > AIR_BALL_STEPS && word == 0 {
            break;
        }
        j += 1;
    }

    if candidates.is_empty() {
        return Outcome::Missed;
    }

    let pix_to_ndc = buffer.pix_to_ndc_scale();
    let mut best: Option<(f64, SampleHit)> = None;
    for (i, w) in candidates {
        let Some((dist, point, segment)) =
            paths.paths[i].closest_point_in_id_window(w, cur, pix_to_ndc)
        else {
            continue;
        };
        if best.as_ref().map_or(true, |(bd, _)| dist < *bd) {
            best = Some((
                dist,
                SampleHit {
                    path: i,
                    point,
                    segment,
                    world,
                },
            ));
        }
    }
    match best {
        Some((_, hit)) => Outcome::Hit(hit),
        None => Outcome::Missed,
    }
}

/// Raster words a sample may match: its own channel family in dual mode,
/// any path word in single-channel mode.
fn word_fits(word: u32, vis: Visibility, mode: VisibilityMode) -> bool {
    if !encoding::is_path_id(word) {
        return false;
    }
    match mode {
        VisibilityMode::DualChannel => {
            (vis == Visibility::Visible) == encoding::is_visible_id(word)
        }
        VisibilityMode::SingleChannel => true,
    }
}

/// Dual-channel candidates must come from the sample's own line type and
/// visibility; the single-channel raster carries no such distinction.
fn matches_path(sample: &PathSample, path: &ScreenPath, mode: VisibilityMode) -> bool {
    match mode {
        VisibilityMode::DualChannel => {
            sample.line_type == path.line_type && sample.vis == path.vis
        }
        VisibilityMode::SingleChannel => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NdcZPoint;
    use crate::mesh::TriMesh;
    use crate::raster::encoding::IdAllocator;
    use crate::types::VoteStatus;
    use crate::visibility::RunLengths;
    use nalgebra::{Matrix4, Vector3};

    fn fresh_id(visible: bool) -> u32 {
        let mut alloc = IdAllocator::default();
        alloc.reset(1);
        alloc.fresh(visible)
    }

    /// Horizontal path along y = 0 with x in [-0.5, 0.5], one id run of
    /// raster length 1.
    fn tracked_path(id: u32, line_type: LineType) -> ScreenPath {
        let mut path = ScreenPath::new(line_type, Visibility::Visible);
        let mut lengths = RunLengths::new();
        lengths.insert(encoding::masked(id), 1.0);
        for k in 0..=10 {
            let rel = k as f64 / 10.0;
            path.add(
                NdcZPoint::new(rel - 0.5, 0.0, 0.5),
                id | encoding::encode_length_byte(rel, 1.0),
                None,
                Vector3::zeros(),
                rel,
            );
        }
        path.complete();
        path.build_id_index(&lengths);
        path
    }

    fn raster_with(path: &ScreenPath, viewport: &Viewport) -> IdBuffer {
        let mut buffer = IdBuffer::new(viewport.width() as usize, viewport.height() as usize);
        buffer.begin_frame(viewport);
        for k in 0..path.num_points() - 1 {
            buffer.draw_segment(&path.point(k), &path.point(k + 1), path.id(k), path.id(k + 1), true);
        }
        buffer
    }

    /// One-quad slab in the x-z plane at height `y`; winding points the
    /// normals toward -y when `down` is set.
    fn slab(y: f64, down: bool) -> TriMesh {
        let positions = vec![
            Point3::new(-1.0, y, 0.0),
            Point3::new(1.0, y, 0.0),
            Point3::new(1.0, y, 1.0),
            Point3::new(-1.0, y, 1.0),
        ];
        let triangles = if down {
            vec![[0, 1, 2], [0, 2, 3]]
        } else {
            vec![[0, 2, 1], [0, 3, 2]]
        };
        TriMesh::new(positions, triangles)
    }

    fn sample_on(
        mesh: &TriMesh,
        world: Point3<f64>,
        stroke_id: u32,
        t: f64,
        line_type: LineType,
        vis: Visibility,
    ) -> PathSample {
        PathSample {
            stroke_id,
            pos: NdcZPoint::new(world.x, world.y, world.z),
            dir: Vector2::new(0.0, -1.0),
            t,
            face: Some(mesh.face_ref(0)),
            bary: mesh.project_barycentric(0, &world),
            world,
            line_type,
            vis,
            path_index: 3,
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(64, 64, Point3::new(0.0, 0.0, 5.0))
    }

    #[test]
    fn a_sample_marches_onto_the_line_and_votes() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::Silhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        let mesh = slab(0.06, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        let sample = sample_on(
            &mesh,
            Point3::new(0.0, 0.06, 0.5),
            77,
            4.2,
            LineType::Silhouette,
            Visibility::Visible,
        );

        let report = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );

        assert_eq!(report.voted, 1);
        assert_eq!(report.missed, 0);
        let vote = paths.paths[0].votes[0];
        // Sample sits directly above the path midpoint.
        assert!((vote.s - 0.5).abs() < 1e-9);
        assert_eq!(vote.t, 4.2);
        assert_eq!(vote.stroke_id, 77);
        assert_eq!(vote.path_index, 3);
        assert_eq!(vote.status, VoteStatus::Good);
        assert!((vote.pix_dist - 0.06 * vp.ndc_to_pix_scale()).abs() < 1e-9);
        assert!((vote.world_dist - 0.06).abs() < 1e-9);
    }

    #[test]
    fn a_sample_too_far_from_any_line_misses() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::Silhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        // Over 6 pixels above the line: the march reads background past
        // the air-ball threshold and gives up.
        let mesh = slab(0.2, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        let sample = sample_on(
            &mesh,
            Point3::new(0.0, 0.2, 0.5),
            77,
            1.0,
            LineType::Silhouette,
            Visibility::Visible,
        );

        let report = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );

        assert_eq!(report.missed, 1);
        assert_eq!(report.voted, 0);
        assert!(paths.paths[0].votes.is_empty());
    }

    #[test]
    fn backfacing_silhouette_samples_search_against_their_normal() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::BackfacingSilhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        // The slab normal points -y, away from the line above it; the
        // backfacing rule flips the march back toward the line.
        let mesh = slab(-0.12, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        let sample = sample_on(
            &mesh,
            Point3::new(0.0, -0.12, 0.5),
            9,
            2.0,
            LineType::BackfacingSilhouette,
            Visibility::Visible,
        );

        let report = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );

        assert_eq!(report.voted, 1);
        assert!((paths.paths[0].votes[0].s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn channel_mismatch_blocks_dual_but_not_single() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::Silhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        let mesh = slab(0.06, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        // A hidden-line sample over a visible-channel raster word.
        let sample = sample_on(
            &mesh,
            Point3::new(0.0, 0.06, 0.5),
            5,
            1.5,
            LineType::Silhouette,
            Visibility::Hidden,
        );

        let dual = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );
        assert_eq!(dual.voted, 0);
        assert_eq!(dual.missed, 1);

        let single = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::SingleChannel,
            1.0,
            &PropagationParams::default(),
        );
        assert_eq!(single.voted, 1);
        assert_eq!(paths.paths[0].votes.len(), 1);
    }

    #[test]
    fn stale_faces_expire_their_samples() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::Silhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        let mut mesh = slab(0.06, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        let sample = sample_on(
            &mesh,
            Point3::new(0.0, 0.06, 0.5),
            77,
            4.2,
            LineType::Silhouette,
            Visibility::Visible,
        );
        mesh.bump_generation();

        let report = propagate_parameterization(
            &[sample],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );

        assert_eq!(report.culled, 1);
        assert_eq!(report.voted, 0);
        assert!(paths.paths[0].votes.is_empty());
    }

    #[test]
    fn an_empty_sample_list_only_clears_votes() {
        let id = fresh_id(true);
        let path = tracked_path(id, LineType::Silhouette);
        let vp = viewport();
        let buffer = raster_with(&path, &vp);
        let mesh = slab(0.06, true);
        let projector = Projector::new(Matrix4::identity());
        let mut paths = PathSet::default();
        paths.paths.push(path);
        paths.paths[0].votes.push(crate::types::ParamVote {
            s: 0.1,
            t: 0.2,
            confidence: 1.0,
            status: VoteStatus::Good,
            path_index: 0,
            stroke_id: 1,
            pix_dist: 0.0,
            world_dist: 0.0,
        });

        let report = propagate_parameterization(
            &[],
            &mut paths,
            &buffer,
            &mesh,
            &projector,
            &vp,
            VisibilityMode::DualChannel,
            1.0,
            &PropagationParams::default(),
        );

        assert_eq!(report.samples, 0);
        assert_eq!(report.voted, 0);
        assert!(paths.paths[0].votes.is_empty());
    }
}
