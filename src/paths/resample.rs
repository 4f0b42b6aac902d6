//! Arc-length resampling of classified runs.
//!
//! The clipped reference stream keeps every mesh crossing; tracking wants
//! roughly even spacing instead. Each unbroken run is rewalked, dropping
//! points that bunch below the sampling distance and synthesizing interior
//! points across sparse spans. Synthesized points re-encode their id word
//! from their arc position, so the raster mapping stays consistent.

use nalgebra::{Point3, Vector3};

use crate::clip::ScreenSegment;
use crate::geometry::Projector;
use crate::mesh::Surface;
use crate::raster::encoding;
use crate::types::{Visibility, VisibilityMode};
use crate::visibility::RunLengths;

/// Planar distance below which a run's tail point counts as a repeat of
/// the last emitted sample.
const COINCIDENT_EPS: f64 = 1e-8;

/// Resample every run of `ref_segs` to the visibility sampling distance.
///
/// Dual-channel runs are subdivided unconditionally (both channel words
/// span whole runs); single-channel spans are subdivided only where at
/// least one endpoint stayed visible and both share an id, since occluded
/// stretches carry no usable raster ids.
pub fn resample<S: Surface>(
    ref_segs: &[ScreenSegment],
    mode: VisibilityMode,
    vis_sampling: f64,
    pix_to_ndc: f64,
    run_lengths: &RunLengths,
    surface: &S,
    projector: &Projector,
) -> Vec<ScreenSegment> {
    let sample_scale = vis_sampling * pix_to_ndc;
    let n = ref_segs.len();
    let mut out: Vec<ScreenSegment> = Vec::with_capacity(n);

    let mut loop_begin = 0usize;
    while loop_begin < n {
        if mode == VisibilityMode::DualChannel {
            debug_assert!(ref_segs[loop_begin].is_edge);
        }
        // The run ends on its first break sentinel, which is emitted too.
        let mut loop_end = loop_begin;
        while loop_end + 1 < n {
            loop_end += 1;
            if !ref_segs[loop_end].is_edge {
                break;
            }
            if mode == VisibilityMode::DualChannel {
                debug_assert_eq!(
                    ref_segs[loop_end].line_type,
                    ref_segs[loop_begin].line_type
                );
            }
        }

        let mut last = loop_begin;
        for i in loop_begin..=loop_end {
            let dist_from_last = ref_segs[i].pos.planar_dist(&ref_segs[last].pos);
            let sections = (dist_from_last / sample_scale).floor() as usize;
            if !(sections > 0 || i == loop_begin || i == loop_end) {
                continue;
            }

            if i != loop_begin {
                let prev = &ref_segs[i - 1];
                let cur = &ref_segs[i];
                match mode {
                    VisibilityMode::DualChannel => {
                        subdivide_dual(prev, cur, sections, run_lengths, surface, projector, &mut out)
                    }
                    VisibilityMode::SingleChannel => {
                        subdivide_single(prev, cur, sections, run_lengths, surface, projector, &mut out)
                    }
                }
            }

            if i == loop_end && i != loop_begin && dist_from_last <= COINCIDENT_EPS {
                // The tail repeats the last sample; keep the tail instead,
                // since its break flag closes the run. A run that never got
                // past its first point vanishes entirely.
                out.pop();
                if last != loop_begin {
                    out.push(ref_segs[loop_end]);
                }
            } else {
                out.push(ref_segs[i]);
                last = i;
            }
        }

        loop_begin = loop_end + 1;
    }
    out
}

/// Re-encode a channel word at a new arc position within its run.
fn reencode(word: u32, rel_len: f64, run_lengths: &RunLengths) -> u32 {
    let masked = encoding::masked(word);
    if masked == 0 {
        return 0;
    }
    let run_len = run_lengths.get(&masked).copied().unwrap_or(0.0);
    masked | encoding::encode_length_byte(rel_len, run_len)
}

/// Barycentric attribution for a synthesized point, projected onto the
/// preceding sample's face.
fn attribute<S: Surface>(
    prev: &ScreenSegment,
    world: &Point3<f64>,
    surface: &S,
) -> Vector3<f64> {
    prev.face
        .and_then(|f| surface.resolve(f))
        .map(|fidx| surface.project_barycentric(fidx, world))
        .unwrap_or(prev.bary)
}

/// Interior points for a sparse dual-channel span: interpolate in object
/// space and reproject, so synthesized points sit on the surface's chord
/// rather than the screen chord.
fn subdivide_dual<S: Surface>(
    prev: &ScreenSegment,
    cur: &ScreenSegment,
    sections: usize,
    run_lengths: &RunLengths,
    surface: &S,
    projector: &Projector,
    out: &mut Vec<ScreenSegment>,
) {
    debug_assert_eq!(encoding::masked(prev.id), encoding::masked(cur.id));
    debug_assert_eq!(
        encoding::masked(prev.hidden_id),
        encoding::masked(cur.hidden_id)
    );
    let p_gap = cur.rel_len - prev.rel_len;
    for j in 1..sections {
        let w = j as f64 / sections as f64;
        let world = prev.world + (cur.world - prev.world) * w;
        let Some(pos) = projector.project(&world) else {
            continue;
        };
        let p_diff = pos.planar_dist(&prev.pos).min(p_gap).max(0.0);
        let rel_len = prev.rel_len + p_diff;
        out.push(ScreenSegment {
            pos,
            is_edge: true,
            vis: Visibility::Visible,
            id: reencode(cur.id, rel_len, run_lengths),
            hidden_id: reencode(cur.hidden_id, rel_len, run_lengths),
            face: prev.face,
            bary: attribute(prev, &world, surface),
            world,
            len: prev.len + (cur.len - prev.len) * w,
            rel_len,
            line_type: cur.line_type,
        });
    }
}

/// Interior points for a sparse single-channel span: interpolate on
/// screen and recover the object position by unprojection.
fn subdivide_single<S: Surface>(
    prev: &ScreenSegment,
    cur: &ScreenSegment,
    sections: usize,
    run_lengths: &RunLengths,
    surface: &S,
    projector: &Projector,
    out: &mut Vec<ScreenSegment>,
) {
    let either_visible =
        prev.vis == Visibility::Visible || cur.vis == Visibility::Visible;
    if !either_visible || encoding::masked(prev.id) != encoding::masked(cur.id) {
        return;
    }
    for j in 1..sections {
        let w = j as f64 / sections as f64;
        let pos = prev.pos.lerp(&cur.pos, w);
        let Some(world) = projector.unproject(&pos) else {
            continue;
        };
        let rel_len = prev.rel_len + (cur.rel_len - prev.rel_len) * w;
        out.push(ScreenSegment {
            pos,
            is_edge: true,
            vis: Visibility::Visible,
            id: reencode(cur.id, rel_len, run_lengths),
            hidden_id: 0,
            face: prev.face,
            bary: attribute(prev, &world, surface),
            world,
            len: prev.len + (cur.len - prev.len) * w,
            rel_len,
            line_type: prev.line_type,
        });
    }
}
