//! Grouping classified segments into screen paths.
//!
//! A path is a maximal stretch of connected segments sharing one line type
//! and one visibility class. The break sentinel that closes each run still
//! carries the run's last position, so it is read into the path without
//! being consumed as a run member.

use crate::clip::ScreenSegment;
use crate::tracker::flags::RenderFlags;
use crate::types::{Visibility, VisibilityMode};
use crate::visibility::RunLengths;

use super::{PathSet, ScreenPath};

/// Flip break flags whose endpoints come within `gap_pix` pixels, so one
/// silhouette does not shatter into confetti runs at mesh-resolution
/// seams. Only same-type neighbors join; a bridged run must stay one
/// line type for id assignment.
pub fn join_small_breaks(segs: &mut [ScreenSegment], gap_pix: f64, pix_to_ndc: f64) {
    if segs.len() < 2 {
        return;
    }
    let gap = gap_pix * pix_to_ndc;
    for i in 0..segs.len() - 1 {
        if !segs[i].is_edge
            && segs[i].line_type == segs[i + 1].line_type
            && segs[i].pos.planar_dist(&segs[i + 1].pos) < gap
        {
            segs[i].is_edge = true;
        }
    }
}

/// Assemble the classified stream into paths, keeping only the type and
/// visibility combinations the render flags pass.
///
/// Hidden and occluded paths read their id words from the hidden raster
/// channel; visible paths read the visible channel. A chain that changes
/// visibility mid-run splits there, with the transition segment starting
/// the next path. `long_paths` (single channel only) suppresses those
/// splits instead: the whole chain becomes one visible-tagged path,
/// occluded stretches included. Paths that end up with fewer than two
/// points are dropped before indexing.
pub fn assemble_paths(
    segs: &[ScreenSegment],
    flags: &RenderFlags,
    mode: VisibilityMode,
    run_lengths: &RunLengths,
    long_paths: bool,
) -> PathSet {
    let long = long_paths && mode == VisibilityMode::SingleChannel;
    let mut set = PathSet::default();
    let n = segs.len();
    let mut i = 0usize;
    while i < n {
        while i < n && !starts_path(&segs[i], flags, mode, long) {
            i += 1;
        }
        if i >= n {
            break;
        }

        let vis = if long { Visibility::Visible } else { segs[i].vis };
        let mut path = ScreenPath::new(segs[i].line_type, vis);
        let visible = path.vis == Visibility::Visible;
        while i < n && segs[i].is_edge && (long || segs[i].vis == path.vis) {
            debug_assert_eq!(segs[i].line_type, path.line_type);
            let word = if visible { segs[i].id } else { segs[i].hidden_id };
            path.add(segs[i].pos, word, segs[i].face, segs[i].bary, segs[i].rel_len);
            i += 1;
        }
        if i < n
            && (long || segs[i].vis == path.vis)
            && (visible || segs[i].line_type == path.line_type)
        {
            if visible {
                debug_assert_eq!(segs[i].line_type, path.line_type);
            }
            // The closing sentinel; read but not consumed, since the next
            // run may start on it.
            let word = if visible { segs[i].id } else { segs[i].hidden_id };
            path.add(segs[i].pos, word, segs[i].face, segs[i].bary, segs[i].rel_len);
        }
        path.complete();
        if path.num_points() > 1 {
            path.build_id_index(run_lengths);
            set.paths.push(path);
        }
        // A break sentinel is spent; a visibility-flip segment is not,
        // since it opens the next path.
        if i < n && !segs[i].is_edge {
            i += 1;
        }
    }
    set
}

fn starts_path(
    seg: &ScreenSegment,
    flags: &RenderFlags,
    mode: VisibilityMode,
    long: bool,
) -> bool {
    if long {
        seg.is_edge && flags.renders(seg.line_type, Visibility::Visible, mode)
    } else {
        flags.renders(seg.line_type, seg.vis, mode)
    }
}
