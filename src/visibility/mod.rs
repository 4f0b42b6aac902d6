//! Identifier assignment, raster passes, and per-sample visibility
//! classification.
//!
//! Every maximal drawable stretch of a clipped run (an identifier run)
//! gets a fresh id; each point encodes its arclength within the stretch
//! into the id word's low byte. The raster then answers "which stretch,
//! where along it" at any pixel, and classification reads that answer
//! back near each sample.
//!
//! In dual-channel mode hidden-channel ids draw first without depth
//! testing, then visible-channel ids draw depth tested on top. A sample
//! finds its visible id where the stretch won the depth test, its hidden
//! id where scenery covered it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clip::ScreenSegment;
use crate::raster::encoding::{self, IdAllocator};
use crate::raster::IdBuffer;
use crate::tracker::flags::RenderFlags;
use crate::types::{LineType, Visibility, VisibilityMode};

/// Box half-widths, in pixels, for the classification searches.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRadii {
    pub visible: i32,
    pub hidden: i32,
}

impl SearchRadii {
    pub fn for_mode(mode: VisibilityMode) -> Self {
        match mode {
            VisibilityMode::DualChannel => Self {
                visible: 2,
                hidden: 2,
            },
            VisibilityMode::SingleChannel => Self {
                visible: 1,
                hidden: 2,
            },
        }
    }
}

/// NDC lengths of every identifier run this frame, keyed by masked id.
pub type RunLengths = HashMap<u32, f64>;

/// Assign identifier words to every drawable stretch.
pub fn assign_ids(
    segs: &mut [ScreenSegment],
    flags: &RenderFlags,
    mode: VisibilityMode,
    alloc: &mut IdAllocator,
    run_lengths: &mut RunLengths,
) {
    match mode {
        VisibilityMode::DualChannel => {
            assign_channel(segs, alloc, run_lengths, false, |t| {
                flags.draws_hidden_channel(t, mode)
            });
            assign_channel(segs, alloc, run_lengths, true, |t| {
                flags.draws_visible_channel(t, mode)
            });
        }
        VisibilityMode::SingleChannel => assign_single(segs, flags, alloc, run_lengths),
    }
}

fn close_stretch(
    window: &mut [ScreenSegment],
    alloc: &mut IdAllocator,
    run_lengths: &mut RunLengths,
    visible: bool,
) {
    let id = alloc.fresh(visible);
    let start_len = window[0].len;
    let run_len = window[window.len() - 1].len - start_len;
    for seg in window.iter_mut() {
        let rel = seg.len - start_len;
        seg.rel_len = rel;
        let word = id | encoding::encode_length_byte(rel, run_len);
        if visible {
            seg.id = word;
        } else {
            seg.hidden_id = word;
        }
    }
    run_lengths.insert(encoding::masked(id), run_len);
}

fn assign_channel(
    segs: &mut [ScreenSegment],
    alloc: &mut IdAllocator,
    run_lengths: &mut RunLengths,
    visible: bool,
    type_gate: impl Fn(LineType) -> bool,
) {
    let mut started = false;
    let mut start = 0usize;
    for i in 0..segs.len() {
        debug_assert_eq!(segs[i].vis, Visibility::Visible);
        if !started && segs[i].is_edge && type_gate(segs[i].line_type) {
            started = true;
            start = i;
        }
        if started && !segs[i].is_edge {
            close_stretch(&mut segs[start..=i], alloc, run_lengths, visible);
            started = false;
        }
    }
}

/// Single-channel stretches end where the run breaks or turns backfacing;
/// the first backfacing point still belongs to the stretch, since its
/// span from the last visible point is drawn.
fn assign_single(
    segs: &mut [ScreenSegment],
    flags: &RenderFlags,
    alloc: &mut IdAllocator,
    run_lengths: &mut RunLengths,
) {
    let n = segs.len();
    let mut started = false;
    let mut start = 0usize;
    let mut end = 0usize;
    for i in 0..n {
        let vis = segs[i].vis == Visibility::Visible;
        if vis {
            if !started && flags.draws_visible_channel(segs[i].line_type, VisibilityMode::SingleChannel)
            {
                started = true;
                start = i;
            }
            end = i;
        }

        if started && !segs[i].is_edge {
            close_stretch(&mut segs[start..=end], alloc, run_lengths, true);
            started = false;
        } else if started && i + 1 < n && segs[i + 1].vis != Visibility::Visible {
            end = i + 1;
            close_stretch(&mut segs[start..=end], alloc, run_lengths, true);
            started = false;
        }
    }
}

/// Draw assigned words into the id buffer.
pub fn rasterize(buffer: &mut IdBuffer, segs: &[ScreenSegment], mode: VisibilityMode) {
    if mode == VisibilityMode::DualChannel {
        for pair in segs.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.is_edge
                && a.hidden_id != 0
                && b.hidden_id != 0
                && encoding::masked(a.hidden_id) == encoding::masked(b.hidden_id)
            {
                buffer.draw_segment(&a.pos, &b.pos, a.hidden_id, b.hidden_id, false);
            }
        }
    }
    for pair in segs.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.is_edge
            && a.id != 0
            && b.id != 0
            && encoding::masked(a.id) == encoding::masked(b.id)
        {
            buffer.draw_segment(&a.pos, &b.pos, a.id, b.id, true);
        }
    }
}

/// Length-byte tolerance for a box search: short runs step their byte
/// quickly per pixel, so the allowance widens as the run shrinks.
pub fn byte_tolerance(pix_run_len: f64) -> i32 {
    let t = (2.0 * (256.0 / pix_run_len.max(1e-9)).max(2.0)).ceil();
    t.min(255.0) as i32
}

/// Classify every segment by reading the raster back around it.
pub fn classify(
    segs: &mut [ScreenSegment],
    buffer: &IdBuffer,
    mode: VisibilityMode,
    run_lengths: &RunLengths,
    radii: SearchRadii,
) {
    let ndc_to_pix = 1.0 / buffer.pix_to_ndc_scale();
    for seg in segs.iter_mut() {
        classify_one(seg, buffer, mode, run_lengths, radii, ndc_to_pix);
    }
}

pub fn classify_one(
    seg: &mut ScreenSegment,
    buffer: &IdBuffer,
    mode: VisibilityMode,
    run_lengths: &RunLengths,
    radii: SearchRadii,
    ndc_to_pix: f64,
) {
    let center = buffer.ndc_to_pix(&seg.pos);
    let tol = |word: u32| -> Option<i32> {
        run_lengths
            .get(&encoding::masked(word))
            .map(|len| byte_tolerance(len * ndc_to_pix))
    };

    match mode {
        VisibilityMode::DualChannel => {
            seg.vis = Visibility::Occluded;
            if encoding::is_path_id(seg.id) && encoding::is_visible_id(seg.id) {
                if let Some(nbr) = tol(seg.id) {
                    if buffer.find_masked_in_box(center, seg.id, nbr, radii.visible) {
                        seg.vis = Visibility::Visible;
                    }
                }
            }
            if seg.vis != Visibility::Visible
                && encoding::is_path_id(seg.hidden_id)
                && !encoding::is_visible_id(seg.hidden_id)
            {
                if let Some(nbr) = tol(seg.hidden_id) {
                    if buffer.find_masked_in_box(center, seg.hidden_id, nbr, radii.hidden) {
                        seg.vis = Visibility::Hidden;
                    }
                }
            }
        }
        VisibilityMode::SingleChannel => {
            // Backfacing stays backfacing; visible points either confirm
            // against the raster or demote to occluded.
            if seg.vis == Visibility::Visible {
                let confirmed = encoding::is_path_id(seg.id)
                    && tol(seg.id)
                        .is_some_and(|nbr| buffer.find_masked_in_box(center, seg.id, nbr, radii.visible));
                seg.vis = if confirmed {
                    Visibility::Visible
                } else {
                    Visibility::Occluded
                };
            }
        }
    }
}
