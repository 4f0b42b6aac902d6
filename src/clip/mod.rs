//! Frustum clipping of raw line runs into screen-space segments.
//!
//! Runs are projected to NDC and cut against the viewport slab; planar
//! arclength accumulates only inside the frustum so it restarts from zero
//! at every entry. Closed silhouette loops additionally get their seam
//! relocated to a natural break so arclength zero does not sit at an
//! arbitrary point of the loop.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::extract::RawSegment;
use crate::geometry::{NdcZPoint, Projector, Viewport};
use crate::mesh::{FaceRef, Surface};
use crate::types::{LineType, Visibility, VisibilityMode};

/// One clipped on-screen point. The `is_edge` flag marks the span from
/// this point to the next as drawable; the final point of a run never
/// carries it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScreenSegment {
    pub pos: NdcZPoint,
    pub is_edge: bool,
    pub vis: Visibility,
    /// Identifier drawn into the visible channel, zero until assigned.
    pub id: u32,
    /// Identifier drawn into the hidden channel, zero until assigned.
    pub hidden_id: u32,
    pub face: Option<FaceRef>,
    pub bary: Vector3<f64>,
    pub world: Point3<f64>,
    /// Planar arclength from the run's frustum entry.
    pub len: f64,
    /// Planar arclength from the start of this point's identifier run.
    pub rel_len: f64,
    pub line_type: LineType,
}

/// Seam relocation choice for closed loops with no natural break.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeamFallback {
    /// Break at the leftmost screen point.
    #[default]
    MinX,
    /// Break at the bottom screen point.
    MinY,
}

#[derive(Clone, Copy, Debug)]
pub struct ClipOptions {
    pub mode: VisibilityMode,
    pub repair_loop_seams: bool,
    pub seam_fallback: Option<SeamFallback>,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            mode: VisibilityMode::default(),
            repair_loop_seams: true,
            seam_fallback: Some(SeamFallback::MinX),
        }
    }
}

/// Clip raw runs against the frustum, appending screen segments to `out`.
///
/// In dual-channel mode every point seeds `Visible` (the raster pass
/// reclassifies); in single-channel mode visibility seeds from the facing
/// flag so backfacing stretches never rasterize.
pub fn clip_to_frustum<S: Surface>(
    surface: &S,
    raw: &[RawSegment],
    projector: &Projector,
    viewport: &Viewport,
    options: &ClipOptions,
    out: &mut Vec<ScreenSegment>,
) {
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

        let ref_start = out.len();
        clip_run(surface, raw, run_start, run_end, projector, viewport, options.mode, out);
        if options.repair_loop_seams {
            repair_loop_seam(out, ref_start, options.mode, options.seam_fallback);
        }

        run_start = run_end + 1;
    }
}

fn seed_vis(seg: &RawSegment, mode: VisibilityMode) -> Visibility {
    match mode {
        VisibilityMode::DualChannel => Visibility::Visible,
        VisibilityMode::SingleChannel => {
            if seg.front_facing {
                Visibility::Visible
            } else {
                Visibility::Backfacing
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn clip_run<S: Surface>(
    surface: &S,
    raw: &[RawSegment],
    run_start: usize,
    run_end: usize,
    projector: &Projector,
    viewport: &Viewport,
    mode: VisibilityMode,
    out: &mut Vec<ScreenSegment>,
) {
    let push = |out: &mut Vec<ScreenSegment>,
                pos: NdcZPoint,
                is_edge: bool,
                vis: Visibility,
                face: Option<FaceRef>,
                world: Point3<f64>,
                len: f64,
                line_type: LineType| {
        let bary = face
            .and_then(|fr| surface.resolve(fr))
            .map(|f| surface.project_barycentric(f, &world))
            .unwrap_or_else(Vector3::zeros);
        out.push(ScreenSegment {
            pos,
            is_edge,
            vis,
            id: 0,
            hidden_id: 0,
            face,
            bary,
            world,
            len,
            rel_len: 0.0,
            line_type,
        });
    };

    let ref_start = out.len();
    let mut partial_length = 0.0;
    let mut last_npt = projector.project(&raw[run_start].point);
    let mut last_in = last_npt.is_some_and(|p| viewport.in_frustum(&p));

    if last_in {
        let seg = &raw[run_start];
        push(
            out,
            last_npt.expect("in-frustum point projects"),
            true,
            seed_vis(seg, mode),
            seg.face,
            seg.point,
            partial_length,
            seg.line_type,
        );
    }

    for i in run_start + 1..=run_end {
        let npt = projector.project(&raw[i].point);
        let in_frustum = npt.is_some_and(|p| viewport.in_frustum(&p));

        // The final point of a run has no face of its own; its span is
        // attributed to the previous face.
        let bary_face = if i != run_end { raw[i].face } else { raw[i - 1].face };
        let make_edge = i != run_end;

        if in_frustum && last_in {
            let (p, lp) = (npt.expect("in frustum"), last_npt.expect("in frustum"));
            partial_length += p.planar_dist(&lp);
            push(
                out,
                p,
                make_edge,
                seed_vis(&raw[i], mode),
                bary_face,
                raw[i].point,
                partial_length,
                raw[i].line_type,
            );
        } else if in_frustum && !last_in {
            // Entering the frustum: cut at the boundary, restart length.
            let p = npt.expect("in frustum");
            match last_npt.map(|lp| intersect_with_frustum(&p, &lp, viewport)) {
                Some((cut, w)) if w > 0.0 => {
                    let lp = last_npt.expect("projected");
                    let cut = NdcZPoint::new(cut.x, cut.y, p.z + w * (lp.z - p.z));
                    let cut_world = projector
                        .unproject(&cut)
                        .unwrap_or_else(|| raw[i].point.lerp(&raw[i - 1].point, w));
                    partial_length = 0.0;
                    push(
                        out,
                        cut,
                        true,
                        seed_vis(&raw[i - 1], mode),
                        raw[i - 1].face,
                        cut_world,
                        partial_length,
                        raw[i - 1].line_type,
                    );
                    partial_length += p.planar_dist(&cut);
                }
                _ => partial_length = 0.0,
            }
            push(
                out,
                p,
                make_edge,
                seed_vis(&raw[i], mode),
                bary_face,
                raw[i].point,
                partial_length,
                raw[i].line_type,
            );
        } else if !in_frustum && last_in {
            // Exiting: cut at the boundary, or break the run if the exit
            // span has no boundary crossing to offer.
            let lp = last_npt.expect("was in frustum");
            match npt.map(|p| intersect_with_frustum(&lp, &p, viewport)) {
                Some((cut, w)) if w > 0.0 => {
                    let p = npt.expect("projected");
                    let cut = NdcZPoint::new(cut.x, cut.y, lp.z + w * (p.z - lp.z));
                    let cut_world = projector
                        .unproject(&cut)
                        .unwrap_or_else(|| raw[i - 1].point.lerp(&raw[i].point, w));
                    let vis = match mode {
                        VisibilityMode::DualChannel => Visibility::Visible,
                        VisibilityMode::SingleChannel => {
                            let last_vis =
                                out.last().map(|s| s.vis) == Some(Visibility::Visible);
                            if raw[i].front_facing && last_vis {
                                Visibility::Visible
                            } else {
                                Visibility::Backfacing
                            }
                        }
                    };
                    partial_length += cut.planar_dist(&lp);
                    push(
                        out,
                        cut,
                        false,
                        vis,
                        raw[i - 1].face,
                        cut_world,
                        partial_length,
                        raw[i - 1].line_type,
                    );
                }
                _ => {
                    if out.len() > ref_start {
                        out.last_mut().expect("nonempty").is_edge = false;
                    }
                }
            }
        }

        last_in = in_frustum;
        last_npt = npt;
    }
}

/// Planar intersection of the span from `inner` (inside) to `outer`
/// (outside) with the frustum rectangle. Returns the cut point and its
/// fractional position from `inner`, or zero when no side qualifies.
fn intersect_with_frustum(
    inner: &NdcZPoint,
    outer: &NdcZPoint,
    viewport: &Viewport,
) -> (NdcZPoint, f64) {
    let (xb, yb) = viewport.frustum_bounds();
    let dx = outer.x - inner.x;
    let dy = outer.y - inner.y;
    let len = inner.planar_dist(outer);
    if len == 0.0 {
        return (*inner, 0.0);
    }

    if dy > 0.0 {
        let xsect = inner.x + dx * (yb - inner.y) / dy;
        if xsect < xb && xsect > -xb {
            let ret = NdcZPoint::new(xsect, yb, 0.0);
            return (ret, ret.planar_dist(inner) / len);
        }
    }
    if dy < 0.0 {
        let xsect = inner.x + dx * (-yb - inner.y) / dy;
        if xsect < xb && xsect > -xb {
            let ret = NdcZPoint::new(xsect, -yb, 0.0);
            return (ret, ret.planar_dist(inner) / len);
        }
    }
    if dx > 0.0 {
        let ysect = inner.y + dy * (xb - inner.x) / dx;
        if ysect < yb && ysect > -yb {
            let ret = NdcZPoint::new(xb, ysect, 0.0);
            return (ret, ret.planar_dist(inner) / len);
        }
    }
    if dx < 0.0 {
        let ysect = inner.y + dy * (-xb - inner.x) / dx;
        if ysect < yb && ysect > -yb {
            let ret = NdcZPoint::new(-xb, ysect, 0.0);
            return (ret, ret.planar_dist(inner) / len);
        }
    }

    (*inner, 0.0)
}

/// Rotate a closed silhouette run so its seam lands on a natural break,
/// keeping accumulated arclengths consistent with the new start.
fn repair_loop_seam(
    segs: &mut Vec<ScreenSegment>,
    ref_start: usize,
    mode: VisibilityMode,
    fallback: Option<SeamFallback>,
) {
    let ref_end = segs.len();
    if ref_end - ref_start < 2 {
        return;
    }
    if segs[ref_start].line_type != LineType::Silhouette {
        return;
    }
    let (first, last) = (&segs[ref_start], &segs[ref_end - 1]);
    if !first.pos.planar_eq(&last.pos)
        || first.vis != Visibility::Visible
        || last.vis != Visibility::Visible
    {
        return;
    }

    let mut j = ref_end - 1;
    while j > ref_start
        && segs[j - 1].is_edge
        && (mode == VisibilityMode::DualChannel || segs[j - 1].vis == Visibility::Visible)
    {
        j -= 1;
    }

    let mut from_fallback = false;
    if j == ref_start {
        if let Some(fb) = fallback {
            let mut best = f64::MAX;
            for (k, seg) in segs.iter().enumerate().take(ref_end).skip(ref_start) {
                let key = match fb {
                    SeamFallback::MinX => seg.pos.x,
                    SeamFallback::MinY => seg.pos.y,
                };
                if key < best {
                    best = key;
                    j = k;
                    from_fallback = true;
                }
            }
        }
    }

    if j > ref_start && j != ref_end - 1 {
        segs.pop();
        if !from_fallback {
            segs[j - 1].is_edge = false;
        }
        let block: Vec<ScreenSegment> = segs.split_off(j);
        let block_size = block.len();
        segs.splice(ref_start..ref_start, block);
        let seam = ref_start + block_size;

        // The moved block now opens the run, so its lengths rebase to zero;
        // everything after the seam shifts up by the block's span plus the
        // planar gap across the old seam.
        let length_dec = segs[ref_start].len;
        for s in &mut segs[ref_start..seam] {
            s.len -= length_dec;
        }
        let ref_end = segs.len();
        let length_inc = segs[seam - 1].len + segs[seam].pos.planar_dist(&segs[seam - 1].pos);
        let mut k = seam;
        while k < ref_end && segs[k].is_edge {
            segs[k].len += length_inc;
            if k < ref_end - 1 && !segs[k + 1].is_edge {
                segs[k + 1].len += length_inc;
            }
            k += 1;
        }

        if from_fallback {
            // The old seam stays connected, so close the rotated loop with
            // a copy of the new first point.
            let mut closing = segs[ref_start];
            let prev = segs[segs.len() - 1];
            closing.is_edge = false;
            closing.len = prev.len + closing.pos.planar_dist(&prev.pos);
            segs.push(closing);
        }
    }
}
