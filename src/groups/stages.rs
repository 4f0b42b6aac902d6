//! Pruning and splitting passes over freshly built vote groups.
//!
//! Every pass only touches groups still marked good; demoted groups keep
//! their votes so diagnostics can show why a cluster died. Splits append
//! fresh groups and retire the original under a split status.

use crate::paths::gen_stroke_id;
use crate::types::{FitStatus, GroupStatus, VoteStatus};

use super::VoteGroup;

const PERCENTILE: f64 = 0.75;
const GAP_SPLIT_FACTOR: f64 = 4.0;
const LOOP_GAP_FACTOR: f64 = 3.0;
const LOOP_DELTA_FACTOR: f64 = 4.0;
const DELTA_FORWARD_FACTOR: f64 = 6.0;
const DELTA_REVERSE_FACTOR: f64 = 3.0;
const OUTLIER_FACTOR: f64 = 20.0;

/// Demote groups carrying fewer votes than the floor.
pub fn cull_small(groups: &mut [VoteGroup], min_votes: usize) {
    for g in groups.iter_mut() {
        if g.status.is_good() && g.num() < min_votes {
            g.status = GroupStatus::LowVotes;
        }
    }
}

/// Demote groups whose arc window is below the length floor.
pub fn cull_short(groups: &mut [VoteGroup], min_len: f64) {
    for g in groups.iter_mut() {
        if g.status.is_good() && g.span() < min_len {
            g.status = GroupStatus::LowLength;
        }
    }
}

/// Demote groups whose mean vote spacing exceeds the ceiling.
pub fn cull_sparse(groups: &mut [VoteGroup], max_spacing: f64) {
    for g in groups.iter_mut() {
        if !g.status.is_good() || g.num() < 2 {
            continue;
        }
        if g.span() / (g.num() as f64 - 1.0) > max_spacing {
            g.status = GroupStatus::BadDensity;
        }
    }
}

/// Demote groups whose parameter runs net backwards along the path.
pub fn cull_backwards(groups: &mut [VoteGroup]) {
    for g in groups.iter_mut() {
        let nv = g.num();
        if !g.status.is_good() || nv < 2 {
            continue;
        }
        let mut cnt = 0.0;
        for j in 0..nv - 1 {
            cnt += if g.votes[j + 1].t < g.votes[j].t {
                -1.0
            } else {
                1.0
            };
        }
        if cnt / (nv as f64 - 1.0) <= 0.0 {
            g.status = GroupStatus::CullBackwards;
        }
    }
}

/// Retire good groups whose provisional fit came out backwards.
pub fn cull_bad_fit(groups: &mut [VoteGroup]) {
    for g in groups.iter_mut() {
        if !g.status.is_good() {
            continue;
        }
        debug_assert!(g.fit_status != FitStatus::None);
        if g.fit_status == FitStatus::Backwards {
            g.status = GroupStatus::FitBackwards;
        }
    }
}

/// Flag votes far from the provisional fit and mark the fit stale.
///
/// The threshold scales off the 75th-percentile residual, so a tight
/// group tolerates almost nothing while a loose one keeps its spread.
pub fn cull_outliers(groups: &mut [VoteGroup]) {
    for g in groups.iter_mut() {
        let nv = g.num();
        if !g.status.is_good() || nv < 5 {
            continue;
        }
        // Segments introduced during coverage have no fit yet; a stale
        // fit is still good enough for residual analysis.
        if g.fit_status == FitStatus::None {
            continue;
        }

        let errs: Vec<f64> = g
            .votes
            .iter()
            .map(|v| (v.t - g.get_t(v.s)).abs())
            .collect();
        let mut sorted = errs.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let thresh = OUTLIER_FACTOR * sorted[percentile_index(nv)];

        let mut flagged = 0usize;
        for (v, err) in g.votes.iter_mut().zip(&errs) {
            if *err > thresh {
                v.status = VoteStatus::Outlier;
                flagged += 1;
            }
        }
        if flagged > 0 {
            g.fit_status = FitStatus::Stale;
        }
    }
}

/// Split every group at votes whose arc gap dwarfs the typical spacing.
pub fn split_gapped(groups: &mut Vec<VoteGroup>) {
    let n = groups.len();
    let mut fresh = Vec::new();
    for i in 0..n {
        let g = &groups[i];
        let nv = g.num();
        if !g.status.is_good() || nv < 5 {
            continue;
        }

        let gaps: Vec<f64> = (0..nv - 1)
            .map(|j| g.votes[j + 1].s - g.votes[j].s)
            .collect();
        let mut sorted = gaps.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let thresh = GAP_SPLIT_FACTOR * sorted[percentile_index(nv)];

        let trips: Vec<bool> = gaps.iter().map(|&gap| gap > thresh).collect();
        if let Some(chunks) = chunk_bounds(&trips) {
            for (a, b) in chunks {
                push_chunk(&mut fresh, g, a, b);
            }
            groups[i].status = GroupStatus::SplitGap;
        }
    }
    groups.append(&mut fresh);
}

/// Split groups at parameter jumps far outside the typical per-vote delta.
///
/// Reverse jumps split at three times the percentile delta, forward jumps
/// at six; the looser forward factor tolerates stretching surfaces.
pub fn split_large_delta(groups: &mut Vec<VoteGroup>) {
    let n = groups.len();
    let mut fresh = Vec::new();
    for i in 0..n {
        let g = &groups[i];
        let nv = g.num();
        if !g.status.is_good() || nv < 5 {
            continue;
        }

        let (deltas, cnt) = parameter_deltas(g);
        if cnt.abs() / (nv as f64 - 1.0) < 0.5 {
            log::debug!("split_large_delta: noisy deltas, leaving group {} alone", g.id);
            continue;
        }
        let pct = signed_percentile(&deltas, cnt, nv);
        let reverse = -DELTA_REVERSE_FACTOR * pct;
        let forward = DELTA_FORWARD_FACTOR * pct;

        let trips: Vec<bool> = deltas
            .iter()
            .map(|&d| d / reverse > 1.0 || d / forward > 1.0)
            .collect();
        if let Some(chunks) = chunk_bounds(&trips) {
            for (a, b) in chunks {
                push_chunk(&mut fresh, g, a, b);
            }
            groups[i].status = GroupStatus::SplitLargeDelta;
        }
    }
    groups.append(&mut fresh);
}

/// Split a group straddling a closed path's arc seam.
///
/// A stroke that wraps the seam arrives as one group with a single huge
/// reverse delta in the middle and votes near both path ends. Votes at
/// the jump are dropped, the halves survive as separate groups.
pub fn split_looped(groups: &mut Vec<VoteGroup>, path_len: f64) {
    let n = groups.len();
    let mut fresh = Vec::new();
    for i in 0..n {
        let g = &groups[i];
        let nv = g.num();
        if !g.status.is_good() || nv < 5 {
            continue;
        }

        let gaps: Vec<f64> = (0..nv - 1)
            .map(|j| g.votes[j + 1].s - g.votes[j].s)
            .collect();
        let (deltas, cnt) = parameter_deltas(g);
        if cnt.abs() / (nv as f64 - 1.0) < 0.5 {
            log::debug!("split_looped: noisy deltas, leaving group {} alone", g.id);
            continue;
        }

        let mut sorted_gaps = gaps.clone();
        sorted_gaps.sort_by(|a, b| a.total_cmp(b));
        let gap_thresh = LOOP_GAP_FACTOR * sorted_gaps[percentile_index(nv)];

        let mut sorted_deltas = deltas.clone();
        if cnt < 0.0 {
            sorted_deltas.sort_by(|a, b| b.total_cmp(a));
        } else {
            sorted_deltas.sort_by(|a, b| a.total_cmp(b));
        }
        let delta_thresh = -LOOP_DELTA_FACTOR * sorted_deltas[percentile_index(nv)];

        if sorted_deltas[0] / delta_thresh <= 1.0 {
            continue;
        }

        // Bounds of the reverse-jump stretch in vote order.
        let mut j0 = nv;
        let mut j1 = 0usize;
        let mut j = 0usize;
        while j < sorted_deltas.len() && sorted_deltas[j] / delta_thresh > 1.0 {
            if let Some(ind) = deltas.iter().position(|&d| d == sorted_deltas[j]) {
                j0 = j0.min(ind);
                j1 = j1.max(ind);
            }
            j += 1;
        }
        if j0 != j1 {
            log::debug!("split_looped: several large reverse deltas in group {}", g.id);
        }

        // Only a seam crossing has support near both path ends.
        if g.votes[0].s > gap_thresh {
            log::debug!("split_looped: no votes near the path start of group {}", g.id);
            continue;
        }
        if g.votes[nv - 1].s < path_len - gap_thresh {
            log::debug!("split_looped: no votes near the path end of group {}", g.id);
            continue;
        }

        push_chunk(&mut fresh, g, 0, j0);
        push_chunk(&mut fresh, g, j1 + 1, nv - 1);
        groups[i].status = GroupStatus::SplitLoop;
    }
    groups.append(&mut fresh);
}

/// For the interpolating fit: split at every backwards parameter step, so
/// the piecewise fit through the votes stays monotone.
pub fn split_all_backtracking(groups: &mut Vec<VoteGroup>) {
    let n = groups.len();
    let mut fresh = Vec::new();
    for i in 0..n {
        let g = &groups[i];
        let nv = g.num();
        if !g.status.is_good() || nv < 2 {
            continue;
        }

        let trips: Vec<bool> = (0..nv - 1)
            .map(|j| g.votes[j + 1].t - g.votes[j].t < 0.0)
            .collect();
        if let Some(chunks) = chunk_bounds(&trips) {
            for (a, b) in chunks {
                push_chunk(&mut fresh, g, a, b);
            }
            groups[i].status = GroupStatus::SplitAllBacktrack;
        }
    }
    groups.append(&mut fresh);
}

fn parameter_deltas(g: &VoteGroup) -> (Vec<f64>, f64) {
    let nv = g.num();
    let mut deltas = Vec::with_capacity(nv - 1);
    let mut cnt = 0.0;
    for j in 0..nv - 1 {
        let d = g.votes[j + 1].t - g.votes[j].t;
        deltas.push(d);
        cnt += if d < 0.0 { -1.0 } else { 1.0 };
    }
    (deltas, cnt)
}

/// Percentile entry taken in the majority direction: descending order for
/// net-backward groups, so index zero is always the worst reversal.
fn signed_percentile(deltas: &[f64], cnt: f64, nv: usize) -> f64 {
    let mut sorted = deltas.to_vec();
    if cnt < 0.0 {
        sorted.sort_by(|a, b| b.total_cmp(a));
    } else {
        sorted.sort_by(|a, b| a.total_cmp(b));
    }
    sorted[percentile_index(nv)]
}

fn percentile_index(nv: usize) -> usize {
    (PERCENTILE * (nv as f64 - 2.0)) as usize
}

/// Chunk boundaries between tripped deltas; `None` when nothing tripped.
/// Chunk `(a, b)` spans votes `a..=b`; the tail chunk runs to the last vote.
fn chunk_bounds(trips: &[bool]) -> Option<Vec<(usize, usize)>> {
    if !trips.iter().any(|&t| t) {
        return None;
    }
    let mut chunks = Vec::new();
    let mut j0 = 0usize;
    for (j, &tripped) in trips.iter().enumerate() {
        if tripped {
            chunks.push((j0, j));
            j0 = j + 1;
        }
    }
    chunks.push((j0, trips.len()));
    Some(chunks)
}

fn push_chunk(fresh: &mut Vec<VoteGroup>, g: &VoteGroup, a: usize, b: usize) {
    let mut ng = VoteGroup::new(gen_stroke_id());
    ng.votes.extend_from_slice(&g.votes[a..=b]);
    ng.begin = g.votes[a].s;
    ng.end = g.votes[b].s;
    fresh.push(ng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamVote;

    fn group_with(sts: &[(f64, f64)]) -> VoteGroup {
        let mut g = VoteGroup::new(1);
        for &(s, t) in sts {
            g.votes.push(ParamVote {
                s,
                t,
                confidence: 1.0,
                status: VoteStatus::Good,
                path_index: 0,
                stroke_id: 1,
                pix_dist: 0.0,
                world_dist: 0.0,
            });
        }
        g.sort();
        g
    }

    #[test]
    fn small_and_short_groups_are_demoted() {
        let mut groups = vec![
            group_with(&[(0.0, 0.0)]),
            group_with(&[(0.0, 0.0), (0.5, 0.5)]),
        ];
        cull_small(&mut groups, 2);
        assert_eq!(groups[0].status, GroupStatus::LowVotes);
        assert_eq!(groups[1].status, GroupStatus::Good);

        cull_short(&mut groups, 0.6);
        assert_eq!(groups[1].status, GroupStatus::LowLength);
    }

    #[test]
    fn sparse_cull_uses_mean_spacing() {
        let mut groups = vec![group_with(&[(0.0, 0.0), (0.3, 0.1), (0.6, 0.2)])];
        cull_sparse(&mut groups, 0.31);
        assert_eq!(groups[0].status, GroupStatus::Good);
        cull_sparse(&mut groups, 0.29);
        assert_eq!(groups[0].status, GroupStatus::BadDensity);
    }

    #[test]
    fn net_backward_groups_are_culled() {
        let mut groups = vec![
            group_with(&[(0.0, 3.0), (0.1, 2.9), (0.2, 2.8)]),
            group_with(&[(0.0, 1.0), (0.1, 1.1), (0.2, 1.2)]),
        ];
        cull_backwards(&mut groups);
        assert_eq!(groups[0].status, GroupStatus::CullBackwards);
        assert_eq!(groups[1].status, GroupStatus::Good);
    }

    #[test]
    fn a_wide_gap_splits_the_group_in_two() {
        let mut groups = vec![group_with(&[
            (0.0, 0.0),
            (0.1, 0.1),
            (0.2, 0.2),
            (1.0, 1.0),
            (1.1, 1.1),
            (1.2, 1.2),
        ])];
        split_gapped(&mut groups);
        // Percentile gap is 0.1, threshold 0.4; only the 0.8 gap trips.
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].status, GroupStatus::SplitGap);
        assert_eq!((groups[1].begin, groups[1].end), (0.0, 0.2));
        assert_eq!((groups[2].begin, groups[2].end), (1.0, 1.2));
        assert_eq!(groups[1].num(), 3);
        assert_eq!(groups[2].num(), 3);
    }

    #[test]
    fn a_parameter_jump_splits_even_without_an_arc_gap() {
        let mut groups = vec![group_with(&[
            (0.0, 0.0),
            (0.1, 0.1),
            (0.2, 0.2),
            (0.3, 1.9),
            (0.4, 2.0),
            (0.5, 2.1),
        ])];
        split_large_delta(&mut groups);
        // Percentile delta 0.1, forward threshold 0.6; the 1.7 jump trips.
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].status, GroupStatus::SplitLargeDelta);
        assert_eq!(groups[1].num(), 3);
        assert_eq!(groups[2].num(), 3);
    }

    #[test]
    fn loop_seam_group_splits_when_supported_at_both_ends() {
        let mut groups = vec![group_with(&[
            (0.02, 5.3),
            (0.10, 5.4),
            (0.25, 5.5),
            (0.40, 4.0),
            (0.60, 4.1),
            (0.80, 4.2),
            (0.98, 4.3),
        ])];
        split_looped(&mut groups, 1.0);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].status, GroupStatus::SplitLoop);
        assert_eq!((groups[1].begin, groups[1].end), (0.02, 0.25));
        assert_eq!((groups[2].begin, groups[2].end), (0.40, 0.98));
    }

    #[test]
    fn loop_split_needs_votes_near_both_ends() {
        // Same reversal but all the support sits in the middle of the path.
        let mut groups = vec![group_with(&[
            (0.30, 5.3),
            (0.35, 5.4),
            (0.40, 5.5),
            (0.45, 4.0),
            (0.50, 4.1),
            (0.55, 4.2),
            (0.60, 4.3),
        ])];
        split_looped(&mut groups, 2.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].status, GroupStatus::Good);
    }

    #[test]
    fn outlier_votes_are_flagged_and_the_fit_marked_stale() {
        let mut g = group_with(&[
            (0.0, 0.0),
            (0.1, 0.1),
            (0.2, 0.2),
            (0.3, 0.3),
            (0.4, 0.4),
            (0.5, 9.0),
        ]);
        g.fits = vec![(0.0, 0.0), (0.5, 0.5)];
        g.fit_status = FitStatus::Good;
        let mut groups = vec![g];
        cull_outliers(&mut groups);
        let g = &groups[0];
        assert_eq!(g.fit_status, FitStatus::Stale);
        assert_eq!(g.votes[5].status, VoteStatus::Outlier);
        assert!(g.votes[..5].iter().all(|v| v.status == VoteStatus::Good));
    }

    #[test]
    fn every_backtrack_splits_under_the_interpolating_style() {
        let mut groups = vec![group_with(&[
            (0.0, 0.0),
            (0.1, 0.2),
            (0.2, 0.1),
            (0.3, 0.3),
            (0.4, 0.2),
            (0.5, 0.4),
        ])];
        split_all_backtracking(&mut groups);
        // Two negative deltas make three chunks.
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].status, GroupStatus::SplitAllBacktrack);
        assert_eq!(groups[1].num(), 2);
        assert_eq!(groups[2].num(), 2);
        assert_eq!(groups[3].num(), 2);
    }
}
