//! Phase healing across abutting groups after trimmed coverage.
//!
//! Coverage leaves each path tiled by good groups that meet edge to
//! edge, but their parameter fits usually disagree at the junctions.
//! Junctions closer than the join threshold merge into one group;
//! junctions within the drag threshold get a pair of healer votes that
//! pull both fits toward the shared midpoint on the next refit.

use crate::paths::gen_stroke_id;
use crate::types::{FitStatus, GroupStatus, ParamVote, VoteStatus};

use super::{fit, GroupingParams, VoteGroup};

pub fn heal_groups(
    groups: &mut Vec<VoteGroup>,
    params: &GroupingParams,
    freq: f64,
    pix_to_ndc: f64,
) {
    let mut final_groups: Vec<usize> = (0..groups.len())
        .filter(|&i| groups[i].status.is_good())
        .collect();
    if final_groups.len() < 2 {
        return;
    }
    final_groups.sort_by(|&a, &b| groups[a].begin.total_cmp(&groups[b].begin));

    // Start of the open join chain, as an index into final_groups.
    let mut chain_start: Option<usize> = None;
    // Integer phase shift applied to votes appended to the chain.
    let mut pi: i32 = 0;

    let mut i = 0usize;
    while i < final_groups.len() {
        let mut attach = false;
        let mut pi_next = pi;

        if i < final_groups.len() - 1 {
            let ia = final_groups[i];
            let ib = final_groups[i + 1];
            debug_assert_eq!(groups[ia].end, groups[ib].begin);

            let ti = groups[ia].get_t(groups[ia].end);
            let ti_1 = groups[ib].get_t(groups[ib].begin);

            let floori = ti.floor();
            let mut floori_1 = ti_1.floor();
            // Fractional phase mismatch, wrapped to [-1/2, 1/2].
            let mut d = (ti_1 - floori_1) - (ti - floori);
            if d > 0.5 {
                floori_1 += 1.0;
                d -= 1.0;
            } else if d < -0.5 {
                floori_1 -= 1.0;
                d += 1.0;
            }
            let dpix = ((d / freq) / pix_to_ndc).abs();

            if dpix < params.heal_join_pix {
                attach = true;
            } else if dpix < params.heal_drag_pix {
                let s_a = groups[ia].end;
                push_healer(&mut groups[ia], s_a, ti + d / 2.0);
                let s_b = groups[ib].begin;
                push_healer(&mut groups[ib], s_b, ti_1 - d / 2.0);
            }
            pi_next = pi + (floori - floori_1) as i32;
        }

        if attach {
            if chain_start.is_none() {
                chain_start = Some(i);
                debug_assert_eq!(pi, 0);
                let gi = &groups[final_groups[i]];
                let mut ng = VoteGroup::new(gen_stroke_id());
                ng.votes = gi.votes.clone();
                ng.begin = gi.begin;
                groups.push(ng);
            } else {
                let shifted = shifted_votes(&groups[final_groups[i]], pi);
                let last = groups.len() - 1;
                groups[last].votes.extend(shifted);
            }
            pi = pi_next;
        } else if let Some(i0) = chain_start.take() {
            let src = final_groups[i];
            let shifted = shifted_votes(&groups[src], pi);
            let last = groups.len() - 1;
            groups[last].votes.extend(shifted);
            groups[last].end = groups[src].end;

            for &gidx in &final_groups[i0..=i] {
                groups[gidx].status = GroupStatus::Healed;
            }
            final_groups.drain(i0 + 1..=i);
            final_groups[i0] = last;
            final_groups.sort_by(|&a, &b| groups[a].begin.total_cmp(&groups[b].begin));

            let ng = &mut groups[last];
            ng.votes.sort_by(|a, b| a.s.total_cmp(&b.s));
            fit::fit_group(ng, params, freq, pix_to_ndc);
            log::debug!("healed a chain of joined groups into group {}", ng.id);

            i = i0;
            pi = 0;
        }
        i += 1;
    }

    // Refit everything the drag votes touched.
    for &gidx in &final_groups {
        if groups[gidx].fit_status == FitStatus::Stale {
            let g = &mut groups[gidx];
            g.fits.clear();
            fit::fit_group(g, params, freq, pix_to_ndc);
        }
    }
}

/// Replace groups whose final fit ran backwards with a phasing refit.
///
/// The broken group is retired so diagnostics keep its votes; the fresh
/// group inherits the window and votes unchanged.
pub fn refit_backward(groups: &mut Vec<VoteGroup>, freq: f64) {
    let n = groups.len();
    for i in 0..n {
        if !groups[i].status.is_good() || groups[i].fit_status == FitStatus::Good {
            continue;
        }
        debug_assert_eq!(groups[i].fit_status, FitStatus::Backwards);

        let mut ng = VoteGroup::new(gen_stroke_id());
        ng.votes = groups[i].votes.clone();
        ng.begin = groups[i].begin;
        ng.end = groups[i].end;
        groups[i].status = GroupStatus::FinalFitBackwards;

        if ng.num() == 0 {
            fit::arclength_fit(&mut ng, freq);
        } else {
            fit::phasing_fit(&mut ng, freq);
        }
        debug_assert_eq!(ng.fit_status, FitStatus::Good);
        log::warn!(
            "group {} fit ran backwards, replaced with a phasing refit",
            groups[i].id
        );
        groups.push(ng);
    }
}

fn push_healer(g: &mut VoteGroup, s: f64, t: f64) {
    let (path_index, stroke_id) = g
        .votes
        .first()
        .map(|v| (v.path_index, v.stroke_id))
        .unwrap_or((0, g.id));
    g.votes.push(ParamVote {
        s,
        t,
        confidence: 0.0,
        status: VoteStatus::Healer,
        path_index,
        stroke_id,
        pix_dist: 0.0,
        world_dist: 0.0,
    });
    g.fit_status = FitStatus::Stale;
    g.votes.sort_by(|a, b| a.s.total_cmp(&b.s));
}

fn shifted_votes(g: &VoteGroup, pi: i32) -> Vec<ParamVote> {
    g.votes
        .iter()
        .map(|v| {
            let mut v = *v;
            v.t += pi as f64;
            v
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::FitStyle;

    fn covered_group(begin: f64, end: f64, sts: &[(f64, f64)], fits: &[(f64, f64)]) -> VoteGroup {
        let mut g = VoteGroup::new(gen_stroke_id());
        for &(s, t) in sts {
            g.votes.push(ParamVote {
                s,
                t,
                confidence: 1.0,
                status: VoteStatus::Good,
                path_index: 0,
                stroke_id: g.id,
                pix_dist: 0.0,
                world_dist: 0.0,
            });
        }
        g.begin = begin;
        g.end = end;
        g.fits = fits.to_vec();
        g.fit_status = FitStatus::Good;
        g
    }

    fn sigma_params() -> GroupingParams {
        GroupingParams {
            fit_style: FitStyle::Sigma,
            ..GroupingParams::default()
        }
    }

    #[test]
    fn matching_junctions_join_into_one_healed_chain() {
        // Fits agree modulo one at the junction; the second group sits a
        // whole period up, so its votes shift down on the way in.
        let mut groups = vec![
            covered_group(
                0.0,
                0.5,
                &[(0.1, 1.1), (0.3, 1.3)],
                &[(0.0, 1.2), (0.5, 1.7)],
            ),
            covered_group(
                0.5,
                1.0,
                &[(0.6, 2.8), (0.8, 3.0)],
                &[(0.5, 2.7), (1.0, 3.2)],
            ),
        ];
        heal_groups(&mut groups, &sigma_params(), 1.0, 0.01);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].status, GroupStatus::Healed);
        assert_eq!(groups[1].status, GroupStatus::Healed);

        let ng = &groups[2];
        assert_eq!(ng.status, GroupStatus::Good);
        assert_eq!((ng.begin, ng.end), (0.0, 1.0));
        assert_eq!(ng.num(), 4);
        let ts: Vec<f64> = ng.votes.iter().map(|v| v.t).collect();
        assert_eq!(ts, vec![1.1, 1.3, 1.8, 2.0]);
        assert_eq!(ng.fit_status, FitStatus::Good);
    }

    #[test]
    fn moderate_mismatch_drags_both_fits_with_healer_votes() {
        let mut groups = vec![
            covered_group(
                0.0,
                0.5,
                &[(0.1, 1.1), (0.3, 1.3)],
                &[(0.0, 5.0), (0.5, 5.0)],
            ),
            covered_group(
                0.5,
                1.0,
                &[(0.6, 2.8), (0.8, 3.0)],
                &[(0.5, 5.45), (1.0, 5.45)],
            ),
        ];
        // Mismatch of 0.45 periods is 4.5 pixels here: inside the drag band.
        heal_groups(&mut groups, &sigma_params(), 10.0, 0.01);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].status, GroupStatus::Good);
        assert_eq!(groups[1].status, GroupStatus::Good);
        assert_eq!(groups[0].num(), 3);
        assert_eq!(groups[1].num(), 3);

        let healer_a = groups[0].votes.last().expect("votes");
        assert_eq!(healer_a.status, VoteStatus::Healer);
        assert_eq!(healer_a.s, 0.5);
        assert!((healer_a.t - 5.225).abs() < 1e-12);
        let healer_b = &groups[1].votes[0];
        assert_eq!(healer_b.status, VoteStatus::Healer);
        assert_eq!(healer_b.s, 0.5);
        assert!((healer_b.t - 5.225).abs() < 1e-12);

        // Both fits were rebuilt from scratch.
        assert_eq!(groups[0].fit_status, FitStatus::Good);
        assert_eq!(groups[0].fits[0], (0.0, 0.0));
        assert_eq!(groups[1].fits[0], (0.5, 0.0));
    }

    #[test]
    fn hopeless_junctions_are_left_alone() {
        let mut groups = vec![
            covered_group(0.0, 0.5, &[(0.1, 1.0)], &[(0.0, 1.0), (0.5, 1.0)]),
            covered_group(0.5, 1.0, &[(0.6, 1.2)], &[(0.5, 1.2), (1.0, 1.2)]),
        ];
        // Mismatch of 0.2 periods is 20 pixels here: beyond the drag band.
        heal_groups(&mut groups, &sigma_params(), 1.0, 0.01);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].num(), 1);
        assert_eq!(groups[1].num(), 1);
        assert_eq!(groups[0].fits, vec![(0.0, 1.0), (0.5, 1.0)]);
        assert_eq!(groups[1].fits, vec![(0.5, 1.2), (1.0, 1.2)]);
    }

    #[test]
    fn backwards_final_fits_are_replaced_by_phasing() {
        let freq = 10.0;
        let mut g = covered_group(
            0.1,
            0.3,
            &[(0.1, 1.0 + 0.25), (0.2, 2.0 + 0.25), (0.3, 3.0 + 0.25)],
            &[(0.1, 9.0), (0.3, 8.0)],
        );
        g.fit_status = FitStatus::Backwards;
        let mut groups = vec![g];
        refit_backward(&mut groups, freq);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].status, GroupStatus::FinalFitBackwards);
        let ng = &groups[1];
        assert_eq!(ng.status, GroupStatus::Good);
        assert_eq!(ng.fit_status, FitStatus::Good);
        assert_eq!((ng.begin, ng.end), (0.1, 0.3));
        assert_eq!(ng.num(), 3);
        assert!((ng.get_t(0.2) - 2.25).abs() < 1e-9);
    }
}
