//! Vote clustering and parameterization groups.
//!
//! Propagated samples land on the new frame's paths as parameter votes.
//! This module clusters each path's votes into groups by originating
//! stroke, prunes and splits the clusters until they describe coherent
//! parameter runs, negotiates which group covers which stretch of the
//! path, and fits a piecewise-linear `s -> t` table per surviving group.
//! The fitted tables drive stroke emission and next-frame seeding.

use serde::{Deserialize, Serialize};

use crate::paths::{gen_stroke_id, PathSet, ScreenPath};
use crate::types::{FitStatus, GroupStatus, ParamVote};

pub mod coverage;
pub mod fit;
pub mod heal;
pub mod stages;

/// Strategy for turning a group's votes into an `s -> t` fit table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitStyle {
    /// Fresh phase per group; no temporal coherence at all.
    Random,
    /// Parameter restarts at zero on every group.
    Sigma,
    /// Parameter follows path arc length, ignoring votes.
    Arclength,
    /// Single phase offset from the circular mean of the votes.
    Phasing,
    /// Piecewise-linear through every vote.
    Interpolating,
    /// Regularized least-squares over evenly spaced knots.
    #[default]
    Optimizing,
}

/// How overlapping groups divide the path between them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoveragePolicy {
    /// The single heaviest group takes the whole path.
    Majority,
    /// Groups keep their spans; holes split at vote-weighted midpoints.
    OneToOne,
    /// Confidence-ordered trimming with gap healing afterwards.
    #[default]
    Trimmed,
}

/// Knobs for the grouping pipeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupingParams {
    pub fit_style: FitStyle,
    pub coverage: CoveragePolicy,
    /// Groups with fewer votes are culled.
    pub min_votes: usize,
    /// Paths shorter than this many pixels never get groups.
    pub min_path_pix: f64,
    /// Span floor in pixels; the fractional floor wins when smaller.
    pub min_group_pix: f64,
    /// Span floor as a fraction of the path length.
    pub min_group_frac: f64,
    /// Mean vote spacing ceiling, in multiples of the seed spacing.
    pub sparse_factor: f64,
    /// Knot spacing of the optimizing fit, in pixels.
    pub fit_pix_spacing: f64,
    pub weight_fit: f64,
    pub weight_scale: f64,
    pub weight_distort: f64,
    /// Healer vote weight; zero disables healing entirely.
    pub weight_heal: f64,
    /// Phase mismatch below this many pixels joins adjacent groups.
    pub heal_join_pix: f64,
    /// Mismatch below this many pixels drags both fits together instead.
    pub heal_drag_pix: f64,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            fit_style: FitStyle::default(),
            coverage: CoveragePolicy::default(),
            min_votes: 2,
            min_path_pix: 2.0,
            min_group_pix: 5.0,
            min_group_frac: 0.05,
            sparse_factor: 3.0,
            fit_pix_spacing: 8.0,
            weight_fit: 1.0,
            weight_scale: 1.0,
            weight_distort: 1.0,
            weight_heal: 1.0,
            heal_join_pix: 3.0,
            heal_drag_pix: 15.0,
        }
    }
}

/// One cluster of votes with its fitted parameter table.
///
/// `id` starts as the originating stroke id while votes cluster, then is
/// replaced with a fresh stroke id once the group is sealed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteGroup {
    pub id: u32,
    pub status: GroupStatus,
    pub fit_status: FitStatus,
    /// Covered fraction of the path, set during trimmed coverage.
    pub confidence: f64,
    /// Arc-length window on the owning path.
    pub begin: f64,
    pub end: f64,
    pub votes: Vec<ParamVote>,
    /// Piecewise-linear (arc position, parameter) knots, ascending.
    pub fits: Vec<(f64, f64)>,
}

impl VoteGroup {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: GroupStatus::Good,
            fit_status: FitStatus::None,
            confidence: 0.0,
            begin: 0.0,
            end: 0.0,
            votes: Vec::new(),
            fits: Vec::new(),
        }
    }

    pub fn num(&self) -> usize {
        self.votes.len()
    }

    pub fn span(&self) -> f64 {
        self.end - self.begin
    }

    /// Order votes by arc length and pull the window onto them.
    pub fn sort(&mut self) {
        if self.votes.is_empty() {
            self.begin = 0.0;
            self.end = 0.0;
            return;
        }
        self.votes.sort_by(|a, b| a.s.total_cmp(&b.s));
        self.begin = self.votes[0].s;
        self.end = self.votes[self.votes.len() - 1].s;
    }

    /// Evaluate the fit table at an arc position, clamped to its ends.
    pub fn get_t(&self, s: f64) -> f64 {
        let n = self.fits.len();
        if n == 0 {
            return 0.0;
        }
        if n == 1 {
            return self.fits[0].1;
        }
        if s < self.fits[0].0 {
            return self.fits[0].1;
        }
        if s > self.fits[n - 1].0 {
            return self.fits[n - 1].1;
        }
        let mut l = 0usize;
        let mut r = n - 1;
        loop {
            let m = (l + r) / 2;
            if m == l {
                break;
            }
            if s > self.fits[m].0 {
                l = m;
            } else {
                r = m;
            }
        }
        let denom = self.fits[r].0 - self.fits[l].0;
        if denom <= 0.0 {
            return self.fits[l].1;
        }
        let w = (s - self.fits[l].0) / denom;
        self.fits[l].1 + (self.fits[r].1 - self.fits[l].1) * w
    }
}

/// Cluster the sorted votes by originating stroke.
///
/// Consecutive votes usually share a stroke, so the last touched group is
/// tried first; otherwise groups are scanned newest-first. Afterwards
/// every group is sorted and sealed with a fresh stroke id.
pub fn build_groups(votes: &mut Vec<ParamVote>, groups: &mut Vec<VoteGroup>) {
    votes.sort_by(|a, b| a.s.total_cmp(&b.s));
    groups.clear();

    let mut last_id = 0u32;
    let mut last_ind = 0usize;
    for vote in votes.iter() {
        let mut added = false;
        if last_id == vote.stroke_id && !groups.is_empty() {
            groups[last_ind].votes.push(*vote);
            added = true;
        } else {
            for j in (0..groups.len()).rev() {
                if groups[j].id == vote.stroke_id {
                    groups[j].votes.push(*vote);
                    last_id = groups[j].id;
                    last_ind = j;
                    added = true;
                    break;
                }
            }
        }
        if !added {
            let mut g = VoteGroup::new(vote.stroke_id);
            g.votes.push(*vote);
            groups.push(g);
            last_id = vote.stroke_id;
            last_ind = groups.len() - 1;
        }
    }

    for g in groups.iter_mut() {
        g.sort();
        g.id = gen_stroke_id();
    }
}

/// Run the whole grouping pipeline over every path in the set.
///
/// `seed_spacing_ndc` is the spacing used when the previous frame's seeds
/// were generated; the sparsity cull is expressed in multiples of it.
pub fn generate_groups(
    paths: &mut PathSet,
    params: &GroupingParams,
    pix_to_ndc: f64,
    seed_spacing_ndc: f64,
) {
    let min_path_ndc = params.min_path_pix * pix_to_ndc;
    for path in paths.iter_mut() {
        if path.length() < min_path_ndc {
            continue;
        }
        generate_path_groups(path, params, pix_to_ndc, seed_spacing_ndc);
    }
    paths.group_stamp += 1;
}

fn generate_path_groups(
    path: &mut ScreenPath,
    params: &GroupingParams,
    pix_to_ndc: f64,
    seed_spacing_ndc: f64,
) {
    let path_len = path.length();
    let closed = path.is_closed();
    let min_group_len = (params.min_group_pix * pix_to_ndc).min(params.min_group_frac * path_len);
    let freq = fit::parameter_freq(path.stretch, pix_to_ndc, path.offset_pix_len);
    let interpolating = params.fit_style == FitStyle::Interpolating;
    let do_heal = params.coverage == CoveragePolicy::Trimmed && params.weight_heal > 0.0;

    let mut groups = std::mem::take(&mut path.groups);
    build_groups(&mut path.votes, &mut groups);

    stages::cull_small(&mut groups, params.min_votes);
    stages::cull_short(&mut groups, min_group_len);

    if closed {
        stages::split_looped(&mut groups, path_len);
    }
    stages::split_gapped(&mut groups);
    stages::split_large_delta(&mut groups);

    stages::cull_backwards(&mut groups);
    if interpolating {
        stages::split_all_backtracking(&mut groups);
    }

    stages::cull_small(&mut groups, params.min_votes);
    stages::cull_short(&mut groups, min_group_len);
    stages::cull_sparse(&mut groups, params.sparse_factor * seed_spacing_ndc);

    if interpolating {
        coverage::apply(&mut groups, params.coverage, path_len, min_group_len);
        fit::fit_final(&mut groups, params, freq, pix_to_ndc);
    } else {
        fit::fit_initial(&mut groups, params, freq, pix_to_ndc);
        if params.fit_style == FitStyle::Optimizing {
            stages::cull_bad_fit(&mut groups);
        }
        coverage::apply(&mut groups, params.coverage, path_len, min_group_len);
        stages::cull_outliers(&mut groups);
        fit::fit_final(&mut groups, params, freq, pix_to_ndc);
        if do_heal {
            heal::heal_groups(&mut groups, params, freq, pix_to_ndc);
        }
        heal::refit_backward(&mut groups, freq);
    }

    path.groups = groups;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoteStatus;

    fn vote(s: f64, t: f64, stroke_id: u32) -> ParamVote {
        ParamVote {
            s,
            t,
            confidence: 1.0,
            status: VoteStatus::Good,
            path_index: 0,
            stroke_id,
            pix_dist: 0.0,
            world_dist: 0.0,
        }
    }

    #[test]
    fn votes_cluster_by_stroke_and_groups_get_fresh_ids() {
        let mut votes = vec![
            vote(0.3, 1.3, 7),
            vote(0.1, 1.1, 7),
            vote(0.2, 5.0, 9),
            vote(0.4, 5.2, 9),
            vote(0.5, 1.5, 7),
        ];
        let mut groups = Vec::new();
        build_groups(&mut votes, &mut groups);

        assert_eq!(groups.len(), 2);
        let a = &groups[0];
        let b = &groups[1];
        assert_eq!(a.num(), 3);
        assert_eq!(b.num(), 2);
        // Windows pulled onto the sorted votes.
        assert_eq!((a.begin, a.end), (0.1, 0.5));
        assert_eq!((b.begin, b.end), (0.2, 0.4));
        // Source stroke ids replaced by fresh ones.
        assert_ne!(a.id, 7);
        assert_ne!(b.id, 9);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn fit_table_evaluates_clamped_and_interpolated() {
        let mut g = VoteGroup::new(1);
        g.fits = vec![(0.0, 1.0), (0.4, 3.0), (1.0, 3.6)];
        assert_eq!(g.get_t(-1.0), 1.0);
        assert_eq!(g.get_t(2.0), 3.6);
        assert!((g.get_t(0.2) - 2.0).abs() < 1e-12);
        assert!((g.get_t(0.7) - 3.3).abs() < 1e-12);

        g.fits = vec![(0.5, 2.5)];
        assert_eq!(g.get_t(0.0), 2.5);
        g.fits.clear();
        assert_eq!(g.get_t(0.0), 0.0);
    }

    #[test]
    fn empty_group_sorts_to_a_zero_window() {
        let mut g = VoteGroup::new(1);
        g.sort();
        assert_eq!((g.begin, g.end), (0.0, 0.0));
    }
}
