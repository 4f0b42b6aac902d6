//! Parameter-fit styles for vote groups.
//!
//! A fit turns a group's votes into the piecewise-linear `s -> t` table
//! consumed by [`VoteGroup::get_t`]. Styles trade temporal coherence
//! against smoothness: the cheap styles ignore votes entirely, the
//! optimizing style solves a regularized least-squares system over
//! evenly spaced knots.

use nalgebra::{DMatrix, DVector};

use crate::types::{FitStatus, VoteStatus};

use super::{FitStyle, GroupingParams, VoteGroup};

/// Parameter change per NDC unit of arc length.
///
/// `stretch` is the inverse of the expected screen-size ratio against the
/// reference frame, so a zoomed-in path keeps its pixel-space period.
pub fn parameter_freq(stretch: f64, pix_to_ndc: f64, offset_pix_len: f64) -> f64 {
    debug_assert!(pix_to_ndc > 0.0 && offset_pix_len > 0.0);
    stretch / (pix_to_ndc * offset_pix_len)
}

/// Fit every good group for the first time this frame.
pub fn fit_initial(groups: &mut [VoteGroup], params: &GroupingParams, freq: f64, pix_to_ndc: f64) {
    for g in groups.iter_mut() {
        if !g.status.is_good() {
            continue;
        }
        debug_assert_eq!(g.fit_status, FitStatus::None);
        fit_group(g, params, freq, pix_to_ndc);
    }
}

/// Refit good groups whose fit went stale during coverage or culling.
pub fn fit_final(groups: &mut [VoteGroup], params: &GroupingParams, freq: f64, pix_to_ndc: f64) {
    for g in groups.iter_mut() {
        if !g.status.is_good() || g.fit_status == FitStatus::Good {
            continue;
        }
        g.fit_status = FitStatus::None;
        g.fits.clear();
        fit_group(g, params, freq, pix_to_ndc);
    }
}

/// Dispatch on the configured style; voteless groups always follow arc length.
pub(super) fn fit_group(g: &mut VoteGroup, params: &GroupingParams, freq: f64, pix_to_ndc: f64) {
    if g.num() == 0 {
        arclength_fit(g, freq);
        return;
    }
    match params.fit_style {
        FitStyle::Random => random_fit(g, freq),
        FitStyle::Sigma => sigma_fit(g, freq),
        FitStyle::Arclength => arclength_fit(g, freq),
        FitStyle::Phasing => phasing_fit(g, freq),
        FitStyle::Interpolating => interpolating_fit(g, freq),
        FitStyle::Optimizing => optimizing_fit(g, params, freq, pix_to_ndc),
    }
}

/// Start the parameter at a phase derived from the group id.
pub(super) fn random_fit(g: &mut VoteGroup, freq: f64) {
    let phase = hashed_phase(g.id);
    g.fits.push((g.begin, phase));
    g.fits.push((g.end, phase + g.span() * freq));
    g.fit_status = FitStatus::Good;
}

/// Restart the parameter at zero on every group.
pub(super) fn sigma_fit(g: &mut VoteGroup, freq: f64) {
    g.fits.push((g.begin, 0.0));
    g.fits.push((g.end, g.span() * freq));
    g.fit_status = FitStatus::Good;
}

/// Follow path arc length, ignoring the votes.
pub(super) fn arclength_fit(g: &mut VoteGroup, freq: f64) {
    g.fits.push((g.begin, g.begin * freq));
    g.fits.push((g.end, g.end * freq));
    g.fit_status = FitStatus::Good;
}

/// Single phase offset from the circular mean of the vote phases.
///
/// The circular mean is only unique modulo one, so the integer part of
/// the linear mean is added back to keep the fit near the actual votes.
pub(super) fn phasing_fit(g: &mut VoteGroup, freq: f64) {
    use std::f64::consts::TAU;

    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    let mut phase_ave = 0.0;
    let mut count = 0usize;
    for v in &g.votes {
        if v.status == VoteStatus::Outlier {
            continue;
        }
        let phase_i = v.t - v.s * freq;
        sin_sum += (phase_i * TAU).sin();
        cos_sum += (phase_i * TAU).cos();
        phase_ave += phase_i;
        count += 1;
    }
    if count == 0 {
        log::debug!("phasing fit on group {} with only outliers", g.id);
        arclength_fit(g, freq);
        return;
    }
    phase_ave /= count as f64;

    let mut phase = sin_sum.atan2(cos_sum);
    if phase < 0.0 {
        phase += TAU;
    }
    phase /= TAU;
    phase += phase_ave.floor();

    // Cover the votes even when they spill past the group window.
    let s_begin = g.begin.min(g.votes[0].s);
    let s_end = g.end.max(g.votes[g.num() - 1].s);

    g.fits.push((s_begin, s_begin * freq + phase));
    g.fits.push((s_end, s_end * freq + phase));
    g.fit_status = FitStatus::Good;
}

/// Piecewise-linear table straight through the votes.
///
/// The window ends extend the fit at the expected frequency. Any
/// backwards step among the votes marks the whole fit backwards.
pub(super) fn interpolating_fit(g: &mut VoteGroup, freq: f64) {
    let first = g.votes[0];
    let last = g.votes[g.num() - 1];
    let t_begin = first.t + freq * (g.begin - first.s);
    let t_end = last.t + freq * (g.end - last.s);

    let mut bad = false;
    let mut t_last = f64::NEG_INFINITY;
    if g.begin < first.s {
        g.fits.push((g.begin, t_begin));
    }
    for v in &g.votes {
        debug_assert_eq!(v.status, VoteStatus::Good);
        g.fits.push((v.s, v.t));
        if v.t < t_last {
            bad = true;
        }
        t_last = v.t;
    }
    if g.end > last.s {
        g.fits.push((g.end, t_end));
    }

    g.fit_status = if bad {
        FitStatus::Backwards
    } else {
        FitStatus::Good
    };
}

/// Regularized least-squares fit over evenly spaced knots.
///
/// Minimizes vote residuals plus a stretch term pulling knot offsets
/// toward their mean and a distortion term penalizing second
/// differences. Healer votes carry their own weight and are not
/// normalized by the vote count. A singular system falls back to the
/// arc-length fit.
pub(super) fn optimizing_fit(g: &mut VoteGroup, params: &GroupingParams, freq: f64, pix_to_ndc: f64) {
    let nv = g.num();
    let begin = g.begin.min(g.votes[0].s);
    let end = g.end.max(g.votes[nv - 1].s);
    let span = end - begin;
    if span <= 0.0 {
        arclength_fit(g, freq);
        return;
    }

    let n = ((span / pix_to_ndc / params.fit_pix_spacing).ceil()).max(2.0) as usize;
    let delta = span / (n as f64 - 1.0);
    let inv_num = 1.0 / nv as f64;

    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut d = DVector::<f64>::zeros(n);

    let mut i = 0usize;
    while i < nv && g.votes[i].s < begin {
        i += 1;
    }

    // Each vote contributes to the two knots bracketing it: once to the
    // left knot's row while that knot looks ahead, once to the right
    // knot's row while it looks back.
    let mut x_prev = 0.0;
    let mut x_prev_d = 0.0;
    for j in 0..n {
        if j > 0 {
            while i < nv && g.votes[i].s <= x_prev_d {
                let v = g.votes[i];
                debug_assert!(v.s >= x_prev);
                if v.status != VoteStatus::Outlier {
                    let y = v.t - v.s * freq;
                    let tij = (v.s - x_prev) / delta;
                    let (w, weight) = if v.status == VoteStatus::Healer {
                        (1.0, params.weight_heal)
                    } else {
                        (inv_num, params.weight_fit)
                    };
                    let factor = weight * 2.0 * w * tij;
                    a[(j, j - 1)] += factor * (1.0 - tij);
                    a[(j, j)] += factor * tij;
                    d[j] += factor * y;
                }
                i += 1;
            }
        }

        let xj = begin + j as f64 * delta;
        let xjd = xj + delta;
        if j < n - 1 {
            let i0 = i;
            while i < nv && g.votes[i].s <= xjd {
                let v = g.votes[i];
                debug_assert!(v.s >= xj);
                if v.status != VoteStatus::Outlier {
                    let y = v.t - v.s * freq;
                    let tij = (v.s - xj) / delta;
                    let (w, weight) = if v.status == VoteStatus::Healer {
                        (1.0, params.weight_heal)
                    } else {
                        (inv_num, params.weight_fit)
                    };
                    let factor = weight * 2.0 * w * (1.0 - tij);
                    a[(j, j)] += factor * (1.0 - tij);
                    a[(j, j + 1)] += factor * tij;
                    d[j] += factor * y;
                }
                i += 1;
            }
            i = i0;
        }
        x_prev = xj;
        x_prev_d = xjd;

        let f_scale = 2.0 * params.weight_scale / (n * n) as f64;
        for k in 0..n {
            a[(j, k)] -= f_scale;
        }
        a[(j, j)] += n as f64 * f_scale;

        let f_distort = 2.0 * params.weight_distort / n as f64;
        if j > 1 {
            a[(j, j - 2)] += f_distort;
            a[(j, j - 1)] -= 2.0 * f_distort;
            a[(j, j)] += f_distort;
        }
        if j > 0 && j < n - 1 {
            a[(j, j - 1)] -= 2.0 * f_distort;
            a[(j, j)] += 4.0 * f_distort;
            a[(j, j + 1)] -= 2.0 * f_distort;
        }
        if j < n - 2 {
            a[(j, j)] += f_distort;
            a[(j, j + 1)] -= 2.0 * f_distort;
            a[(j, j + 2)] += f_distort;
        }
    }

    match a.lu().solve(&d) {
        Some(x) => {
            let mut bad = false;
            let mut t_prev = f64::NEG_INFINITY;
            for j in 0..n {
                let xj = begin + j as f64 * delta;
                let tj = x[j] + xj * freq;
                if tj < t_prev {
                    bad = true;
                }
                g.fits.push((xj, tj));
                t_prev = tj;
            }
            g.fit_status = if bad {
                FitStatus::Backwards
            } else {
                FitStatus::Good
            };
        }
        None => {
            log::debug!(
                "optimizing fit singular for group {}, falling back to arc length",
                g.id
            );
            arclength_fit(g, freq);
        }
    }
}

/// Phase in [0, 1) mixed from the group id.
fn hashed_phase(id: u32) -> f64 {
    let mut z = (id as u64).wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamVote;

    fn group_with(sts: &[(f64, f64)]) -> VoteGroup {
        let mut g = VoteGroup::new(42);
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
    fn cheap_fits_have_the_expected_tables() {
        let mut g = group_with(&[(0.2, 0.0), (0.6, 0.0)]);
        sigma_fit(&mut g, 10.0);
        assert_eq!(g.fits, vec![(0.2, 0.0), (0.6, 4.0)]);
        assert_eq!(g.fit_status, FitStatus::Good);

        let mut g = group_with(&[(0.2, 0.0), (0.6, 0.0)]);
        arclength_fit(&mut g, 10.0);
        assert_eq!(g.fits, vec![(0.2, 2.0), (0.6, 6.0)]);
        assert_eq!(g.fit_status, FitStatus::Good);
    }

    #[test]
    fn random_phase_is_deterministic_and_in_range() {
        let p1 = hashed_phase(7);
        let p2 = hashed_phase(7);
        let p3 = hashed_phase(8);
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
        assert!((0.0..1.0).contains(&p1));
        assert!((0.0..1.0).contains(&p3));
    }

    #[test]
    fn phasing_recovers_a_constant_phase_offset() {
        let freq = 10.0;
        let phase = 2.25;
        let mut g = group_with(&[
            (0.1, 0.1 * freq + phase),
            (0.2, 0.2 * freq + phase),
            (0.3, 0.3 * freq + phase),
        ]);
        phasing_fit(&mut g, freq);
        assert_eq!(g.fit_status, FitStatus::Good);
        assert_eq!(g.fits.len(), 2);
        assert!((g.fits[0].1 - (0.1 * freq + phase)).abs() < 1e-9);
        assert!((g.fits[1].1 - (0.3 * freq + phase)).abs() < 1e-9);
    }

    #[test]
    fn interpolating_extends_the_window_and_flags_backtracks() {
        let mut g = group_with(&[(0.2, 1.0), (0.3, 1.5), (0.4, 2.0)]);
        g.begin = 0.1;
        g.end = 0.5;
        interpolating_fit(&mut g, 5.0);
        assert_eq!(g.fit_status, FitStatus::Good);
        assert_eq!(g.fits.len(), 5);
        assert!((g.fits[0].1 - 0.5).abs() < 1e-12);
        assert!((g.fits[4].1 - 2.5).abs() < 1e-12);

        let mut g = group_with(&[(0.2, 1.0), (0.3, 0.5), (0.4, 2.0)]);
        interpolating_fit(&mut g, 5.0);
        assert_eq!(g.fit_status, FitStatus::Backwards);
    }

    #[test]
    fn optimizing_reproduces_a_clean_linear_parameterization() {
        let freq = 10.0;
        let offset = 0.5;
        let sts: Vec<(f64, f64)> = (0..9)
            .map(|k| {
                let s = k as f64 * 0.05;
                (s, s * freq + offset)
            })
            .collect();
        let mut g = group_with(&sts);
        let params = GroupingParams::default();
        optimizing_fit(&mut g, &params, freq, 0.01);

        assert_eq!(g.fit_status, FitStatus::Good);
        assert_eq!(g.fits.len(), 5);
        for &(s, t) in &g.fits {
            assert!((t - (s * freq + offset)).abs() < 1e-6, "knot at {s} off: {t}");
        }
    }

    #[test]
    fn degenerate_window_falls_back_to_arc_length() {
        let mut g = group_with(&[(0.3, 1.0), (0.3, 1.1)]);
        let params = GroupingParams::default();
        optimizing_fit(&mut g, &params, 10.0, 0.01);
        assert_eq!(g.fit_status, FitStatus::Good);
        assert_eq!(g.fits, vec![(0.3, 3.0), (0.3, 3.0)]);
    }

    #[test]
    fn final_fit_reuses_good_fits_and_replaces_stale_ones() {
        let params = GroupingParams {
            fit_style: FitStyle::Sigma,
            ..GroupingParams::default()
        };
        let mut good = group_with(&[(0.0, 0.0), (0.4, 0.0)]);
        good.fits = vec![(0.0, 7.0), (0.4, 8.0)];
        good.fit_status = FitStatus::Good;
        let mut stale = group_with(&[(0.0, 0.0), (0.4, 0.0)]);
        stale.fits = vec![(0.0, 7.0), (0.4, 8.0)];
        stale.fit_status = FitStatus::Stale;

        let mut groups = vec![good, stale];
        fit_final(&mut groups, &params, 10.0, 0.01);

        assert_eq!(groups[0].fits, vec![(0.0, 7.0), (0.4, 8.0)]);
        assert_eq!(groups[1].fits, vec![(0.0, 0.0), (0.4, 4.0)]);
        assert_eq!(groups[1].fit_status, FitStatus::Good);
    }
}
