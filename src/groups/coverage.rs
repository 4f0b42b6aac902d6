//! Coverage negotiation: which group owns which stretch of a path.
//!
//! After pruning, a path may hold several good groups with overlapping
//! or gapped windows. Coverage resolves them into a disjoint tiling of
//! `[0, path_len]`. Window changes that move past a group's votes mark
//! its fit stale so the final fit pass rebuilds it.

use std::cmp::Ordering;

use crate::paths::gen_stroke_id;
use crate::types::{FitStatus, GroupStatus};

use super::{CoveragePolicy, VoteGroup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundaryKind {
    Start,
    End,
    /// Pair discarded by the narrow-coverage cull.
    Bad,
}

#[derive(Clone, Copy, Debug)]
struct CoverageBoundary {
    group: usize,
    s: f64,
    kind: BoundaryKind,
}

/// Starts sort before ends at the same arc position.
fn coverage_comp(a: &CoverageBoundary, b: &CoverageBoundary) -> Ordering {
    match a.s.total_cmp(&b.s) {
        Ordering::Equal => match (a.kind, b.kind) {
            (BoundaryKind::Start, BoundaryKind::End) => Ordering::Less,
            (BoundaryKind::End, BoundaryKind::Start) => Ordering::Greater,
            _ => Ordering::Equal,
        },
        other => other,
    }
}

pub fn apply(groups: &mut Vec<VoteGroup>, policy: CoveragePolicy, path_len: f64, min_len: f64) {
    match policy {
        CoveragePolicy::Majority => majority_cover(groups, path_len),
        CoveragePolicy::OneToOne => one_to_one_cover(groups, path_len, min_len),
        CoveragePolicy::Trimmed => hybrid_cover(groups, path_len, min_len),
    }
}

/// The group with the most votes takes the whole path.
pub(super) fn majority_cover(groups: &mut Vec<VoteGroup>, path_len: f64) {
    let mut max_ind: Option<usize> = None;
    let mut max_votes = 0usize;
    for (i, g) in groups.iter_mut().enumerate() {
        if !g.status.is_good() {
            continue;
        }
        g.status = GroupStatus::NotMajority;
        if g.num() > max_votes {
            max_ind = Some(i);
            max_votes = g.num();
        }
    }

    match max_ind {
        Some(i) => {
            let g = &mut groups[i];
            g.status = GroupStatus::Good;
            if 0.0 < g.begin && 0.0 < g.votes[0].s && g.fit_status != FitStatus::None {
                g.fit_status = FitStatus::Stale;
            }
            g.begin = 0.0;
            if path_len > g.end && path_len > g.votes[g.num() - 1].s && g.fit_status != FitStatus::None
            {
                g.fit_status = FitStatus::Stale;
            }
            g.end = path_len;
        }
        None => push_voteless(groups, path_len),
    }
}

/// Groups keep their windows; holes split at vote-weighted midpoints.
pub(super) fn one_to_one_cover(groups: &mut Vec<VoteGroup>, path_len: f64, min_len: f64) {
    let mut final_boundary: Vec<CoverageBoundary> = Vec::new();
    for (i, g) in groups.iter_mut().enumerate() {
        if !g.status.is_good() {
            continue;
        }
        if g.span() < min_len {
            g.status = GroupStatus::NotOneToOne;
        } else {
            final_boundary.push(CoverageBoundary {
                group: i,
                s: g.begin,
                kind: BoundaryKind::Start,
            });
            final_boundary.push(CoverageBoundary {
                group: i,
                s: g.end,
                kind: BoundaryKind::End,
            });
        }
    }

    let n = final_boundary.len();
    if n > 0 {
        final_boundary.sort_by(coverage_comp);
        debug_assert_eq!(final_boundary[0].kind, BoundaryKind::Start);
    }

    // Sweep the boundaries with a nesting counter; a count of zero
    // between an end and the next start is a hole to divide.
    let mut cnt = 1i32;
    for i in 1..n {
        if cnt == 0 {
            debug_assert_eq!(final_boundary[i - 1].kind, BoundaryKind::End);
            debug_assert_eq!(final_boundary[i].kind, BoundaryKind::Start);

            let del = final_boundary[i].s - final_boundary[i - 1].s;
            if del > 0.0 {
                let ia = final_boundary[i - 1].group;
                let ib = final_boundary[i].group;
                let na = groups[ia].num() as f64;
                let nb = groups[ib].num() as f64;
                let s = groups[ia].end + del * na / (na + nb);

                let gb = &mut groups[ib];
                if s < gb.begin && s < gb.votes[0].s && gb.fit_status != FitStatus::None {
                    gb.fit_status = FitStatus::Stale;
                }
                gb.begin = s;

                let ga = &mut groups[ia];
                if ga.end < s && ga.votes[ga.num() - 1].s < s && ga.fit_status != FitStatus::None {
                    ga.fit_status = FitStatus::Stale;
                }
                ga.end = s;
            }
            cnt += 1;
        } else if final_boundary[i].kind == BoundaryKind::Start {
            cnt += 1;
        } else {
            debug_assert_eq!(final_boundary[i].kind, BoundaryKind::End);
            cnt -= 1;
        }
    }

    if cnt == 0 {
        let first = final_boundary[0];
        let last = final_boundary[n - 1];
        debug_assert_eq!(first.kind, BoundaryKind::Start);
        debug_assert_eq!(last.kind, BoundaryKind::End);

        let gf = &mut groups[first.group];
        if 0.0 < gf.begin && 0.0 < gf.votes[0].s && gf.fit_status != FitStatus::None {
            gf.fit_status = FitStatus::Stale;
        }
        gf.begin = 0.0;

        let gl = &mut groups[last.group];
        if gl.end < path_len && gl.votes[gl.num() - 1].s < path_len && gl.fit_status != FitStatus::None
        {
            gl.fit_status = FitStatus::Stale;
        }
        gl.end = path_len;
    } else {
        debug_assert_eq!(cnt, 1);
        push_voteless(groups, path_len);
    }
}

/// Confidence-ordered trimming.
///
/// Overlaps go to the group covering the larger fraction of the path;
/// a displaced group stays a candidate and may resume covering later,
/// which segments it into several final windows. Windows narrower than
/// `min_len` are dropped, remaining holes split at length-weighted
/// midpoints.
pub(super) fn hybrid_cover(groups: &mut Vec<VoteGroup>, path_len: f64, min_len: f64) {
    let mut boundary: Vec<CoverageBoundary> = Vec::new();
    for (i, g) in groups.iter_mut().enumerate() {
        if !g.status.is_good() {
            continue;
        }
        boundary.push(CoverageBoundary {
            group: i,
            s: g.begin,
            kind: BoundaryKind::Start,
        });
        boundary.push(CoverageBoundary {
            group: i,
            s: g.end,
            kind: BoundaryKind::End,
        });
        g.confidence = g.span() / path_len;
        g.status = GroupStatus::NotHybrid;
    }

    let mut final_boundary: Vec<CoverageBoundary> = Vec::new();
    if !boundary.is_empty() {
        boundary.sort_by(coverage_comp);
        debug_assert_eq!(boundary[0].kind, BoundaryKind::Start);

        // Indices of groups whose window contains the sweep position;
        // the front entry is the one currently covering.
        let mut candidates: Vec<usize> = Vec::new();
        final_boundary.push(boundary[0]);
        candidates.push(boundary[0].group);

        for cb in &boundary[1..] {
            let in_gap = matches!(final_boundary.last(), Some(b) if b.kind == BoundaryKind::End);
            if in_gap {
                debug_assert!(candidates.is_empty());
                debug_assert_eq!(cb.kind, BoundaryKind::Start);
                final_boundary.push(*cb);
                candidates.push(cb.group);
            } else if cb.kind == BoundaryKind::End {
                if cb.group != candidates[0] {
                    if let Some(pos) = candidates.iter().position(|&g| g == cb.group) {
                        candidates.remove(pos);
                    }
                } else {
                    final_boundary.push(*cb);
                    candidates.remove(0);
                    if !candidates.is_empty() {
                        candidates.sort_by(|&x, &y| {
                            groups[y].confidence.total_cmp(&groups[x].confidence)
                        });
                        final_boundary.push(CoverageBoundary {
                            group: candidates[0],
                            s: cb.s,
                            kind: BoundaryKind::Start,
                        });
                    }
                }
            } else if groups[cb.group].confidence <= groups[candidates[0]].confidence {
                candidates.push(cb.group);
            } else {
                final_boundary.push(CoverageBoundary {
                    group: candidates[0],
                    s: cb.s,
                    kind: BoundaryKind::End,
                });
                candidates.insert(0, cb.group);
                final_boundary.push(*cb);
            }
        }

        let pairs = final_boundary.len() / 2;
        for i in 0..pairs {
            if final_boundary[2 * i + 1].s - final_boundary[2 * i].s < min_len {
                final_boundary[2 * i].kind = BoundaryKind::Bad;
                final_boundary[2 * i + 1].kind = BoundaryKind::Bad;
            }
        }
    }

    // Stretch the surviving windows over the holes, splitting each hole
    // at the length-weighted midpoint of its neighbors.
    let pairs = final_boundary.len() / 2;
    let mut prev: Option<usize> = None;
    let mut prev_len = 0.0;
    for i in 0..pairs {
        if final_boundary[2 * i].kind == BoundaryKind::Bad {
            continue;
        }
        let i_len = final_boundary[2 * i + 1].s - final_boundary[2 * i].s;
        match prev {
            None => final_boundary[2 * i].s = 0.0,
            Some(p) => {
                let del = final_boundary[2 * i].s - final_boundary[2 * p + 1].s;
                if del > 0.0 {
                    let s = final_boundary[2 * p + 1].s + del * prev_len / (prev_len + i_len);
                    final_boundary[2 * p + 1].s = s;
                    final_boundary[2 * i].s = s;
                }
            }
        }
        prev = Some(i);
        prev_len = i_len;
    }

    match prev {
        Some(last) => {
            final_boundary[2 * last + 1].s = path_len;

            for i in 0..pairs {
                if final_boundary[2 * i].kind == BoundaryKind::Bad {
                    continue;
                }
                let gidx = final_boundary[2 * i].group;
                let b = final_boundary[2 * i].s;
                let e = final_boundary[2 * i + 1].s;

                if groups[gidx].status == GroupStatus::NotHybrid {
                    let g = &mut groups[gidx];
                    if b < g.begin && b < g.votes[0].s && g.fit_status != FitStatus::None {
                        g.fit_status = FitStatus::Stale;
                    }
                    g.begin = b;
                    if g.end < e && g.votes[g.num() - 1].s < e && g.fit_status != FitStatus::None {
                        g.fit_status = FitStatus::Stale;
                    }
                    g.end = e;
                    g.status = GroupStatus::Good;
                } else {
                    // Second window of a segmented group: clone its votes
                    // into a fresh group that fit_final will parameterize.
                    let mut ng = VoteGroup::new(gen_stroke_id());
                    ng.votes = groups[gidx].votes.clone();
                    ng.begin = b;
                    ng.end = e;
                    groups.push(ng);
                }
            }
        }
        None => push_voteless(groups, path_len),
    }
}

fn push_voteless(groups: &mut Vec<VoteGroup>, path_len: f64) {
    let mut ng = VoteGroup::new(gen_stroke_id());
    ng.begin = 0.0;
    ng.end = path_len;
    groups.push(ng);
}
