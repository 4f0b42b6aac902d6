use serde::Serialize;

use crate::paths::PathSet;
use crate::types::GroupStatus;

/// Outcome of path assembly.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStage {
    pub elapsed_ms: f64,
    pub paths: usize,
    pub closed_paths: usize,
    pub points: usize,
}

impl PathStage {
    pub fn from_paths(paths: &PathSet, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            paths: paths.len(),
            closed_paths: paths.iter().filter(|p| p.is_closed()).count(),
            points: paths.iter().map(|p| p.num_points()).sum(),
        }
    }
}

/// Count of vote groups sharing one terminal status.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: GroupStatus,
    pub count: usize,
}

/// Outcome of the vote grouping and fitting pipeline.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingStage {
    pub elapsed_ms: f64,
    pub groups: usize,
    pub good_groups: usize,
    /// Terminal statuses with at least one group, in enum order.
    pub histogram: Vec<StatusCount>,
}

impl GroupingStage {
    pub fn from_paths(paths: &PathSet, elapsed_ms: f64) -> Self {
        const ALL: [GroupStatus; 15] = [
            GroupStatus::Good,
            GroupStatus::LowLength,
            GroupStatus::LowVotes,
            GroupStatus::BadDensity,
            GroupStatus::SplitLoop,
            GroupStatus::SplitLargeDelta,
            GroupStatus::SplitGap,
            GroupStatus::CullBackwards,
            GroupStatus::SplitAllBacktrack,
            GroupStatus::FitBackwards,
            GroupStatus::FinalFitBackwards,
            GroupStatus::NotMajority,
            GroupStatus::NotOneToOne,
            GroupStatus::NotHybrid,
            GroupStatus::Healed,
        ];
        let mut counts = [0usize; 15];
        let mut groups = 0usize;
        for path in paths.iter() {
            for group in &path.groups {
                groups += 1;
                if let Some(slot) = ALL.iter().position(|s| *s == group.status) {
                    counts[slot] += 1;
                }
            }
        }
        let histogram = ALL
            .iter()
            .zip(counts.iter())
            .filter(|(_, c)| **c > 0)
            .map(|(s, c)| StatusCount {
                status: *s,
                count: *c,
            })
            .collect();
        Self {
            elapsed_ms,
            groups,
            good_groups: counts[0],
            histogram,
        }
    }
}
