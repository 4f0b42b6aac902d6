use serde::Serialize;

use crate::propagate::PropagationReport;
use crate::types::StrokeSpan;

/// Outcome of the cross-frame vote search.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationStage {
    pub elapsed_ms: f64,
    /// Seed samples carried over from the previous frame.
    pub samples: usize,
    /// Expired before the search ran.
    pub culled: usize,
    /// Searched without finding a trustworthy line.
    pub missed: usize,
    pub voted: usize,
}

impl PropagationStage {
    pub fn from_report(report: &PropagationReport, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            samples: report.samples,
            culled: report.culled,
            missed: report.missed,
            voted: report.voted,
        }
    }
}

/// Outcome of span emission and next-frame seeding.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStage {
    pub elapsed_ms: f64,
    pub spans: usize,
    pub span_points: usize,
    /// Seed samples laid down for the next frame.
    pub seeds: usize,
}

impl StrokeStage {
    pub fn from_spans(spans: &[StrokeSpan], seeds: usize, elapsed_ms: f64) -> Self {
        Self {
            elapsed_ms,
            spans: spans.len(),
            span_points: spans.iter().map(|s| s.points.len()).sum(),
            seeds,
        }
    }
}
