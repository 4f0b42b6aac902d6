use serde::Serialize;

use crate::clip::ScreenSegment;

/// Outcome of the zero-crossing walk plus the gradient split.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStage {
    pub elapsed_ms: f64,
    /// Points emitted by the walk before gradient filtering.
    pub raw_points: usize,
    /// Points surviving the front/back gradient split.
    pub split_points: usize,
}

/// Outcome of frustum clipping and seam repair.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipStage {
    pub elapsed_ms: f64,
    pub clipped_points: usize,
    /// Unbroken runs in the clipped stream.
    pub runs: usize,
}

impl ClipStage {
    pub fn from_segments(segs: &[ScreenSegment], elapsed_ms: f64) -> Self {
        let runs = segs.iter().filter(|s| !s.is_edge).count();
        Self {
            elapsed_ms,
            clipped_points: segs.len(),
            runs,
        }
    }
}
