use serde::Serialize;

use crate::clip::ScreenSegment;
use crate::types::Visibility;

/// Outcome of the id raster passes.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterStage {
    pub elapsed_ms: f64,
    /// Portion of `elapsed_ms` spent filling the mesh depth plane.
    pub depth_fill_ms: f64,
    pub width: usize,
    pub height: usize,
    /// Identifier runs assigned this frame.
    pub id_runs: usize,
}

/// Classification counts after resampling and raster read-back.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityStage {
    pub elapsed_ms: f64,
    pub sampled_points: usize,
    pub visible: usize,
    pub hidden: usize,
    pub occluded: usize,
}

impl VisibilityStage {
    pub fn from_segments(segs: &[ScreenSegment], elapsed_ms: f64) -> Self {
        let mut stage = Self {
            elapsed_ms,
            sampled_points: segs.len(),
            visible: 0,
            hidden: 0,
            occluded: 0,
        };
        for seg in segs {
            match seg.vis {
                Visibility::Visible => stage.visible += 1,
                Visibility::Hidden => stage.hidden += 1,
                Visibility::Occluded => stage.occluded += 1,
                _ => {}
            }
        }
        stage
    }
}
