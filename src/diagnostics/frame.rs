use std::path::PathBuf;

use serde::Serialize;

use crate::diagnostics::{
    ClipStage, ExtractionStage, GroupingStage, PathStage, PropagationStage, RasterStage,
    StrokeStage, TimingBreakdown, VisibilityStage,
};
use crate::types::StrokeSpan;

/// Result produced by
/// [`LineTracker::advance_frame_with_diagnostics`](crate::LineTracker).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    /// Stroke spans emitted for this frame, the crate's consumable output.
    pub spans: Vec<StrokeSpan>,
    pub trace: FrameTrace,
}

/// End-to-end trace describing the internal execution of one frame.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTrace {
    pub input: InputDescriptor,
    pub timings: TimingBreakdown,
    /// Whether the object-to-NDC transform changed since the last frame.
    pub camera_moved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raster: Option<RasterStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<VisibilityStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<PropagationStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strokes: Option<StrokeStage>,
    /// Where the id raster was dumped, when a dump was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raster_dump: Option<PathBuf>,
}

/// Frame inputs as seen by the tracker.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    pub faces: usize,
    pub vertices: usize,
}
