#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod config;
pub mod diagnostics;
pub mod mesh;
pub mod tracker;
pub mod types;

// “Expert” modules – still public, but considered unstable internals.
// (You can tighten or feature-gate these later.)
pub mod clip;
pub mod extract;
pub mod geometry;
pub mod groups;
pub mod paths;
pub mod propagate;
pub mod raster;
pub mod strokes;
pub mod visibility;

// --- High-level re-exports -------------------------------------------------

// Main entry points: tracker + results.
pub use crate::tracker::{LineTracker, RenderFlags, SceneView, TrackerParams, TrackerWorkspace};
pub use crate::types::{LineType, StrokeSpan, Visibility, VisibilityMode};

// High-level diagnostics returned by the tracker.
pub use crate::diagnostics::{FrameReport, FrameTrace};

// Mesh collaborators most callers touch.
pub use crate::mesh::{Surface, TriMesh};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use line_tracker::prelude::*;
/// use nalgebra::{Matrix4, Point3};
///
/// # fn main() {
/// let mesh = TriMesh::new(
///     vec![
///         Point3::new(-1.0, -1.0, 0.5),
///         Point3::new(1.0, -1.0, 0.5),
///         Point3::new(1.0, 1.0, 0.5),
///     ],
///     vec![[0, 1, 2]],
/// );
///
/// let mut tracker = LineTracker::new(TrackerParams::default());
/// let scene = SceneView {
///     surface: &mesh,
///     obj_to_ndc: Matrix4::identity(),
///     viewport: Viewport::new(640, 480, Point3::new(0.0, 0.0, 5.0)),
///     way_paths: &[],
///     polylines: &[],
/// };
///
/// let report = tracker.advance_frame_with_diagnostics(&scene);
/// println!(
///     "spans={} latency_ms={:.3}",
///     report.spans.len(),
///     report.trace.timings.total_ms
/// );
/// # }
/// ```
pub mod prelude {
    pub use crate::geometry::Viewport;
    pub use crate::mesh::{Surface, TriMesh};
    pub use crate::{FrameReport, LineTracker, SceneView, StrokeSpan, TrackerParams};
}

// --- Stage-level diagnostics API (for tools & advanced users) --------------

pub mod stages {
    // Structured diagnostics types.
    pub use crate::diagnostics::{
        ClipStage, ExtractionStage, GroupingStage, InputDescriptor, PathStage, PropagationStage,
        RasterStage, StageTiming, StatusCount, StrokeStage, TimingBreakdown, VisibilityStage,
    };
}
