//! Unified diagnostics data model exposed by the tracker and the demos.
//!
//! The module is split into focused submodules to keep individual report
//! structures manageable. `FrameReport` is the main entry point returned
//! by the tracker, bundling the frame's stroke spans with a detailed
//! `FrameTrace` describing every stage the pipeline executed.

pub mod extraction;
pub mod frame;
pub mod paths;
pub mod raster;
pub mod timing;
pub mod tracking;

pub use extraction::{ClipStage, ExtractionStage};
pub use frame::{FrameReport, FrameTrace, InputDescriptor};
pub use paths::{GroupingStage, PathStage, StatusCount};
pub use raster::{RasterStage, VisibilityStage};
pub use timing::{StageTiming, TimingBreakdown};
pub use tracking::{PropagationStage, StrokeStage};
