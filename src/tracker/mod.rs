//! Line tracker orchestrating extraction, visibility, and correspondence.
//!
//! Overview
//! - Walks the surface for silhouette zero crossings and collects crease,
//!   border, way-path, and polyline strips into one raw stream.
//! - Splits silhouette runs by their view-gradient side, clips everything
//!   to the frustum, and repairs closed-loop seams.
//! - Assigns identifier runs, rasterizes them into a CPU id buffer over a
//!   mesh depth plane, and classifies resampled points by read-back.
//! - Assembles classified points into screen paths, then lets seed
//!   samples from the previous frame vote their arclength parameters onto
//!   the new paths.
//! - Groups votes, fits a monotone old-to-new parameter map per group,
//!   heals adjacent fits, emits stroke spans, and lays down the next
//!   frame's seeds.
//!
//! Modules
//! - [`flags`] - the render-flag matrix gating types and visibilities.
//! - [`params`] - configuration types used by the tracker and CLI.
//! - `context` - cross-frame state and reusable scratch buffers.
//! - `pipeline` - the main [`LineTracker`] implementation.
//!
//! Key ideas
//! - Identifier words double as arclength codes: the raster answers
//!   "which run, where along it" at any pixel.
//! - Visibility is a per-sample read-back decision, so a path changes
//!   class without losing its identity.
//! - Correspondence never matches curves globally; it accumulates local
//!   votes and lets monotone fits arbitrate.

mod context;
pub mod flags;
pub mod params;
mod pipeline;

pub use context::{FrameContext, TrackerWorkspace};
pub use flags::{RenderFlags, VisFlags};
pub use params::TrackerParams;
pub use pipeline::{LineTracker, SceneView};
