//! Per-frame tracker state and reusable scratch buffers.
//!
//! `FrameContext` carries everything that survives from one frame to the
//! next: the frame stamp, the id allocator, the seed samples laid down by
//! the previous frame, the reference apparent size, and the last object
//! transform. `TrackerWorkspace` holds the per-frame segment buffers so
//! steady-state frames allocate nothing new.

use nalgebra::Matrix4;

use crate::clip::ScreenSegment;
use crate::extract::RawSegment;
use crate::raster::encoding::IdAllocator;
use crate::types::PathSample;
use crate::visibility::RunLengths;

/// Cross-frame tracker state.
#[derive(Clone, Debug, Default)]
pub struct FrameContext {
    /// Frames processed so far; stamps id words and path sets.
    pub frame: u64,
    pub alloc: IdAllocator,
    /// Seed samples generated at the end of the previous frame.
    pub seeds: Vec<PathSample>,
    /// Apparent mesh size captured on the first frame; the stretch of
    /// every later frame is measured against it.
    pub reference_size: Option<f64>,
    /// Object-to-NDC transform of the previous frame.
    pub old_obj_to_ndc: Option<Matrix4<f64>>,
}

impl FrameContext {
    /// Whether `obj_to_ndc` differs from the previous frame's transform.
    /// The first frame counts as moved.
    pub fn camera_moved(&self, obj_to_ndc: &Matrix4<f64>) -> bool {
        match &self.old_obj_to_ndc {
            Some(old) => old != obj_to_ndc,
            None => true,
        }
    }
}

/// Workspace storing per-frame segment buffers to avoid repeated
/// allocations.
#[derive(Debug, Default)]
pub struct TrackerWorkspace {
    /// Per-face marker for the silhouette walk.
    pub visited: Vec<bool>,
    /// Extraction output before the gradient split.
    pub raw: Vec<RawSegment>,
    /// Gradient-split runs fed to the clipper.
    pub split: Vec<RawSegment>,
    /// Clipped reference stream.
    pub clipped: Vec<ScreenSegment>,
    /// Identifier run lengths for the current frame.
    pub run_lengths: RunLengths,
}

impl TrackerWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every buffer and sizes the face marker for `faces` entries.
    pub fn reset(&mut self, faces: usize) {
        if self.visited.len() != faces {
            self.visited.resize(faces, false);
        }
        self.visited.fill(false);
        self.raw.clear();
        self.split.clear();
        self.clipped.clear();
        self.run_lengths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_buffers_and_sizes_markers() {
        let mut ws = TrackerWorkspace::new();
        ws.visited = vec![true; 4];
        ws.run_lengths.insert(0x0100, 1.0);
        ws.reset(6);
        assert_eq!(ws.visited.len(), 6);
        assert!(ws.visited.iter().all(|v| !v));
        assert!(ws.run_lengths.is_empty());
        ws.reset(2);
        assert_eq!(ws.visited.len(), 2);
    }

    #[test]
    fn first_frame_counts_as_camera_motion() {
        let mut ctx = FrameContext::default();
        let xf = Matrix4::identity();
        assert!(ctx.camera_moved(&xf));
        ctx.old_obj_to_ndc = Some(xf);
        assert!(!ctx.camera_moved(&xf));
        assert!(ctx.camera_moved(&(xf * 2.0)));
    }
}
