//! Parameter types configuring the tracking stages.
//!
//! This module groups knobs for extraction, frustum clipping, the id
//! raster passes, cross-frame parameter propagation, vote grouping, and
//! stroke span output.
//!
//! Defaults follow the interactive settings the pipeline was tuned with.
//! For coherence tuning, start with the propagation search length and the
//! grouping vote floors.

use serde::{Deserialize, Serialize};

use crate::clip::{ClipOptions, SeamFallback};
use crate::groups::GroupingParams;
use crate::propagate::PropagationParams;
use crate::strokes::StrokeParams;
use crate::types::VisibilityMode;
use crate::visibility::SearchRadii;

use super::flags::RenderFlags;

/// Tracker-wide parameters controlling the per-frame pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerParams {
    /// Visibility strategy for the raster passes.
    pub mode: VisibilityMode,
    /// Line type and visibility combinations carried through to output.
    pub flags: RenderFlags,
    /// Arc distance between visibility probes, in pixels.
    pub vis_sampling_pix: f64,
    /// Crease strips break where consecutive edges bend by more than this
    /// many radians. `None` keeps whole strips regardless of bend.
    pub crease_max_bend_angle: Option<f64>,
    /// Rotate a closed loop's seam onto an extraction break when the loop
    /// has one.
    pub repair_loop_seams: bool,
    /// Seam placement for closed loops with no natural break. `None`
    /// leaves the seam wherever extraction happened to start the loop.
    pub seam_fallback: Option<SeamFallback>,
    /// Breaks narrower than this many pixels are bridged before id
    /// assignment.
    pub join_gap_pix: f64,
    /// Keep a chain as one visible-tagged path across occluded
    /// stretches instead of splitting at every visibility change.
    /// Single channel mode only.
    pub long_paths: bool,
    /// Reference raster resolution as a fraction of the viewport. One
    /// reference pixel covers `1 / raster_scale` screen pixels.
    pub raster_scale: f64,
    /// Depth slack applied when the visible raster pass tests against the
    /// mesh depth plane, in NDC z units.
    pub depth_bias: f64,
    /// Classification search box half-widths. `None` picks the pair
    /// matching the visibility mode.
    pub search_radii: Option<SearchRadii>,
    /// Cross-frame parameter vote search.
    pub propagation: PropagationParams,
    /// Vote grouping, fitting, and healing.
    pub grouping: GroupingParams,
    /// Stroke span emission and next-frame seeding.
    pub strokes: StrokeParams,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            mode: VisibilityMode::default(),
            flags: RenderFlags::default(),
            vis_sampling_pix: 2.0,
            crease_max_bend_angle: None,
            repair_loop_seams: true,
            seam_fallback: Some(SeamFallback::MinX),
            join_gap_pix: 4.0,
            long_paths: false,
            raster_scale: 1.0,
            depth_bias: 1e-3,
            search_radii: None,
            propagation: PropagationParams::default(),
            grouping: GroupingParams::default(),
            strokes: StrokeParams::default(),
        }
    }
}

impl TrackerParams {
    pub fn clip_options(&self) -> ClipOptions {
        ClipOptions {
            mode: self.mode,
            repair_loop_seams: self.repair_loop_seams,
            seam_fallback: self.seam_fallback,
        }
    }

    pub fn radii(&self) -> SearchRadii {
        self.search_radii
            .unwrap_or_else(|| SearchRadii::for_mode(self.mode))
    }

    /// Seed spacing along fitted groups, in NDC units.
    pub fn seed_spacing_ndc(&self, pix_to_ndc: f64) -> f64 {
        self.vis_sampling_pix * pix_to_ndc * self.strokes.seed_step_pix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let params = TrackerParams::default();
        let text = serde_json::to_string(&params).expect("serialize");
        let back: TrackerParams = serde_json::from_str(&text).expect("parse");
        assert_eq!(back.mode, params.mode);
        assert_eq!(back.flags, params.flags);
        assert!((back.vis_sampling_pix - params.vis_sampling_pix).abs() < 1e-12);
        assert_eq!(back.propagation.max_steps, params.propagation.max_steps);
        assert_eq!(back.grouping.min_votes, params.grouping.min_votes);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let params: TrackerParams =
            serde_json::from_str(r#"{"visSamplingPix": 3.0, "mode": "SingleChannel"}"#)
                .expect("parse");
        assert_eq!(params.mode, VisibilityMode::SingleChannel);
        assert!((params.vis_sampling_pix - 3.0).abs() < 1e-12);
        assert_eq!(params.propagation.max_steps, 6);
        assert!((params.grouping.heal_drag_pix - 15.0).abs() < 1e-12);
    }

    #[test]
    fn radii_follow_the_mode_unless_overridden() {
        let mut params = TrackerParams {
            mode: VisibilityMode::SingleChannel,
            ..Default::default()
        };
        assert_eq!(params.radii().visible, 1);
        params.search_radii = Some(SearchRadii {
            visible: 4,
            hidden: 5,
        });
        assert_eq!(params.radii().visible, 4);
        assert_eq!(params.radii().hidden, 5);
    }
}
