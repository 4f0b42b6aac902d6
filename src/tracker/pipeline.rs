//! Frame pipeline driving line extraction and tracking end-to-end.
//!
//! The [`LineTracker`] exposes a simple API: feed a scene view and get the
//! frame's stroke spans with detailed diagnostics. Internally it
//! coordinates the zero-crossing silhouette walk, gradient splitting,
//! frustum clipping, the id raster passes, visibility classification,
//! path assembly, cross-frame parameter propagation, vote grouping, and
//! span emission.
//!
//! Typical usage:
//! ```no_run
//! use line_tracker::{LineTracker, SceneView, TrackerParams};
//! use line_tracker::geometry::Viewport;
//! use line_tracker::mesh::TriMesh;
//! use nalgebra::{Matrix4, Point3};
//!
//! # fn example(mesh: TriMesh) {
//! let mut tracker = LineTracker::new(TrackerParams::default());
//! let scene = SceneView {
//!     surface: &mesh,
//!     obj_to_ndc: Matrix4::identity(),
//!     viewport: Viewport::new(640, 480, Point3::new(0.0, 0.0, 5.0)),
//!     way_paths: &[],
//!     polylines: &[],
//! };
//! let report = tracker.advance_frame_with_diagnostics(&scene);
//! println!(
//!     "spans={} latency_ms={:.3}",
//!     report.spans.len(),
//!     report.trace.timings.total_ms
//! );
//! # }
//! ```

use std::time::Instant;

use log::debug;
use nalgebra::{Matrix4, Point3};

use super::context::{FrameContext, TrackerWorkspace};
use super::flags::RenderFlags;
use super::params::TrackerParams;
use crate::clip::clip_to_frustum;
use crate::diagnostics::{
    ClipStage, ExtractionStage, FrameReport, FrameTrace, GroupingStage, InputDescriptor,
    PathStage, PropagationStage, RasterStage, StrokeStage, TimingBreakdown, VisibilityStage,
};
use crate::extract;
use crate::geometry::{Projector, Viewport};
use crate::groups::{generate_groups, GroupingParams};
use crate::mesh::{average_edge_pixels, EdgeStrip, Surface};
use crate::paths::{assemble_paths, join_small_breaks, resample, PathSet};
use crate::propagate::{propagate_parameterization, PropagationParams};
use crate::raster::IdBuffer;
use crate::strokes::{self, StrokeParams};
use crate::types::{LineType, PathSample, StrokeSpan, VisibilityMode};
use crate::visibility::{assign_ids, classify, rasterize};

/// Everything the tracker reads about one frame.
///
/// The same surface must back consecutive frames for cross-frame samples
/// to survive; a topology rebuild bumps the surface generation and stale
/// samples expire on their own.
pub struct SceneView<'a, S: Surface> {
    pub surface: &'a S,
    /// Object-to-NDC transform for the frame.
    pub obj_to_ndc: Matrix4<f64>,
    /// Window dimensions and the object-space eye point.
    pub viewport: Viewport,
    /// Author-picked mesh edge chains tracked alongside extracted lines.
    pub way_paths: &'a [EdgeStrip],
    /// Free object-space polylines with no backing faces.
    pub polylines: &'a [Vec<Point3<f64>>],
}

/// Line tracker orchestrating extraction, the raster visibility passes,
/// cross-frame parameter propagation, and stroke span output. One
/// instance tracks one surface across frames.
pub struct LineTracker {
    params: TrackerParams,
    context: FrameContext,
    buffer: IdBuffer,
    workspace: TrackerWorkspace,
    paths: PathSet,
}

impl LineTracker {
    /// Create a tracker with the supplied parameters.
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            context: FrameContext::default(),
            buffer: IdBuffer::new(1, 1),
            workspace: TrackerWorkspace::new(),
            paths: PathSet::default(),
        }
    }

    /// Run one frame and return its stroke spans.
    pub fn advance_frame<S: Surface + Sync>(&mut self, scene: &SceneView<'_, S>) -> Vec<StrokeSpan> {
        self.advance_frame_with_diagnostics(scene).spans
    }

    /// Run one frame and return both the spans and a detailed report.
    pub fn advance_frame_with_diagnostics<S: Surface + Sync>(
        &mut self,
        scene: &SceneView<'_, S>,
    ) -> FrameReport {
        let surface = scene.surface;
        let viewport = scene.viewport;
        let projector = Projector::new(scene.obj_to_ndc);
        let pix_to_ndc = viewport.pix_to_ndc_scale();
        let mode = self.params.mode;
        let frame = self.context.frame;

        debug!(
            "LineTracker::advance_frame start frame={} faces={} viewport={}x{}",
            frame,
            surface.face_count(),
            viewport.width(),
            viewport.height()
        );
        let total_start = Instant::now();
        let camera_moved = self.context.camera_moved(&scene.obj_to_ndc);

        self.context.alloc.reset(frame);
        self.workspace.reset(surface.face_count());
        self.ensure_buffer(&viewport);
        self.buffer.set_depth_bias(self.params.depth_bias);

        let extract_start = Instant::now();
        let keep_front = self.params.flags.type_enabled(LineType::Silhouette);
        let keep_back = self.params.flags.type_enabled(LineType::BackfacingSilhouette);
        if keep_front || keep_back {
            let eye = viewport.eye();
            extract::extract_silhouettes(
                surface,
                &eye,
                &mut self.workspace.visited,
                &mut self.workspace.raw,
            );
        }
        let raw_points = self.workspace.raw.len();
        extract::split_gradient_runs(
            surface,
            &self.workspace.raw,
            keep_front,
            keep_back,
            &mut self.workspace.split,
        );
        if self.params.flags.type_enabled(LineType::Crease) {
            extract::append_crease_strips(
                surface,
                &surface.crease_strips(),
                self.params.crease_max_bend_angle,
                &mut self.workspace.split,
            );
        }
        if self.params.flags.type_enabled(LineType::Border) {
            extract::append_border_strips(surface, &surface.border_strips(), &mut self.workspace.split);
        }
        if self.params.flags.type_enabled(LineType::WayPath) {
            for strip in scene.way_paths {
                extract::append_way_path(surface, strip, &mut self.workspace.split);
            }
        }
        if self.params.flags.type_enabled(LineType::Polyline) {
            for line in scene.polylines {
                extract::append_polyline(line, &mut self.workspace.split);
            }
        }
        let extract_ms = extract_start.elapsed().as_secs_f64() * 1000.0;
        let extraction_stage = ExtractionStage {
            elapsed_ms: extract_ms,
            raw_points,
            split_points: self.workspace.split.len(),
        };

        let clip_start = Instant::now();
        clip_to_frustum(
            surface,
            &self.workspace.split,
            &projector,
            &viewport,
            &self.params.clip_options(),
            &mut self.workspace.clipped,
        );
        join_small_breaks(&mut self.workspace.clipped, self.params.join_gap_pix, pix_to_ndc);
        let clip_ms = clip_start.elapsed().as_secs_f64() * 1000.0;
        let clip_stage = ClipStage::from_segments(&self.workspace.clipped, clip_ms);

        let raster_start = Instant::now();
        assign_ids(
            &mut self.workspace.clipped,
            &self.params.flags,
            mode,
            &mut self.context.alloc,
            &mut self.workspace.run_lengths,
        );
        self.buffer.begin_frame(&viewport);
        let depth_start = Instant::now();
        self.buffer.fill_depth(surface, &projector);
        let depth_fill_ms = depth_start.elapsed().as_secs_f64() * 1000.0;
        rasterize(&mut self.buffer, &self.workspace.clipped, mode);
        let raster_ms = raster_start.elapsed().as_secs_f64() * 1000.0;
        let raster_stage = RasterStage {
            elapsed_ms: raster_ms,
            depth_fill_ms,
            width: self.buffer.width(),
            height: self.buffer.height(),
            id_runs: self.workspace.run_lengths.len(),
        };

        // Reference points classify first: single-channel resampling only
        // subdivides spans whose endpoints stayed visible.
        let vis_start = Instant::now();
        let radii = self.params.radii();
        classify(
            &mut self.workspace.clipped,
            &self.buffer,
            mode,
            &self.workspace.run_lengths,
            radii,
        );
        let mut fine = resample(
            &self.workspace.clipped,
            mode,
            self.params.vis_sampling_pix,
            pix_to_ndc,
            &self.workspace.run_lengths,
            surface,
            &projector,
        );
        classify(&mut fine, &self.buffer, mode, &self.workspace.run_lengths, radii);
        let vis_ms = vis_start.elapsed().as_secs_f64() * 1000.0;
        let visibility_stage = VisibilityStage::from_segments(&fine, vis_ms);

        let assemble_start = Instant::now();
        let mut paths = assemble_paths(
            &fine,
            &self.params.flags,
            mode,
            &self.workspace.run_lengths,
            self.params.long_paths,
        );
        paths.path_stamp = frame;
        let assemble_ms = assemble_start.elapsed().as_secs_f64() * 1000.0;

        let mesh_pixels = average_edge_pixels(surface, &projector, &viewport);

        let mut propagation_stage: Option<PropagationStage> = None;
        let mut propagation_ms = 0.0f64;
        if frame > 0 && !self.context.seeds.is_empty() {
            let prop_start = Instant::now();
            let report = propagate_parameterization(
                &self.context.seeds,
                &mut paths,
                &self.buffer,
                surface,
                &projector,
                &viewport,
                mode,
                mesh_pixels,
                &self.params.propagation,
            );
            propagation_ms = prop_start.elapsed().as_secs_f64() * 1000.0;
            debug!(
                "LineTracker::advance_frame propagation voted={} missed={} culled={}",
                report.voted, report.missed, report.culled
            );
            propagation_stage = Some(PropagationStage::from_report(&report, propagation_ms));
        }

        let group_start = Instant::now();
        let current_size = pix_to_ndc * mesh_pixels;
        let reference_size = *self.context.reference_size.get_or_insert(current_size);
        strokes::cache_per_path_values(&mut paths, &self.params.strokes, reference_size, current_size);
        generate_groups(
            &mut paths,
            &self.params.grouping,
            pix_to_ndc,
            self.params.seed_spacing_ndc(pix_to_ndc),
        );
        let group_ms = group_start.elapsed().as_secs_f64() * 1000.0;

        let stroke_start = Instant::now();
        let spans =
            strokes::generate_stroke_spans(&paths, &self.params.flags, mode, pix_to_ndc, &self.params.strokes);
        strokes::regenerate_seeds(
            &paths,
            surface,
            &projector,
            self.params.vis_sampling_pix,
            pix_to_ndc,
            &self.params.strokes,
            &mut self.context.seeds,
        );
        let stroke_ms = stroke_start.elapsed().as_secs_f64() * 1000.0;

        self.paths = paths;
        self.context.old_obj_to_ndc = Some(scene.obj_to_ndc);
        self.context.frame += 1;

        let latency = total_start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "LineTracker::advance_frame done frame={} paths={} spans={} latency_ms={:.3}",
            frame,
            self.paths.len(),
            spans.len(),
            latency
        );

        let mut timings = TimingBreakdown::with_total(latency);
        timings.push("extraction", extract_ms);
        timings.push("clip", clip_ms);
        timings.push("raster", raster_ms);
        timings.push("visibility", vis_ms);
        timings.push("assembly", assemble_ms);
        timings.push("propagation", propagation_ms);
        timings.push("grouping", group_ms);
        timings.push("strokes", stroke_ms);

        let trace = FrameTrace {
            input: InputDescriptor {
                frame,
                width: viewport.width(),
                height: viewport.height(),
                faces: surface.face_count(),
                vertices: surface.vertex_count(),
            },
            timings,
            camera_moved,
            extraction: Some(extraction_stage),
            clip: Some(clip_stage),
            raster: Some(raster_stage),
            visibility: Some(visibility_stage),
            paths: Some(PathStage::from_paths(&self.paths, assemble_ms)),
            propagation: propagation_stage,
            grouping: Some(GroupingStage::from_paths(&self.paths, group_ms)),
            strokes: Some(StrokeStage::from_spans(&spans, self.context.seeds.len(), stroke_ms)),
            raster_dump: None,
        };

        FrameReport { spans, trace }
    }

    /// Paths assembled by the most recent frame.
    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    /// Seed samples waiting for the next frame.
    pub fn seeds(&self) -> &[PathSample] {
        &self.context.seeds
    }

    /// The id raster written by the most recent frame.
    pub fn raster(&self) -> &IdBuffer {
        &self.buffer
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Frames processed so far.
    pub fn frames_processed(&self) -> u64 {
        self.context.frame
    }

    /// Drop all cross-frame state, keeping the parameters. The next frame
    /// behaves like a first frame.
    pub fn reset(&mut self) {
        self.context = FrameContext::default();
        self.paths = PathSet::default();
    }

    pub fn set_mode(&mut self, mode: VisibilityMode) {
        self.params.mode = mode;
    }

    pub fn set_flags(&mut self, flags: RenderFlags) {
        self.params.flags = flags;
    }

    pub fn set_propagation_params(&mut self, params: PropagationParams) {
        self.params.propagation = params;
    }

    pub fn set_grouping_params(&mut self, params: GroupingParams) {
        self.params.grouping = params;
    }

    pub fn set_stroke_params(&mut self, params: StrokeParams) {
        self.params.strokes = params;
    }

    fn ensure_buffer(&mut self, viewport: &Viewport) {
        let width = ((viewport.width() as f64 * self.params.raster_scale).round() as usize).max(1);
        let height = ((viewport.height() as f64 * self.params.raster_scale).round() as usize).max(1);
        if self.buffer.width() != width || self.buffer.height() != height {
            self.buffer = IdBuffer::new(width, height);
        }
    }
}
