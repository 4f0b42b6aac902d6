use line_tracker::geometry::Viewport;
use line_tracker::mesh::TriMesh;
use line_tracker::{LineTracker, SceneView, TrackerParams};
use nalgebra::{Matrix4, Point3};

fn main() {
    // Demo stub: tracks one frame of a flat quad, which carries no
    // silhouette. See src/bin/track_demo.rs for the turntable demo.
    let mesh = TriMesh::new(
        vec![
            Point3::new(-1.0, -1.0, 0.5),
            Point3::new(1.0, -1.0, 0.5),
            Point3::new(1.0, 1.0, 0.5),
            Point3::new(-1.0, 1.0, 0.5),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    );

    let mut tracker = LineTracker::new(TrackerParams::default());
    let scene = SceneView {
        surface: &mesh,
        obj_to_ndc: Matrix4::identity(),
        viewport: Viewport::new(640, 480, Point3::new(0.0, 0.0, 5.0)),
        way_paths: &[],
        polylines: &[],
    };
    let report = tracker.advance_frame_with_diagnostics(&scene);
    println!(
        "spans={} paths={} latency_ms={:.3}",
        report.spans.len(),
        tracker.paths().len(),
        report.trace.timings.total_ms
    );
}
