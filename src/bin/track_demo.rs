use std::env;
use std::f64::consts::TAU;

use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};

use line_tracker::config::track;
use line_tracker::diagnostics::FrameReport;
use line_tracker::geometry::Viewport;
use line_tracker::mesh::TriMesh;
use line_tracker::raster::{save_id_raster, write_json_file};
use line_tracker::{LineTracker, SceneView};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let program = env::args()
        .next()
        .unwrap_or_else(|| "track_demo".to_string());
    let config = track::parse_cli(&program)?;

    let mesh = build_tube(config.scene.segments);
    let mut tracker = LineTracker::new(config.tracker.clone());

    let spin_axis = Unit::new_normalize(Vector3::new(0.35, 1.0, 0.18));
    let projection = perspective(4.0, 5.0, 2.0, 10.0);
    let eye_world = Point3::new(0.0, 0.0, 5.0);

    let mut reports: Vec<FrameReport> = Vec::new();
    for frame in 0..config.scene.frames {
        let angle = config.scene.spin_step * frame as f64;
        let rotation = Rotation3::from_axis_angle(&spin_axis, angle);
        let eye_object = rotation.inverse() * eye_world;

        let scene = SceneView {
            surface: &mesh,
            obj_to_ndc: projection * rotation.to_homogeneous(),
            viewport: Viewport::new(config.scene.width, config.scene.height, eye_object),
            way_paths: &[],
            polylines: &[],
        };
        let mut report = tracker.advance_frame_with_diagnostics(&scene);

        if let Some(dir) = &config.output.raster_dir {
            let path = dir.join(format!("id_raster_{frame:03}.png"));
            save_id_raster(tracker.raster(), &path)?;
            report.trace.raster_dump = Some(path);
        }

        if config.output.format.includes_text() {
            print_frame_summary(frame, &report);
        }
        reports.push(report);
    }

    if config.output.format.includes_json() {
        if let Some(path) = &config.output.json_out {
            write_json_file(path, &reports)?;
            println!("JSON report written to {}", path.display());
        } else {
            let json = serde_json::to_string_pretty(&reports)
                .map_err(|e| format!("Failed to serialize JSON: {e}"))?;
            println!("{json}");
        }
    }

    Ok(())
}

fn print_frame_summary(frame: usize, report: &FrameReport) {
    let trace = &report.trace;
    println!("Frame {frame}");
    println!("  spans: {}", report.spans.len());
    if let Some(paths) = &trace.paths {
        println!(
            "  paths: {} ({} closed, {} points)",
            paths.paths, paths.closed_paths, paths.points
        );
    }
    if let Some(vis) = &trace.visibility {
        println!(
            "  samples: {} visible={} hidden={} occluded={}",
            vis.sampled_points, vis.visible, vis.hidden, vis.occluded
        );
    }
    match &trace.propagation {
        Some(prop) => println!(
            "  propagation: voted={} missed={} culled={} of {}",
            prop.voted, prop.missed, prop.culled, prop.samples
        ),
        None => println!("  propagation: skipped (no seeds)"),
    }
    if let Some(groups) = &trace.grouping {
        println!("  groups: {} good of {}", groups.good_groups, groups.groups);
    }
    let stages = trace
        .timings
        .stages
        .iter()
        .map(|s| format!("{}={:.3}", s.label, s.elapsed_ms))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "  timings (ms): {stages} total={:.3}",
        trace.timings.total_ms
    );
}

/// Capped tube centered at the origin, radius 0.6, height 1.6. The cap
/// rims exceed the crease threshold, so crease tracking has material when
/// the crease row is enabled.
fn build_tube(segments: usize) -> TriMesh {
    let n = segments.max(3) as u32;
    let radius = 0.6;
    let half_height = 0.8;

    let mut positions = Vec::with_capacity(2 * n as usize + 2);
    for ring in [-half_height, half_height] {
        for i in 0..n {
            let angle = TAU * f64::from(i) / f64::from(n);
            positions.push(Point3::new(
                radius * angle.cos(),
                ring,
                radius * angle.sin(),
            ));
        }
    }
    let bottom_center = 2 * n;
    let top_center = 2 * n + 1;
    positions.push(Point3::new(0.0, -half_height, 0.0));
    positions.push(Point3::new(0.0, half_height, 0.0));

    let mut triangles = Vec::with_capacity(4 * n as usize);
    for i in 0..n {
        let j = (i + 1) % n;
        let (b0, b1) = (i, j);
        let (t0, t1) = (n + i, n + j);
        triangles.push([b0, t0, b1]);
        triangles.push([b1, t0, t1]);
        triangles.push([bottom_center, b0, b1]);
        triangles.push([top_center, t1, t0]);
    }

    let mut mesh = TriMesh::new(positions, triangles);
    mesh.mark_creases_by_angle(1.0);
    mesh
}

/// Perspective object-to-NDC transform for an eye at `(0, 0, distance)`
/// looking down negative z, with depth mapped to `[0, 1]` between the
/// near and far planes.
fn perspective(focal: f64, distance: f64, near: f64, far: f64) -> Matrix4<f64> {
    let a = -far / (far - near);
    let mut m = Matrix4::zeros();
    m[(0, 0)] = focal;
    m[(1, 1)] = focal;
    m[(2, 2)] = a;
    m[(2, 3)] = a * (near - distance);
    m[(3, 2)] = -1.0;
    m[(3, 3)] = distance;
    m
}
