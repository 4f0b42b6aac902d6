use std::f64::consts::TAU;

use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};

use line_tracker::geometry::Viewport;
use line_tracker::mesh::TriMesh;
use line_tracker::SceneView;

/// Builds a capped tube centered at the origin, radius 0.6, height 1.6.
///
/// Seen from outside, the wall always produces silhouette runs, and the
/// 90 degree bend between wall and caps produces marked crease edges.
pub fn capped_tube(segments: usize) -> TriMesh {
    assert!(segments >= 3, "a tube needs at least three wall segments");
    let n = segments as u32;
    let radius = 0.6;
    let half_height = 0.8;

    let mut positions = Vec::with_capacity(2 * segments + 2);
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

    let mut triangles = Vec::with_capacity(4 * segments);
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

/// Object-to-NDC transform for an eye at `(0, 0, distance)` looking down
/// negative z, with depth mapped to `[0, 1]` between near and far.
pub fn perspective(focal: f64, distance: f64, near: f64, far: f64) -> Matrix4<f64> {
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

/// Pose of the turntable at `frame`: the mesh spins around a tilted axis
/// while the camera stays put five units out on world z.
///
/// Returns the object-to-NDC transform and the eye in object space.
pub fn turntable_pose(spin_step: f64, frame: u64) -> (Matrix4<f64>, Point3<f64>) {
    let axis = Unit::new_normalize(Vector3::new(0.35, 1.0, 0.18));
    let rotation = Rotation3::from_axis_angle(&axis, spin_step * frame as f64);
    let eye_world = Point3::new(0.0, 0.0, 5.0);
    let obj_to_ndc = perspective(4.0, 5.0, 2.0, 10.0) * rotation.to_homogeneous();
    (obj_to_ndc, rotation.inverse() * eye_world)
}

/// One frame of the turntable as the tracker sees it.
pub fn turntable_view(
    mesh: &TriMesh,
    width: u32,
    height: u32,
    spin_step: f64,
    frame: u64,
) -> SceneView<'_, TriMesh> {
    let (obj_to_ndc, eye) = turntable_pose(spin_step, frame);
    SceneView {
        surface: mesh,
        obj_to_ndc,
        viewport: Viewport::new(width, height, eye),
        way_paths: &[],
        polylines: &[],
    }
}
