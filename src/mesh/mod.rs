//! Mesh collaborator interface.
//!
//! The tracking pipeline never owns mesh data; it consumes any surface that
//! can answer the queries in [`Surface`]: per-vertex smoothed normals,
//! neighbor-across-edge adjacency, crease flags, barycentric projection and
//! evaluation, and crease/border edge strips. A compact indexed
//! [`TriMesh`](trimesh::TriMesh) implementation ships in-crate so tests and
//! demos run without an external engine.
//!
//! Face references are generation-checked: a [`FaceRef`] taken on one frame
//! resolves to `None` after the surface's topology generation changes, so
//! stale cross-frame samples degrade silently instead of indexing into a
//! rebuilt face table.

mod trimesh;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::{Projector, Viewport};

pub use trimesh::TriMesh;

/// Generation-checked handle to a face of a [`Surface`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRef {
    pub index: u32,
    pub generation: u32,
}

/// One edge of a crease or border strip.
#[derive(Clone, Copy, Debug)]
pub struct StripEdge {
    pub a: u32,
    pub b: u32,
    /// One adjacent face, used for barycentric attribution of strip points.
    pub face: Option<FaceRef>,
    pub adjacent_faces: u8,
    /// Angle between adjacent face normals in radians; 0 when the edge has
    /// fewer than two faces.
    pub dihedral: f64,
    /// Whether this edge chains into the next entry of the strip.
    pub continues: bool,
}

/// An ordered chain of mesh edges (consecutive entries share a vertex
/// wherever `continues` is set).
#[derive(Clone, Debug, Default)]
pub struct EdgeStrip {
    pub edges: Vec<StripEdge>,
}

/// Mesh queries consumed by the tracking pipeline.
pub trait Surface {
    /// Topology generation; bumped whenever faces are rebuilt.
    fn generation(&self) -> u32;

    fn face_count(&self) -> usize;
    fn vertex_count(&self) -> usize;

    fn face_vertices(&self, face: usize) -> [u32; 3];
    fn vertex_position(&self, v: u32) -> Point3<f64>;
    /// Smoothed per-vertex normal.
    fn vertex_normal(&self, v: u32) -> Vector3<f64>;
    fn face_normal(&self, face: usize) -> Vector3<f64>;

    /// Face on the other side of edge `(a, b)`, excluding `face`.
    fn neighbor_across(&self, face: usize, a: u32, b: u32) -> Option<usize>;
    fn is_crease_edge(&self, a: u32, b: u32) -> bool;

    /// Barycentric coordinates of `p` projected onto the face plane
    /// (unclamped; components may leave `[0, 1]` for points off the face).
    fn project_barycentric(&self, face: usize, p: &Point3<f64>) -> Vector3<f64>;
    fn barycentric_position(&self, face: usize, bc: &Vector3<f64>) -> Point3<f64>;
    /// Normal blended from the corner normals at `bc`, normalized.
    fn barycentric_normal(&self, face: usize, bc: &Vector3<f64>) -> Vector3<f64>;

    fn crease_strips(&self) -> Vec<EdgeStrip>;
    fn border_strips(&self) -> Vec<EdgeStrip>;

    fn face_ref(&self, face: usize) -> FaceRef {
        FaceRef {
            index: face as u32,
            generation: self.generation(),
        }
    }

    /// Resolve a handle taken on an earlier frame. `None` when the handle's
    /// generation is stale or its index no longer exists.
    fn resolve(&self, fref: FaceRef) -> Option<usize> {
        (fref.generation == self.generation() && (fref.index as usize) < self.face_count())
            .then_some(fref.index as usize)
    }

    /// The face vertex that is neither `a` nor `b`.
    fn other_vertex(&self, face: usize, a: u32, b: u32) -> Option<u32> {
        self.face_vertices(face).into_iter().find(|&v| v != a && v != b)
    }
}

/// Average on-screen edge length in pixels for the current view.
///
/// Used to normalize world-distance diagnostics and to scale the reference
/// stroke period when the mesh changes apparent size.
pub fn average_edge_pixels<S: Surface>(
    surface: &S,
    projector: &Projector,
    viewport: &Viewport,
) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for face in 0..surface.face_count() {
        let [v0, v1, v2] = surface.face_vertices(face);
        for (a, b) in [(v0, v1), (v1, v2), (v2, v0)] {
            // Each interior edge is visited twice; the average is unaffected.
            let (Some(pa), Some(pb)) = (
                projector.project(&surface.vertex_position(a)),
                projector.project(&surface.vertex_position(b)),
            ) else {
                continue;
            };
            total += pa.planar_dist(&pb) * viewport.ndc_to_pix_scale();
            count += 1;
        }
    }
    if count == 0 {
        1.0
    } else {
        (total / count as f64).max(f64::EPSILON)
    }
}
