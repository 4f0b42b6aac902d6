use std::collections::{HashMap, HashSet};

use nalgebra::{Point3, Vector3};

use super::{EdgeStrip, StripEdge, Surface};

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Indexed triangle mesh with precomputed adjacency.
///
/// Vertex normals are area-weighted averages of incident face normals,
/// which is enough for the in-crate tests and demos; engines with
/// crease-aware smoothing groups implement [`Surface`] over their own data.
#[derive(Clone, Debug)]
pub struct TriMesh {
    positions: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
    vertex_normals: Vec<Vector3<f64>>,
    face_normals: Vec<Vector3<f64>>,
    edge_faces: HashMap<(u32, u32), Vec<u32>>,
    creases: HashSet<(u32, u32)>,
    generation: u32,
}

impl TriMesh {
    pub fn new(positions: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        let mut edge_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
        for (fi, tri) in triangles.iter().enumerate() {
            let [a, b, c] = *tri;
            for (u, v) in [(a, b), (b, c), (c, a)] {
                edge_faces.entry(edge_key(u, v)).or_default().push(fi as u32);
            }
        }
        for faces in edge_faces.values_mut() {
            faces.sort_unstable();
        }
        let mut mesh = Self {
            positions,
            triangles,
            vertex_normals: Vec::new(),
            face_normals: Vec::new(),
            edge_faces,
            creases: HashSet::new(),
            generation: 0,
        };
        mesh.recompute_normals();
        mesh
    }

    fn recompute_normals(&mut self) {
        self.face_normals.clear();
        self.face_normals.reserve(self.triangles.len());
        let mut accum = vec![Vector3::zeros(); self.positions.len()];
        for tri in &self.triangles {
            let [a, b, c] = *tri;
            let p0 = self.positions[a as usize];
            let p1 = self.positions[b as usize];
            let p2 = self.positions[c as usize];
            // Unnormalized cross product weights the accumulation by area.
            let cross = (p1 - p0).cross(&(p2 - p0));
            let n = cross.norm();
            self.face_normals.push(if n > f64::EPSILON {
                cross / n
            } else {
                Vector3::z()
            });
            for v in [a, b, c] {
                accum[v as usize] += cross;
            }
        }
        self.vertex_normals = accum
            .into_iter()
            .map(|n| {
                let len = n.norm();
                if len > f64::EPSILON {
                    n / len
                } else {
                    Vector3::z()
                }
            })
            .collect();
    }

    /// Move vertices without touching topology; handles stay valid.
    pub fn set_vertex_positions(&mut self, positions: Vec<Point3<f64>>) {
        debug_assert_eq!(positions.len(), self.positions.len());
        self.positions = positions;
        self.recompute_normals();
    }

    /// Invalidate all outstanding [`FaceRef`](super::FaceRef)s, as a real
    /// engine would after a topology rebuild.
    pub fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn mark_crease(&mut self, a: u32, b: u32) {
        self.creases.insert(edge_key(a, b));
    }

    /// Flag every 2-face edge whose dihedral exceeds `min_dihedral` radians.
    pub fn mark_creases_by_angle(&mut self, min_dihedral: f64) {
        let mut marked = Vec::new();
        for (&key, faces) in &self.edge_faces {
            if faces.len() == 2 && self.edge_dihedral(key) > min_dihedral {
                marked.push(key);
            }
        }
        self.creases.extend(marked);
    }

    fn edge_dihedral(&self, key: (u32, u32)) -> f64 {
        let faces = match self.edge_faces.get(&key) {
            Some(f) if f.len() == 2 => f,
            _ => return 0.0,
        };
        let n0 = self.face_normals[faces[0] as usize];
        let n1 = self.face_normals[faces[1] as usize];
        n0.dot(&n1).clamp(-1.0, 1.0).acos()
    }

    fn strip_edge(&self, a: u32, b: u32, continues: bool) -> StripEdge {
        let key = edge_key(a, b);
        let faces = self.edge_faces.get(&key);
        let count = faces.map_or(0, |f| f.len());
        StripEdge {
            a,
            b,
            face: faces.and_then(|f| f.first()).map(|&fi| self.face_ref(fi as usize)),
            adjacent_faces: count.min(u8::MAX as usize) as u8,
            dihedral: self.edge_dihedral(key),
            continues,
        }
    }

    fn chain_strips(&self, mut edges: Vec<(u32, u32)>) -> Vec<EdgeStrip> {
        edges.sort_unstable();
        let mut at_vertex: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, &(a, b)) in edges.iter().enumerate() {
            at_vertex.entry(a).or_default().push(i);
            at_vertex.entry(b).or_default().push(i);
        }
        let mut visited = vec![false; edges.len()];
        let mut strips = Vec::new();
        for start in 0..edges.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut chain = std::collections::VecDeque::new();
            chain.push_back(edges[start]);
            for forward in [true, false] {
                let mut cur = if forward { edges[start].1 } else { edges[start].0 };
                loop {
                    let next = at_vertex
                        .get(&cur)
                        .and_then(|list| list.iter().find(|&&e| !visited[e]).copied());
                    let Some(e) = next else { break };
                    visited[e] = true;
                    let (a, b) = edges[e];
                    let far = if a == cur { b } else { a };
                    if forward {
                        chain.push_back((cur, far));
                    } else {
                        chain.push_front((far, cur));
                    }
                    cur = far;
                }
            }
            let n = chain.len();
            let strip = EdgeStrip {
                edges: chain
                    .into_iter()
                    .enumerate()
                    .map(|(i, (a, b))| self.strip_edge(a, b, i + 1 < n))
                    .collect(),
            };
            strips.push(strip);
        }
        strips
    }
}

impl Surface for TriMesh {
    fn generation(&self) -> u32 {
        self.generation
    }

    fn face_count(&self) -> usize {
        self.triangles.len()
    }

    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn face_vertices(&self, face: usize) -> [u32; 3] {
        self.triangles[face]
    }

    fn vertex_position(&self, v: u32) -> Point3<f64> {
        self.positions[v as usize]
    }

    fn vertex_normal(&self, v: u32) -> Vector3<f64> {
        self.vertex_normals[v as usize]
    }

    fn face_normal(&self, face: usize) -> Vector3<f64> {
        self.face_normals[face]
    }

    fn neighbor_across(&self, face: usize, a: u32, b: u32) -> Option<usize> {
        self.edge_faces
            .get(&edge_key(a, b))?
            .iter()
            .map(|&f| f as usize)
            .find(|&f| f != face)
    }

    fn is_crease_edge(&self, a: u32, b: u32) -> bool {
        self.creases.contains(&edge_key(a, b))
    }

    fn project_barycentric(&self, face: usize, p: &Point3<f64>) -> Vector3<f64> {
        let [a, b, c] = self.triangles[face];
        let p0 = self.positions[a as usize];
        let p1 = self.positions[b as usize];
        let p2 = self.positions[c as usize];
        let n = self.face_normals[face];
        let q = p - n * n.dot(&(p - p0));
        let v0 = p1 - p0;
        let v1 = p2 - p0;
        let v2 = q - p0;
        let d00 = v0.dot(&v0);
        let d01 = v0.dot(&v1);
        let d11 = v1.dot(&v1);
        let d20 = v2.dot(&v0);
        let d21 = v2.dot(&v1);
        let denom = d00 * d11 - d01 * d01;
        if denom.abs() <= f64::EPSILON {
            return Vector3::new(1.0, 0.0, 0.0);
        }
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        Vector3::new(1.0 - v - w, v, w)
    }

    fn barycentric_position(&self, face: usize, bc: &Vector3<f64>) -> Point3<f64> {
        let [a, b, c] = self.triangles[face];
        let p0 = self.positions[a as usize].coords;
        let p1 = self.positions[b as usize].coords;
        let p2 = self.positions[c as usize].coords;
        Point3::from(p0 * bc.x + p1 * bc.y + p2 * bc.z)
    }

    fn barycentric_normal(&self, face: usize, bc: &Vector3<f64>) -> Vector3<f64> {
        let [a, b, c] = self.triangles[face];
        let n = self.vertex_normals[a as usize] * bc.x
            + self.vertex_normals[b as usize] * bc.y
            + self.vertex_normals[c as usize] * bc.z;
        let len = n.norm();
        if len > f64::EPSILON {
            n / len
        } else {
            self.face_normals[face]
        }
    }

    fn crease_strips(&self) -> Vec<EdgeStrip> {
        let edges = self.creases.iter().copied().collect();
        self.chain_strips(edges)
    }

    fn border_strips(&self) -> Vec<EdgeStrip> {
        let edges = self
            .edge_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&key, _)| key)
            .collect();
        self.chain_strips(edges)
    }
}
