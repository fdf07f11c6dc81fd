// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use std::collections::{BTreeMap, VecDeque};

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Face vertex indices (3 or 4 entries)
pub type Face = SmallVec<[u32; 4]>;

/// Named boundary patch used for boundary-condition assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchName {
    Inlet,
    Outlet,
    Walls,
    Top,
    Bottom,
}

impl PatchName {
    pub const ALL: [PatchName; 5] = [
        PatchName::Inlet,
        PatchName::Outlet,
        PatchName::Walls,
        PatchName::Top,
        PatchName::Bottom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inlet => "inlet",
            Self::Outlet => "outlet",
            Self::Walls => "walls",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Swept polygon mesh with named face groups.
///
/// Faces reference vertices by position in `vertices`; a face may only be
/// added once all of its vertices have been appended.
#[derive(Debug, Clone, Default)]
pub struct SweepMesh {
    /// Vertex positions
    pub vertices: Vec<Point3<f64>>,
    /// Triangles and quads
    pub faces: Vec<Face>,
    /// Face indices per patch, in ascending order
    pub patches: BTreeMap<PatchName, Vec<usize>>,
    /// Whether the mesh was swept along a closed path
    pub cyclic: bool,
}

impl SweepMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            patches: BTreeMap::new(),
            cyclic: false,
        }
    }

    /// Append a vertex, returning its index
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>) -> u32 {
        self.vertices.push(position);
        (self.vertices.len() - 1) as u32
    }

    /// Append a face, optionally tagging it with a patch, returning its index
    #[inline]
    pub fn add_face(&mut self, indices: &[u32], patch: Option<PatchName>) -> usize {
        debug_assert!(indices.len() == 3 || indices.len() == 4);
        debug_assert!(
            indices.iter().all(|&i| (i as usize) < self.vertices.len()),
            "face references a vertex that has not been appended"
        );

        let face_index = self.faces.len();
        self.faces.push(Face::from_slice(indices));
        if let Some(patch) = patch {
            self.patches.entry(patch).or_default().push(face_index);
        }
        face_index
    }

    #[inline]
    pub fn add_quad(&mut self, a: u32, b: u32, c: u32, d: u32, patch: Option<PatchName>) -> usize {
        self.add_face(&[a, b, c, d], patch)
    }

    #[inline]
    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32, patch: Option<PatchName>) -> usize {
        self.add_face(&[a, b, c], patch)
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get face count
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of triangles after fan triangulation
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.len().saturating_sub(2)).sum()
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Faces belonging to a patch
    pub fn patch(&self, name: PatchName) -> &[usize] {
        self.patches.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merge another mesh into this one
    pub fn merge(&mut self, other: &SweepMesh) {
        if other.vertices.is_empty() {
            return;
        }

        let vertex_offset = self.vertices.len() as u32;
        let face_offset = self.faces.len();

        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| f.iter().map(|&i| i + vertex_offset).collect::<Face>()),
        );
        for (name, faces) in &other.patches {
            self.patches
                .entry(*name)
                .or_default()
                .extend(faces.iter().map(|&f| f + face_offset));
        }
    }

    /// Positions of a face's corners
    #[inline]
    pub fn face_points(&self, face: usize) -> SmallVec<[Point3<f64>; 4]> {
        self.faces[face]
            .iter()
            .map(|&i| self.vertices[i as usize])
            .collect()
    }

    /// Area vector of a face (Newell's method); its length is the face area
    pub fn face_area_vector(&self, face: usize) -> Vector3<f64> {
        newell_vector(&self.face_points(face))
    }

    /// Face area
    #[inline]
    pub fn face_area(&self, face: usize) -> f64 {
        self.face_area_vector(face).norm()
    }

    /// Unit face normal, `None` for degenerate faces
    pub fn face_normal(&self, face: usize) -> Option<Vector3<f64>> {
        let v = self.face_area_vector(face);
        let len = v.norm();
        if len < 1e-15 {
            None
        } else {
            Some(v / len)
        }
    }

    /// Fan-triangulated faces, each paired with its source face index
    pub fn triangles(&self) -> Vec<([u32; 3], usize)> {
        let mut out = Vec::with_capacity(self.triangle_count());
        for (fi, face) in self.faces.iter().enumerate() {
            for k in 1..face.len().saturating_sub(1) {
                out.push(([face[0], face[k], face[k + 1]], fi));
            }
        }
        out
    }

    /// Calculate bounds (min, max)
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        if self.vertices.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        for p in &self.vertices {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        (min, max)
    }

    /// Reverse the winding of one face, keeping its first vertex
    #[inline]
    pub fn flip_face(&mut self, face: usize) {
        self.faces[face][1..].reverse();
    }

    /// Make winding consistent across every connected component and point
    /// each component's faces outward.
    ///
    /// Neighboring faces across a two-face edge must traverse that edge in
    /// opposite directions. Components are then flipped as a whole when their
    /// signed volume about the component centroid is negative.
    /// Returns the number of flipped faces.
    pub fn orient_outward(&mut self) -> usize {
        let face_count = self.faces.len();
        if face_count == 0 {
            return 0;
        }

        let edges = directed_edge_uses(&self.faces);
        let mut flipped = vec![false; face_count];
        let mut component = vec![usize::MAX; face_count];
        let mut components: Vec<Vec<usize>> = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..face_count {
            if component[seed] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = vec![seed];
            component[seed] = id;
            queue.push_back(seed);

            while let Some(f) = queue.pop_front() {
                let face = &self.faces[f];
                let n = face.len();
                for k in 0..n {
                    let (a, b) = (face[k], face[(k + 1) % n]);
                    if a == b {
                        continue;
                    }
                    let key = edge_key(a, b);
                    let Some(uses) = edges.get(&key) else { continue };
                    if uses.len() != 2 {
                        continue;
                    }
                    let forward_f = a < b;
                    let dir_f = forward_f ^ flipped[f];
                    for &(g, forward_g) in uses {
                        if g == f || component[g] != usize::MAX {
                            continue;
                        }
                        flipped[g] = !dir_f ^ forward_g;
                        component[g] = id;
                        members.push(g);
                        queue.push_back(g);
                    }
                }
            }
            components.push(members);
        }

        for (f, &flip) in flipped.iter().enumerate() {
            if flip {
                self.flip_face(f);
            }
        }
        let mut total = flipped.iter().filter(|&&f| f).count();

        for members in &components {
            if self.signed_volume_of(members) < 0.0 {
                for &f in members {
                    self.flip_face(f);
                }
                // faces flipped twice are back to their original winding
                let twice = members.iter().filter(|&&f| flipped[f]).count();
                total = total - twice + (members.len() - twice);
            }
        }
        total
    }

    fn signed_volume_of(&self, faces: &[usize]) -> f64 {
        let mut centroid = Vector3::zeros();
        let mut count = 0usize;
        for &f in faces {
            for &i in &self.faces[f] {
                centroid += self.vertices[i as usize].coords;
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        let c = Point3::from(centroid / count as f64);

        let mut volume = 0.0;
        for &f in faces {
            let face = &self.faces[f];
            let p0 = self.vertices[face[0] as usize] - c;
            for k in 1..face.len().saturating_sub(1) {
                let p1 = self.vertices[face[k] as usize] - c;
                let p2 = self.vertices[face[k + 1] as usize] - c;
                volume += p0.dot(&p1.cross(&p2));
            }
        }
        volume / 6.0
    }

    /// Vertex positions as plain arrays
    pub fn vertex_array(&self) -> Vec<[f64; 3]> {
        self.vertices.iter().map(|p| [p.x, p.y, p.z]).collect()
    }

    /// Faces as plain index lists
    pub fn face_array(&self) -> Vec<Vec<u32>> {
        self.faces.iter().map(|f| f.to_vec()).collect()
    }
}

/// Undirected edge key with the smaller index first
#[inline]
pub(crate) fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// For every undirected edge, the faces using it and whether each face
/// traverses it from the smaller to the larger index
pub(crate) fn directed_edge_uses(faces: &[Face]) -> FxHashMap<(u32, u32), SmallVec<[(usize, bool); 2]>> {
    let mut edges: FxHashMap<(u32, u32), SmallVec<[(usize, bool); 2]>> = FxHashMap::default();
    for (fi, face) in faces.iter().enumerate() {
        let n = face.len();
        for k in 0..n {
            let (a, b) = (face[k], face[(k + 1) % n]);
            if a == b {
                continue;
            }
            edges.entry(edge_key(a, b)).or_default().push((fi, a < b));
        }
    }
    edges
}

/// Newell area vector of a polygon
pub(crate) fn newell_vector(points: &[Point3<f64>]) -> Vector3<f64> {
    let n = points.len();
    let mut normal = Vector3::zeros();
    for i in 0..n {
        let curr = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    normal * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Unit cube with quads, all wound outward
    fn unit_cube() -> SweepMesh {
        let mut mesh = SweepMesh::new();
        for z in [0.0, 1.0] {
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                mesh.add_vertex(Point3::new(x, y, z));
            }
        }
        mesh.add_quad(0, 3, 2, 1, Some(PatchName::Bottom));
        mesh.add_quad(4, 5, 6, 7, Some(PatchName::Top));
        mesh.add_quad(0, 1, 5, 4, Some(PatchName::Walls));
        mesh.add_quad(1, 2, 6, 5, Some(PatchName::Walls));
        mesh.add_quad(2, 3, 7, 6, Some(PatchName::Walls));
        mesh.add_quad(3, 0, 4, 7, Some(PatchName::Walls));
        mesh
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = SweepMesh::new();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_patch_groups_and_counts() {
        let mesh = unit_cube();
        assert_eq!(mesh.face_count(), 6);
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.patch(PatchName::Walls), &[2, 3, 4, 5]);
        assert!(mesh.patch(PatchName::Inlet).is_empty());
    }

    #[test]
    fn test_face_area_and_normal() {
        let mesh = unit_cube();
        assert_relative_eq!(mesh.face_area(0), 1.0, epsilon = 1e-12);
        let n = mesh.face_normal(1).unwrap();
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_merge_offsets_indices_and_patches() {
        let mut a = unit_cube();
        let b = unit_cube();
        a.merge(&b);
        assert_eq!(a.vertex_count(), 16);
        assert_eq!(a.face_count(), 12);
        assert_eq!(a.faces[6][0], 8);
        assert_eq!(a.patch(PatchName::Top), &[1, 7]);
    }

    #[test]
    fn test_orient_outward_repairs_flipped_faces() {
        let mut mesh = unit_cube();
        mesh.flip_face(2);
        mesh.flip_face(4);
        let flipped = mesh.orient_outward();
        assert_eq!(flipped, 2);
        assert_eq!(mesh.faces, unit_cube().faces);
    }

    #[test]
    fn test_orient_outward_turns_inside_out_component() {
        let mut mesh = unit_cube();
        for f in 0..mesh.face_count() {
            mesh.flip_face(f);
        }
        assert_eq!(mesh.orient_outward(), 6);
        assert!(mesh.signed_volume_of(&[0, 1, 2, 3, 4, 5]) > 0.0);
    }

    #[test]
    fn test_bounds() {
        let (min, max) = unit_cube().bounds();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 1.0));
    }
}
