// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh cleanup for CFD export
//!
//! Every pass returns a new mesh and keeps patch groups pointing at the
//! right faces.

use nalgebra::Point3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mesh::{Face, SweepMesh};

/// Faces with less area than this are degenerate
pub const DEGENERATE_AREA: f64 = 1e-8;

/// Grid hash over kept vertex positions for tolerance lookups.
///
/// Queries check the 3x3x3 cell neighborhood, so the cell size must not be
/// smaller than the query tolerance.
struct VertexGrid {
    cell_size: f64,
    grid: FxHashMap<(i64, i64, i64), Vec<u32>>,
}

impl VertexGrid {
    fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            grid: FxHashMap::default(),
        }
    }

    fn insert(&mut self, index: u32, p: &Point3<f64>) {
        let cell = self.cell_coords(p);
        self.grid.entry(cell).or_default().push(index);
    }

    fn find_near(&self, positions: &[Point3<f64>], p: &Point3<f64>, tolerance: f64) -> Option<u32> {
        let (cx, cy, cz) = self.cell_coords(p);
        let tol_sq = tolerance * tolerance;

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(indices) = self.grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &i in indices {
                        if (positions[i as usize] - p).norm_squared() <= tol_sq {
                            return Some(i);
                        }
                    }
                }
            }
        }
        None
    }

    fn cell_coords(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }
}

/// Drop consecutive repeats (cyclically); `None` if fewer than 3 remain
fn collapse_face(face: &Face) -> Option<Face> {
    let mut out = Face::new();
    for &i in face {
        if out.last() != Some(&i) {
            out.push(i);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    (out.len() >= 3).then_some(out)
}

/// Rebuild a mesh from kept faces, remapping patch groups.
///
/// `faces` pairs each new face with the index of the face it came from.
fn rebuild(mesh: &SweepMesh, vertices: Vec<Point3<f64>>, faces: Vec<(Face, usize)>) -> SweepMesh {
    let mut origin: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for (new_index, (_, old_index)) in faces.iter().enumerate() {
        origin.entry(*old_index).or_default().push(new_index);
    }

    let patches = mesh
        .patches
        .iter()
        .map(|(name, old_faces)| {
            let mut remapped: Vec<usize> = old_faces
                .iter()
                .filter_map(|f| origin.get(f))
                .flatten()
                .copied()
                .collect();
            remapped.sort_unstable();
            (*name, remapped)
        })
        .filter(|(_, faces)| !faces.is_empty())
        .collect();

    SweepMesh {
        vertices,
        faces: faces.into_iter().map(|(f, _)| f).collect(),
        patches,
        cyclic: mesh.cyclic,
    }
}

/// Merge vertices closer than `distance`, keeping the first occurrence.
///
/// Faces that collapse below three distinct vertices are removed.
/// Returns the new mesh and the number of merged vertices.
pub fn weld_vertices(mesh: &SweepMesh, distance: f64) -> (SweepMesh, usize) {
    let tolerance = distance.max(0.0);
    let mut grid = VertexGrid::new(tolerance.max(1e-12));
    let mut kept: Vec<Point3<f64>> = Vec::with_capacity(mesh.vertex_count());
    let mut remap = Vec::with_capacity(mesh.vertex_count());

    for p in &mesh.vertices {
        match grid.find_near(&kept, p, tolerance) {
            Some(existing) => remap.push(existing),
            None => {
                let index = kept.len() as u32;
                grid.insert(index, p);
                kept.push(*p);
                remap.push(index);
            }
        }
    }

    let merged = mesh.vertex_count() - kept.len();
    let faces = mesh
        .faces
        .iter()
        .enumerate()
        .filter_map(|(fi, face)| {
            let mapped: Face = face.iter().map(|&i| remap[i as usize]).collect();
            collapse_face(&mapped).map(|f| (f, fi))
        })
        .collect();

    (rebuild(mesh, kept, faces), merged)
}

/// Remove faces below `min_area` or with repeated vertices
pub fn remove_degenerate_faces(mesh: &SweepMesh, min_area: f64) -> (SweepMesh, usize) {
    let faces: Vec<(Face, usize)> = mesh
        .faces
        .iter()
        .enumerate()
        .filter_map(|(fi, face)| {
            let collapsed = collapse_face(face)?;
            (mesh.face_area(fi) >= min_area).then_some((collapsed, fi))
        })
        .collect();

    let removed = mesh.face_count() - faces.len();
    (rebuild(mesh, mesh.vertices.clone(), faces), removed)
}

/// Remove vertices no face references and compact indices
pub fn remove_loose_vertices(mesh: &SweepMesh) -> (SweepMesh, usize) {
    let mut used = vec![false; mesh.vertex_count()];
    for face in &mesh.faces {
        for &i in face {
            used[i as usize] = true;
        }
    }

    let mut remap = vec![u32::MAX; mesh.vertex_count()];
    let mut vertices = Vec::with_capacity(mesh.vertex_count());
    for (i, p) in mesh.vertices.iter().enumerate() {
        if used[i] {
            remap[i] = vertices.len() as u32;
            vertices.push(*p);
        }
    }

    let removed = mesh.vertex_count() - vertices.len();
    let faces = mesh
        .faces
        .iter()
        .enumerate()
        .map(|(fi, face)| (face.iter().map(|&i| remap[i as usize]).collect(), fi))
        .collect();
    (rebuild(mesh, vertices, faces), removed)
}

/// Split every quad into two triangles along its shorter diagonal
pub fn triangulate_faces(mesh: &SweepMesh) -> (SweepMesh, usize) {
    let mut split = 0;
    let mut faces: Vec<(Face, usize)> = Vec::with_capacity(mesh.triangle_count());
    for (fi, face) in mesh.faces.iter().enumerate() {
        if face.len() < 4 {
            faces.push((face.clone(), fi));
            continue;
        }
        split += 1;

        let p = |k: usize| mesh.vertices[face[k] as usize];
        let d02 = (p(2) - p(0)).norm_squared();
        let d13 = (p(3) - p(1)).norm_squared();
        let (a, b, c, d) = if d02 <= d13 {
            (face[0], face[1], face[2], face[3])
        } else {
            (face[1], face[2], face[3], face[0])
        };
        faces.push((Face::from_slice(&[a, b, c]), fi));
        faces.push((Face::from_slice(&[a, c, d]), fi));
    }
    (rebuild(mesh, mesh.vertices.clone(), faces), split)
}

/// Which cleanup passes to run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupOptions {
    /// Vertices closer than this are merged, 0 disables welding
    pub merge_distance: f64,
    pub remove_degenerate: bool,
    pub remove_loose: bool,
    pub triangulate: bool,
    /// Re-run the outward orientation pass at the end
    pub recalc_normals: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            merge_distance: 1e-4,
            remove_degenerate: true,
            remove_loose: true,
            triangulate: true,
            recalc_normals: true,
        }
    }
}

/// Counts of what cleanup changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub merged_vertices: usize,
    pub removed_degenerate_faces: usize,
    pub removed_loose_vertices: usize,
    pub triangulated_faces: usize,
    pub flipped_faces: usize,
}

/// Run the configured passes in export order
pub fn cleanup_mesh(mesh: &SweepMesh, options: &CleanupOptions) -> (SweepMesh, CleanupStats) {
    let mut stats = CleanupStats::default();
    let mut current = mesh.clone();

    if options.merge_distance > 0.0 {
        let (next, merged) = weld_vertices(&current, options.merge_distance);
        stats.merged_vertices = merged;
        current = next;
    }
    if options.remove_degenerate {
        let (next, removed) = remove_degenerate_faces(&current, DEGENERATE_AREA);
        stats.removed_degenerate_faces = removed;
        current = next;
    }
    if options.remove_loose {
        let (next, removed) = remove_loose_vertices(&current);
        stats.removed_loose_vertices = removed;
        current = next;
    }
    if options.triangulate {
        let (next, split) = triangulate_faces(&current);
        stats.triangulated_faces = split;
        current = next;
    }
    if options.recalc_normals {
        stats.flipped_faces = current.orient_outward();
    }

    debug!(?stats, "cleaned mesh");
    (current, stats)
}
