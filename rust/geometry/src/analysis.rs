// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh analysis
//!
//! Topology checks, volume and area, and self-intersection counting.
//! Analysis never fails; problems are reported in the result.

use std::collections::BTreeMap;

use nalgebra::{Point2, Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::bvh::{Aabb, Bvh};
use crate::cleanup::DEGENERATE_AREA;
use crate::mesh::{directed_edge_uses, edge_key, PatchName, SweepMesh};

/// Which optional checks to run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    pub check_self_intersections: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_self_intersections: true,
        }
    }
}

/// Snapshot of a mesh's validity for CFD export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub is_watertight: bool,
    pub is_manifold: bool,
    pub has_consistent_normals: bool,
    /// Edges used by more than two faces
    pub non_manifold_edges: usize,
    /// Vertices whose faces do not form a single fan
    pub non_manifold_verts: usize,
    /// Edges used by exactly one face
    pub boundary_edges: usize,
    /// Vertices no face references
    pub loose_verts: usize,
    /// Faces that collapse to a segment
    pub loose_edges: usize,
    pub degenerate_faces: usize,
    pub self_intersections: usize,
    /// Enclosed volume, zero unless watertight
    pub volume: f64,
    pub surface_area: f64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Summary counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    pub triangles: usize,
    pub volume: f64,
    pub surface_area: f64,
    pub is_manifold: bool,
    pub is_watertight: bool,
}

/// Fluid-domain summary for boundary-condition setup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CfdDomainInfo {
    pub volume: f64,
    pub is_watertight: bool,
    pub non_manifold_edges: usize,
    pub self_intersections: usize,
    pub patch_areas: BTreeMap<PatchName, f64>,
}

/// Signed volume by the divergence theorem over fan-triangulated faces
pub fn mesh_volume(mesh: &SweepMesh) -> f64 {
    let sum: f64 = mesh
        .triangles()
        .iter()
        .map(|(t, _)| {
            let p0 = mesh.vertices[t[0] as usize].coords;
            let p1 = mesh.vertices[t[1] as usize].coords;
            let p2 = mesh.vertices[t[2] as usize].coords;
            p0.dot(&p1.cross(&p2))
        })
        .sum();
    sum / 6.0
}

/// Sum of face areas
pub fn surface_area(mesh: &SweepMesh) -> f64 {
    (0..mesh.face_count()).map(|f| mesh.face_area(f)).sum()
}

/// Area per patch group
pub fn patch_areas(mesh: &SweepMesh) -> BTreeMap<PatchName, f64> {
    mesh.patches
        .iter()
        .map(|(name, faces)| (*name, faces.iter().map(|&f| mesh.face_area(f)).sum()))
        .collect()
}

/// Count vertices whose incident faces split into more than one fan
fn count_non_manifold_vertices(mesh: &SweepMesh) -> usize {
    let mut incident: Vec<SmallVec<[usize; 8]>> = vec![SmallVec::new(); mesh.vertex_count()];
    for (fi, face) in mesh.faces.iter().enumerate() {
        for &v in face {
            let list = &mut incident[v as usize];
            if list.last() != Some(&fi) {
                list.push(fi);
            }
        }
    }

    let edges = directed_edge_uses(&mesh.faces);

    incident
        .par_iter()
        .enumerate()
        .filter(|(v, faces)| {
            if faces.len() < 2 {
                return false;
            }
            let v = *v as u32;
            let local = |f: usize| faces.iter().position(|&g| g == f);
            let mut parent: SmallVec<[usize; 8]> = (0..faces.len()).collect();
            fn find(parent: &mut [usize], mut i: usize) -> usize {
                while parent[i] != i {
                    parent[i] = parent[parent[i]];
                    i = parent[i];
                }
                i
            }

            for (li, &f) in faces.iter().enumerate() {
                let face = &mesh.faces[f];
                let n = face.len();
                for k in 0..n {
                    if face[k] != v {
                        continue;
                    }
                    for w in [face[(k + 1) % n], face[(k + n - 1) % n]] {
                        if w == v {
                            continue;
                        }
                        let Some(uses) = edges.get(&edge_key(v, w)) else { continue };
                        if uses.len() > 2 {
                            // a vertex on a non-manifold edge is non-manifold
                            return true;
                        }
                        for &(g, _) in uses {
                            if let Some(lg) = local(g) {
                                let (ra, rb) = (find(&mut parent, li), find(&mut parent, lg));
                                parent[ra] = rb;
                            }
                        }
                    }
                }
            }

            let root = find(&mut parent, 0);
            (1..faces.len()).any(|i| find(&mut parent, i) != root)
        })
        .count()
}

/// Validate topology and geometry of a mesh
pub fn validate_mesh(mesh: &SweepMesh, options: &ValidationOptions) -> ValidationResult {
    let mut result = ValidationResult::default();

    if mesh.is_empty() {
        result.errors.push("Mesh has no faces".to_string());
        result.loose_verts = mesh.vertex_count();
        return result;
    }

    let edges = directed_edge_uses(&mesh.faces);
    let mut consistent = true;
    for uses in edges.values() {
        match uses.len() {
            1 => result.boundary_edges += 1,
            2 => {
                if uses[0].1 == uses[1].1 {
                    consistent = false;
                }
            }
            _ => result.non_manifold_edges += 1,
        }
    }
    result.has_consistent_normals = consistent;
    result.non_manifold_verts = count_non_manifold_vertices(mesh);

    let mut referenced = vec![false; mesh.vertex_count()];
    for face in &mesh.faces {
        for &v in face {
            referenced[v as usize] = true;
        }
        let mut distinct: SmallVec<[u32; 4]> = face.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() == 2 {
            result.loose_edges += 1;
        }
    }
    result.loose_verts = referenced.iter().filter(|&&r| !r).count();

    let areas: Vec<f64> = (0..mesh.face_count())
        .into_par_iter()
        .map(|f| mesh.face_area(f))
        .collect();
    result.degenerate_faces = areas.iter().filter(|&&a| a < DEGENERATE_AREA).count();
    result.surface_area = areas.iter().sum();

    result.is_watertight = result.boundary_edges == 0 && result.non_manifold_edges == 0;
    result.is_manifold = result.non_manifold_edges == 0 && result.non_manifold_verts == 0;
    if result.is_watertight {
        result.volume = mesh_volume(mesh);
    }
    if options.check_self_intersections {
        result.self_intersections = count_self_intersections(mesh);
    }

    if result.non_manifold_edges > 0 {
        result
            .warnings
            .push(format!("Found {} non-manifold edges", result.non_manifold_edges));
    }
    if result.non_manifold_verts > 0 {
        result
            .warnings
            .push(format!("Found {} non-manifold vertices", result.non_manifold_verts));
    }
    if result.loose_verts > 0 {
        result.warnings.push(format!("Found {} loose vertices", result.loose_verts));
    }
    if result.loose_edges > 0 {
        result.warnings.push(format!("Found {} loose edges", result.loose_edges));
    }
    if result.degenerate_faces > 0 {
        result
            .warnings
            .push(format!("Found {} degenerate faces", result.degenerate_faces));
    }
    if !result.has_consistent_normals {
        result.warnings.push("Face winding is inconsistent".to_string());
    }
    if result.self_intersections > 0 {
        result
            .warnings
            .push(format!("Found {} self-intersecting face pairs", result.self_intersections));
    }
    if !result.is_watertight {
        result
            .errors
            .push(format!("Mesh is not watertight ({} boundary edges)", result.boundary_edges));
    }

    result.is_valid = result.is_watertight
        && result.is_manifold
        && result.degenerate_faces == 0
        && result.loose_verts == 0
        && result.loose_edges == 0;

    debug!(
        valid = result.is_valid,
        watertight = result.is_watertight,
        boundary = result.boundary_edges,
        non_manifold = result.non_manifold_edges,
        "validated mesh"
    );
    result
}

/// Counts and measures in one pass
pub fn mesh_stats(mesh: &SweepMesh) -> MeshStats {
    let edges = directed_edge_uses(&mesh.faces);
    let non_manifold = edges.values().filter(|u| u.len() > 2).count();
    let boundary = edges.values().filter(|u| u.len() == 1).count();

    MeshStats {
        vertices: mesh.vertex_count(),
        edges: edges.len(),
        faces: mesh.face_count(),
        triangles: mesh.triangle_count(),
        volume: mesh_volume(mesh),
        surface_area: surface_area(mesh),
        is_manifold: non_manifold == 0,
        is_watertight: non_manifold == 0 && boundary == 0 && !mesh.is_empty(),
    }
}

/// Fluid-domain summary with patch areas
pub fn cfd_domain_info(mesh: &SweepMesh, options: &ValidationOptions) -> CfdDomainInfo {
    let validation = validate_mesh(mesh, options);
    CfdDomainInfo {
        volume: validation.volume,
        is_watertight: validation.is_watertight,
        non_manifold_edges: validation.non_manifold_edges,
        self_intersections: validation.self_intersections,
        patch_areas: patch_areas(mesh),
    }
}

/// Number of intersecting triangle pairs that share no vertex
pub fn count_self_intersections(mesh: &SweepMesh) -> usize {
    let triangles: Vec<[u32; 3]> = mesh.triangles().into_iter().map(|(t, _)| t).collect();
    if triangles.len() < 2 {
        return 0;
    }

    let corners = |t: &[u32; 3]| -> [Point3<f64>; 3] {
        [
            mesh.vertices[t[0] as usize],
            mesh.vertices[t[1] as usize],
            mesh.vertices[t[2] as usize],
        ]
    };
    let boxes: Vec<Aabb> = triangles.iter().map(|t| Aabb::from_points(&corners(t))).collect();
    let Some(bvh) = Bvh::build(&boxes) else {
        return 0;
    };

    let (min, max) = mesh.bounds();
    let tolerance = (max - min).norm().max(1.0) * 1e-9;

    // every pair is seen from both triangles
    let hits: usize = (0..triangles.len())
        .into_par_iter()
        .map(|i| {
            let a = &triangles[i];
            let pa = corners(a);
            let mut count = 0;
            bvh.query(&boxes[i].expanded(tolerance), |j| {
                if j == i {
                    return;
                }
                let b = &triangles[j];
                if a.iter().any(|v| b.contains(v)) {
                    return;
                }
                if triangles_intersect(&pa, &corners(b), tolerance) {
                    count += 1;
                }
            });
            count
        })
        .sum();

    hits / 2
}

/// Triangle-triangle overlap test; contact within `eps` does not count
pub fn triangles_intersect(a: &[Point3<f64>; 3], b: &[Point3<f64>; 3], eps: f64) -> bool {
    let Some(nb) = plane_normal(b) else { return false };
    let Some(na) = plane_normal(a) else { return false };

    let da = signed_distances(a, &nb, &b[0], eps);
    if same_side(&da) {
        return false;
    }
    let db = signed_distances(b, &na, &a[0], eps);
    if same_side(&db) {
        return false;
    }

    if da.iter().all(|d| *d == 0.0) {
        return coplanar_overlap(a, b, &na, eps);
    }

    let direction = na.cross(&nb);
    let axis = direction.iamax();
    let project = |t: &[Point3<f64>; 3]| [t[0][axis], t[1][axis], t[2][axis]];

    let (Some((a0, a1)), Some((b0, b1))) = (
        interval(&project(a), &da),
        interval(&project(b), &db),
    ) else {
        return false;
    };

    a0.max(b0) < a1.min(b1) - eps
}

fn plane_normal(t: &[Point3<f64>; 3]) -> Option<Vector3<f64>> {
    (t[1] - t[0]).cross(&(t[2] - t[0])).try_normalize(1e-15)
}

/// Distances to a plane, snapped to zero within `eps`
fn signed_distances(t: &[Point3<f64>; 3], normal: &Vector3<f64>, origin: &Point3<f64>, eps: f64) -> [f64; 3] {
    t.map(|p| {
        let d = normal.dot(&(p - origin));
        if d.abs() <= eps {
            0.0
        } else {
            d
        }
    })
}

#[inline]
fn same_side(d: &[f64; 3]) -> bool {
    d.iter().all(|&x| x > 0.0) || d.iter().all(|&x| x < 0.0)
}

/// Span of a triangle's crossing with the other triangle's plane
fn interval(p: &[f64; 3], d: &[f64; 3]) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut push = |x: f64| {
        lo = lo.min(x);
        hi = hi.max(x);
    };

    for i in 0..3 {
        let j = (i + 1) % 3;
        if d[i] == 0.0 {
            push(p[i]);
        }
        if d[i] * d[j] < 0.0 {
            push(p[i] + (p[j] - p[i]) * d[i] / (d[i] - d[j]));
        }
    }
    (lo <= hi).then_some((lo, hi))
}

fn coplanar_overlap(a: &[Point3<f64>; 3], b: &[Point3<f64>; 3], normal: &Vector3<f64>, eps: f64) -> bool {
    let drop = normal.iamax();
    let (u, v) = match drop {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let flat = |t: &[Point3<f64>; 3]| t.map(|p| Point2::new(p[u], p[v]));
    let (a2, b2) = (flat(a), flat(b));

    for i in 0..3 {
        for j in 0..3 {
            if segments_cross(&a2[i], &a2[(i + 1) % 3], &b2[j], &b2[(j + 1) % 3], eps) {
                return true;
            }
        }
    }
    strictly_inside(&a2[0], &b2, eps) || strictly_inside(&b2[0], &a2, eps)
}

#[inline]
fn orient(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_cross(p1: &Point2<f64>, p2: &Point2<f64>, q1: &Point2<f64>, q2: &Point2<f64>, eps: f64) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);
    let tol = eps * eps;
    ((d1 > tol && d2 < -tol) || (d1 < -tol && d2 > tol))
        && ((d3 > tol && d4 < -tol) || (d3 < -tol && d4 > tol))
}

fn strictly_inside(p: &Point2<f64>, t: &[Point2<f64>; 3], eps: f64) -> bool {
    let tol = eps * eps;
    let s = [orient(&t[0], &t[1], p), orient(&t[1], &t[2], p), orient(&t[2], &t[0], p)];
    s.iter().all(|&x| x > tol) || s.iter().all(|&x| x < -tol)
}
