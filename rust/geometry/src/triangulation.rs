// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! Fan triangulation for convex profiles, earcutr for everything else.

use crate::{Error, Point2, Result};

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
pub fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        // Cross product of edges
        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false; // Sign changed - not convex
            }
        }
    }

    true
}

/// True when some vertex lies on the straight line through its neighbors
pub fn has_collinear_vertices(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    (0..n).any(|i| {
        let p0 = &points[(i + n - 1) % n];
        let p1 = &points[i];
        let p2 = &points[(i + 1) % n];
        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);
        let scale = (p1 - p0).norm() * (p2 - p1).norm();
        cross.abs() <= 1e-10 * scale.max(1e-300)
    })
}

/// Signed area of a polygon (positive for counter-clockwise order)
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    let mut twice = 0.0;
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        twice += a.x * b.y - b.x * a.y;
    }
    twice * 0.5
}

/// Area centroid of a simple polygon, vertex average for degenerate input
pub fn centroid(points: &[Point2<f64>]) -> Point2<f64> {
    let n = points.len();
    let area = signed_area(points);
    if area.abs() < 1e-14 {
        let sum = points
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        return Point2::from(sum / n.max(1) as f64);
    }

    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Point2::new(cx / (6.0 * area), cy / (6.0 * area))
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a simple polygon (no holes)
/// Returns triangle indices into the input points
#[inline]
pub fn triangulate_polygon(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();

    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    // FAST PATH: Triangle - no triangulation needed
    if n == 3 {
        return Ok(vec![0, 1, 2]);
    }

    // FAST PATH: Convex quad - simple fan
    if n == 4 && is_convex(points) {
        return Ok(vec![0, 1, 2, 0, 2, 3]);
    }

    // FAST PATH: Convex polygon without collinear runs - use fan triangulation
    if is_convex(points) && !has_collinear_vertices(points) {
        return Ok(fan_triangulate(n));
    }

    // Flatten points for earcutr
    let mut vertices = Vec::with_capacity(n * 2);
    for p in points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let indices = earcutr::earcut(&vertices, &[], 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))?;

    if indices.is_empty() {
        return Err(Error::TriangulationError(
            "Polygon produced no triangles".to_string(),
        ));
    }

    Ok(indices)
}

/// End cap triangles for a swept profile.
///
/// Index `points.len()` refers to `center` when it is present.
#[derive(Debug, Clone, PartialEq)]
pub struct CapTriangles {
    pub center: Option<Point2<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

/// Triangulate a profile cap so that every boundary vertex is used.
///
/// Subdivided profiles carry collinear vertices that earcut would drop,
/// leaving T-junctions against the side strips. Convex profiles with such
/// runs get a fan around their centroid instead. Triangles come back
/// counter-clockwise.
pub fn triangulate_cap(points: &[Point2<f64>]) -> Result<CapTriangles> {
    let n = points.len();
    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    if is_convex(points) && has_collinear_vertices(points) {
        let center = centroid(points);
        let ccw = signed_area(points) >= 0.0;
        let triangles = (0..n)
            .map(|i| {
                let j = (i + 1) % n;
                if ccw {
                    [n, i, j]
                } else {
                    [n, j, i]
                }
            })
            .collect();
        return Ok(CapTriangles {
            center: Some(center),
            triangles,
        });
    }

    let indices = triangulate_polygon(points)?;
    let triangles = indices
        .chunks_exact(3)
        .map(|t| {
            let tri = [points[t[0]], points[t[1]], points[t[2]]];
            if signed_area(&tri) < 0.0 {
                [t[0], t[2], t[1]]
            } else {
                [t[0], t[1], t[2]]
            }
        })
        .collect();

    Ok(CapTriangles {
        center: None,
        triangles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_triangulate_square() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];

        let indices = triangulate_polygon(&points).unwrap();

        // Square should be split into 2 triangles = 6 indices
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn test_triangulate_insufficient_points() {
        let points = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];

        let result = triangulate_polygon(&points);
        assert!(result.is_err());
    }

    #[test]
    fn test_triangulate_non_convex() {
        // L-shape
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];

        let indices = triangulate_polygon(&points).unwrap();
        assert_eq!(indices.len(), 12);
    }

    #[test]
    fn test_signed_area_and_centroid() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert_relative_eq!(signed_area(&points), 2.0);
        let c = centroid(&points);
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 0.5);
    }

    #[test]
    fn test_cap_uses_collinear_vertices() {
        // Rectangle with a subdivided bottom edge
        let points = vec![
            Point2::new(-1.0, 0.0),
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0),
        ];
        assert!(has_collinear_vertices(&points));

        let cap = triangulate_cap(&points).unwrap();
        assert!(cap.center.is_some());
        assert_eq!(cap.triangles.len(), 5);
        assert!(cap.triangles.iter().any(|t| t.contains(&1)));
    }

    #[test]
    fn test_cap_triangles_are_counter_clockwise() {
        let points: Vec<Point2<f64>> = (0..12)
            .map(|i| {
                let a = i as f64 / 12.0 * std::f64::consts::TAU;
                Point2::new(a.cos(), a.sin())
            })
            .collect();

        let cap = triangulate_cap(&points).unwrap();
        assert!(cap.center.is_none());
        assert_eq!(cap.triangles.len(), 10);
        let total: f64 = cap
            .triangles
            .iter()
            .map(|t| signed_area(&[points[t[0]], points[t[1]], points[t[2]]]))
            .inspect(|a| assert!(*a > 0.0))
            .sum();
        assert_relative_eq!(total, signed_area(&points), epsilon = 1e-12);
    }
}
