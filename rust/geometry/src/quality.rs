// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CFD cell quality metrics
//!
//! Equiangle skewness and aspect ratio per face, non-orthogonality per
//! interior edge. Per-face work runs on rayon and is collected in face
//! order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mesh::{directed_edge_uses, SweepMesh};

/// Overall rating from the worst metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityRating {
    /// Rate from maximum skewness, aspect ratio and non-orthogonality (degrees)
    pub fn from_maxima(skewness: f64, aspect_ratio: f64, non_orthogonality: f64) -> Self {
        if skewness > 0.85 || aspect_ratio > 100.0 || non_orthogonality > 70.0 {
            Self::Poor
        } else if skewness > 0.65 || aspect_ratio > 20.0 || non_orthogonality > 50.0 {
            Self::Fair
        } else if skewness > 0.4 || aspect_ratio > 10.0 || non_orthogonality > 30.0 {
            Self::Good
        } else {
            Self::Excellent
        }
    }
}

/// Min, max and mean of a metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let (min, max, sum) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v),
        );
        Self {
            min,
            max,
            avg: sum / values.len() as f64,
            count: values.len(),
        }
    }
}

/// Quality of a completed mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub skewness: MetricSummary,
    pub aspect_ratio: MetricSummary,
    /// Degrees, folded into [0, 90]
    pub non_orthogonality: MetricSummary,
    pub rating: QualityRating,
}

/// Shortest edge treated as zero-length
const MIN_EDGE: f64 = 1e-12;

/// Equiangle skewness of a polygon face: 0 is ideal, 1 is degenerate
pub fn face_skewness(mesh: &SweepMesh, face: usize) -> f64 {
    let points = mesh.face_points(face);
    let n = points.len();
    if n < 3 {
        return 1.0;
    }

    let ideal = 180.0 * (n as f64 - 2.0) / n as f64;
    let mut min_angle = f64::INFINITY;
    let mut max_angle = f64::NEG_INFINITY;
    for i in 0..n {
        let prev = points[(i + n - 1) % n] - points[i];
        let next = points[(i + 1) % n] - points[i];
        if prev.norm() < MIN_EDGE || next.norm() < MIN_EDGE {
            return 1.0;
        }
        let angle = prev.angle(&next).to_degrees();
        min_angle = min_angle.min(angle);
        max_angle = max_angle.max(angle);
    }

    ((max_angle - ideal) / (180.0 - ideal))
        .max((ideal - min_angle) / ideal)
        .clamp(0.0, 1.0)
}

/// Longest over shortest edge
pub fn face_aspect_ratio(mesh: &SweepMesh, face: usize) -> f64 {
    let points = mesh.face_points(face);
    let n = points.len();
    let (shortest, longest) = (0..n)
        .map(|i| (points[(i + 1) % n] - points[i]).norm())
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), e| (lo.min(e), hi.max(e)));
    longest / shortest.max(MIN_EDGE)
}

/// Angle between the normals of faces sharing each two-face edge, in degrees
/// folded into [0, 90]
pub fn edge_non_orthogonality(mesh: &SweepMesh) -> Vec<f64> {
    let normals: Vec<_> = (0..mesh.face_count())
        .into_par_iter()
        .map(|f| mesh.face_normal(f))
        .collect();

    let mut pairs: Vec<(usize, usize)> = directed_edge_uses(&mesh.faces)
        .into_values()
        .filter(|uses| uses.len() == 2)
        .map(|uses| (uses[0].0, uses[1].0))
        .collect();
    // hash map order is arbitrary
    pairs.sort_unstable();

    pairs
        .par_iter()
        .filter_map(|&(a, b)| {
            let (na, nb) = (normals[a]?, normals[b]?);
            let angle = na.dot(&nb).clamp(-1.0, 1.0).acos().to_degrees();
            Some(angle.min(180.0 - angle))
        })
        .collect()
}

/// Compute every metric and the overall rating
pub fn compute_quality(mesh: &SweepMesh) -> QualityMetrics {
    let per_face: Vec<(f64, f64)> = (0..mesh.face_count())
        .into_par_iter()
        .map(|f| (face_skewness(mesh, f), face_aspect_ratio(mesh, f)))
        .collect();
    let (skew, aspect): (Vec<f64>, Vec<f64>) = per_face.into_iter().unzip();
    let ortho = edge_non_orthogonality(mesh);

    let skewness = MetricSummary::from_values(&skew);
    let aspect_ratio = MetricSummary::from_values(&aspect);
    let non_orthogonality = MetricSummary::from_values(&ortho);
    let rating = QualityRating::from_maxima(skewness.max, aspect_ratio.max, non_orthogonality.max);

    QualityMetrics {
        skewness,
        aspect_ratio,
        non_orthogonality,
        rating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn grid(nx: usize, ny: usize, dx: f64, dy: f64) -> SweepMesh {
        let mut mesh = SweepMesh::new();
        for j in 0..=ny {
            for i in 0..=nx {
                mesh.add_vertex(Point3::new(i as f64 * dx, j as f64 * dy, 0.0));
            }
        }
        let row = (nx + 1) as u32;
        for j in 0..ny as u32 {
            for i in 0..nx as u32 {
                let a = j * row + i;
                mesh.add_quad(a, a + 1, a + row + 1, a + row, None);
            }
        }
        mesh
    }

    #[test]
    fn test_flat_square_grid_is_excellent() {
        let quality = compute_quality(&grid(4, 4, 1.0, 1.0));
        assert_relative_eq!(quality.skewness.max, 0.0, epsilon = 1e-9);
        assert_relative_eq!(quality.aspect_ratio.max, 1.0, epsilon = 1e-12);
        assert_relative_eq!(quality.non_orthogonality.max, 0.0, epsilon = 1e-6);
        assert_eq!(quality.skewness.count, 16);
        assert_eq!(quality.rating, QualityRating::Excellent);
    }

    #[test]
    fn test_stretched_cells_rate_by_aspect() {
        let quality = compute_quality(&grid(2, 2, 30.0, 1.0));
        assert_relative_eq!(quality.aspect_ratio.max, 30.0, epsilon = 1e-12);
        assert_eq!(quality.rating, QualityRating::Fair);
    }

    #[test]
    fn test_equilateral_triangle_has_zero_skew() {
        let mut mesh = SweepMesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0));
        mesh.add_vertex(Point3::new(0.5, 0.1, 0.0));
        mesh.add_triangle(0, 1, 2, None);
        mesh.add_triangle(0, 1, 3, None);

        assert_relative_eq!(face_skewness(&mesh, 0), 0.0, epsilon = 1e-9);
        assert!(face_skewness(&mesh, 1) > 0.85);
    }

    #[test]
    fn test_rating_thresholds() {
        assert_eq!(QualityRating::from_maxima(0.3, 5.0, 20.0), QualityRating::Excellent);
        assert_eq!(QualityRating::from_maxima(0.5, 5.0, 20.0), QualityRating::Good);
        assert_eq!(QualityRating::from_maxima(0.3, 5.0, 55.0), QualityRating::Fair);
        assert_eq!(QualityRating::from_maxima(0.3, 150.0, 20.0), QualityRating::Poor);
    }
}
