// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Path sampling
//!
//! Turns a reference polyline into an ordered list of oriented stations.
//! Frames are propagated with a rotation-minimizing scheme so the profile
//! does not twist along gentle curves.

use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Points closer than this are treated as duplicates
const POINT_EPSILON: f64 = 1e-9;
/// Below this turning angle (radians) a station counts as straight
const ANGLE_EPSILON: f64 = 1e-6;
/// Curvature at which adaptive sampling reaches half of its refinement
const CURVATURE_REFERENCE: f64 = 0.5;
/// Cap on the normalized curvature term (step shrinks at most 5x)
const CURVATURE_CAP: f64 = 2.0;

/// Reference polyline supplied by the path provider
#[derive(Debug, Clone, PartialEq)]
pub struct PathPolyline {
    pub points: Vec<Point3<f64>>,
    pub closed: bool,
}

impl PathPolyline {
    pub fn new(points: Vec<Point3<f64>>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// Open polyline from plain coordinates
    pub fn open(points: &[[f64; 3]]) -> Self {
        Self::new(points.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect(), false)
    }

    /// Closed polyline from plain coordinates
    pub fn closed(points: &[[f64; 3]]) -> Self {
        Self::new(points.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect(), true)
    }

    /// Total length including the closing segment for closed paths
    pub fn length(&self) -> f64 {
        let seg: f64 = self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) => seg + (first - last).norm(),
            _ => seg,
        }
    }
}

/// Sampling controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Target spacing between stations in metres
    pub resolution: f64,
    /// Refine spacing where the path bends
    pub adaptive: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            adaptive: false,
        }
    }
}

/// Oriented sample along the path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Station {
    pub position: Point3<f64>,
    /// Unit direction of travel
    pub tangent: Vector3<f64>,
    /// Unit "up" of the profile plane
    pub normal: Vector3<f64>,
    /// Arc length from the path start
    pub station_distance: f64,
    /// Local radius of curvature, infinite on straight runs
    pub curve_radius: f64,
    /// Lateral turn direction in [-1, 1] relative to the binormal
    pub turn_sign: f64,
}

impl Station {
    /// Lateral axis of the profile plane
    #[inline]
    pub fn binormal(&self) -> Vector3<f64> {
        self.tangent.cross(&self.normal)
    }

    /// Place a profile point in world space
    #[inline]
    pub fn to_world(&self, p: &Point2<f64>) -> Point3<f64> {
        self.position + self.binormal() * p.x + self.normal * p.y
    }

    #[inline]
    pub fn is_straight(&self) -> bool {
        !self.curve_radius.is_finite()
    }

    /// Same station moved by a world-space offset
    pub fn translated(&self, offset: &Vector3<f64>) -> Station {
        Station {
            position: self.position + offset,
            ..*self
        }
    }

    /// Blend towards `other`; curvature data comes from the nearer station
    pub fn lerp(&self, other: &Station, u: f64) -> Station {
        if u <= 0.0 {
            return *self;
        }
        if u >= 1.0 {
            return *other;
        }

        let position = self.position + (other.position - self.position) * u;
        let tangent = (self.tangent * (1.0 - u) + other.tangent * u)
            .try_normalize(POINT_EPSILON)
            .unwrap_or(self.tangent);
        let blended = self.normal * (1.0 - u) + other.normal * u;
        let normal = (blended - tangent * blended.dot(&tangent))
            .try_normalize(POINT_EPSILON)
            .unwrap_or_else(|| initial_normal(&tangent));
        let nearest = if u < 0.5 { self } else { other };

        Station {
            position,
            tangent,
            normal,
            station_distance: self.station_distance
                + (other.station_distance - self.station_distance) * u,
            curve_radius: nearest.curve_radius,
            turn_sign: nearest.turn_sign,
        }
    }
}

/// Result of sampling a path
#[derive(Debug, Clone)]
pub struct SampledPath {
    pub stations: Vec<Station>,
    pub total_length: f64,
    pub cyclic: bool,
    /// Resolution the path was sampled with
    pub resolution: f64,
}

impl SampledPath {
    #[inline]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Number of stations on curved runs
    pub fn curved_station_count(&self) -> usize {
        self.stations.iter().filter(|s| !s.is_straight()).count()
    }

    /// Interpolated station at an arc-length distance (clamped to the path)
    pub fn station_at(&self, distance: f64) -> Option<Station> {
        let first = self.stations.first()?;
        let last = self.stations.last()?;
        if distance <= first.station_distance {
            return Some(*first);
        }
        if distance >= last.station_distance {
            return Some(*last);
        }

        let i = self
            .stations
            .partition_point(|s| s.station_distance <= distance)
            .saturating_sub(1);
        let a = &self.stations[i];
        let b = &self.stations[(i + 1).min(self.stations.len() - 1)];
        let span = b.station_distance - a.station_distance;
        if span <= POINT_EPSILON {
            return Some(*a);
        }
        Some(a.lerp(b, (distance - a.station_distance) / span))
    }

    /// Stations covering `[from, to]`, with interpolated stations on both bounds.
    ///
    /// Sampled stations closer than `min_gap` to a bound are skipped so no
    /// sliver rings appear next to the interpolated ones.
    pub fn stations_between(&self, from: f64, to: f64, min_gap: f64) -> Vec<Station> {
        let (Some(start), Some(end)) = (self.station_at(from), self.station_at(to)) else {
            return Vec::new();
        };

        let mut out = vec![start];
        out.extend(self.stations.iter().filter(|s| {
            s.station_distance > from + min_gap && s.station_distance < to - min_gap
        }));
        out.push(end);
        out
    }
}

/// Cumulative-length view of a polyline
struct Polyline {
    points: Vec<Point3<f64>>,
    cumulative: Vec<f64>,
}

impl Polyline {
    fn new(points: Vec<Point3<f64>>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in points.windows(2) {
            total += (w[1] - w[0]).norm();
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Segment index containing arc length `s`
    fn segment_at(&self, s: f64) -> usize {
        let last_segment = self.points.len().saturating_sub(2);
        self.cumulative
            .partition_point(|&c| c <= s)
            .saturating_sub(1)
            .min(last_segment)
    }

    fn point_at(&self, s: f64) -> Point3<f64> {
        let s = s.clamp(0.0, self.length());
        let i = self.segment_at(s);
        let (a, b) = (&self.points[i], &self.points[i + 1]);
        let seg = self.cumulative[i + 1] - self.cumulative[i];
        if seg <= POINT_EPSILON {
            return *a;
        }
        a + (b - a) * ((s - self.cumulative[i]) / seg)
    }

    /// Discrete curvature at each polyline vertex (turning angle per length)
    fn vertex_curvatures(&self, closed: bool) -> Vec<f64> {
        let n = self.points.len();
        (0..n)
            .map(|i| {
                let (prev, next) = if closed && (i == 0 || i == n - 1) {
                    // first and last vertex coincide on closed paths
                    (n - 2, 1)
                } else if i == 0 || i == n - 1 {
                    return 0.0;
                } else {
                    (i - 1, i + 1)
                };
                let a = self.points[i] - self.points[prev];
                let b = self.points[next] - self.points[i];
                let (la, lb) = (a.norm(), b.norm());
                if la <= POINT_EPSILON || lb <= POINT_EPSILON {
                    return 0.0;
                }
                a.angle(&b) / ((la + lb) * 0.5)
            })
            .collect()
    }
}

/// Sample a path into oriented stations
pub fn sample_path(path: &PathPolyline, params: &SamplingParams) -> Result<SampledPath> {
    let r = params.resolution;
    if !(r.is_finite() && r > 0.0) {
        return Err(Error::InvalidPath(format!(
            "resolution must be positive, got {}",
            r
        )));
    }
    if path.points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return Err(Error::InvalidPath("path contains non-finite coordinates".into()));
    }

    let mut points: Vec<Point3<f64>> = Vec::with_capacity(path.points.len() + 1);
    for p in &path.points {
        if points.last().map_or(true, |q| (p - q).norm() > POINT_EPSILON) {
            points.push(*p);
        }
    }
    if path.closed {
        if let (Some(first), Some(last)) = (points.first().copied(), points.last()) {
            if points.len() > 1 && (last - first).norm() <= POINT_EPSILON {
                points.pop();
            }
        }
    }
    if points.len() < 2 {
        return Err(Error::InvalidPath(format!(
            "need at least 2 distinct points, got {}",
            points.len()
        )));
    }
    if path.closed {
        points.push(points[0]);
    }

    let polyline = Polyline::new(points);
    let total_length = polyline.length();
    if total_length <= 0.0 || !total_length.is_finite() {
        return Err(Error::InvalidPath("path has zero length".into()));
    }

    let mut params_t = if params.adaptive {
        adaptive_parameters(&polyline, path.closed, r)
    } else {
        uniform_parameters(total_length, r)
    };

    let mut positions: Vec<Point3<f64>> = params_t
        .iter()
        .map(|&t| polyline.point_at(t * total_length))
        .collect();

    if path.closed && positions.len() > 1 {
        let first = positions[0];
        if let Some(last) = positions.last() {
            if (last - first).norm() < r * 0.5 {
                positions.pop();
                params_t.pop();
            }
        }
        if positions.len() < 3 {
            return Err(Error::InvalidPath(format!(
                "closed path of length {:.3} needs a resolution below {:.3}",
                total_length,
                total_length / 3.0
            )));
        }
    }

    let tangents = sample_tangents(&positions, path.closed);
    let normals = propagate_frames(&tangents);
    let (curve_radii, turn_signs) = annotate_curvature(&positions, &tangents, &normals, path.closed);

    let stations: Vec<Station> = (0..positions.len())
        .map(|i| Station {
            position: positions[i],
            tangent: tangents[i],
            normal: normals[i],
            station_distance: params_t[i] * total_length,
            curve_radius: curve_radii[i],
            turn_sign: turn_signs[i],
        })
        .collect();

    debug!(
        stations = stations.len(),
        length = total_length,
        cyclic = path.closed,
        adaptive = params.adaptive,
        "sampled path"
    );

    Ok(SampledPath {
        stations,
        total_length,
        cyclic: path.closed,
        resolution: r,
    })
}

/// `ceil(L / r) + 1` equally spaced parameters in [0, 1]
fn uniform_parameters(length: f64, r: f64) -> Vec<f64> {
    let count = ((length / r).ceil() as usize + 1).max(2);
    let last = (count - 1) as f64;
    (0..count).map(|i| i as f64 / last).collect()
}

/// Parameters whose spacing shrinks with local curvature
fn adaptive_parameters(polyline: &Polyline, closed: bool, r: f64) -> Vec<f64> {
    let length = polyline.length();
    let curvatures = polyline.vertex_curvatures(closed);
    let base_step = r / length;
    let finest_step = base_step / (1.0 + 2.0 * CURVATURE_CAP);

    let mut params = vec![0.0];
    let mut t = 0.0;
    loop {
        let i = polyline.segment_at(t * length);
        let local = curvatures[i].max(curvatures[i + 1]);
        let factor = (local / CURVATURE_REFERENCE).min(CURVATURE_CAP);
        t += base_step / (1.0 + 2.0 * factor);
        // a remainder below the finest step merges into the last gap
        if t >= 1.0 - finest_step {
            break;
        }
        params.push(t);
    }
    params.push(1.0);
    params
}

fn sample_tangents(positions: &[Point3<f64>], cyclic: bool) -> Vec<Vector3<f64>> {
    let n = positions.len();
    let forward = |i: usize| -> Vector3<f64> {
        let j = if cyclic { (i + 1) % n } else { (i + 1).min(n - 1) };
        positions[j] - positions[i]
    };
    let backward = |i: usize| -> Vector3<f64> {
        let j = if cyclic { (i + n - 1) % n } else { i.saturating_sub(1) };
        positions[i] - positions[j]
    };

    let mut previous = Vector3::x();
    (0..n)
        .map(|i| {
            let (f, b) = (forward(i), backward(i));
            let t = (f + b)
                .try_normalize(POINT_EPSILON)
                .or_else(|| f.try_normalize(POINT_EPSILON))
                .or_else(|| b.try_normalize(POINT_EPSILON))
                .unwrap_or(previous);
            previous = t;
            t
        })
        .collect()
}

/// Normal perpendicular to `tangent`, derived from world up
fn initial_normal(tangent: &Vector3<f64>) -> Vector3<f64> {
    let up = if tangent.dot(&Vector3::z()).abs() > 0.99 {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let binormal = tangent.cross(&up).normalize();
    binormal.cross(tangent).normalize()
}

/// Rotation-minimizing normals along the tangents
fn propagate_frames(tangents: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    let mut normals = Vec::with_capacity(tangents.len());
    let mut previous = initial_normal(&tangents[0]);
    normals.push(previous);

    for t in &tangents[1..] {
        let projected = previous - t * previous.dot(t);
        let normal = if projected.norm() < 1e-6 {
            initial_normal(t)
        } else {
            projected.normalize()
        };
        normals.push(normal);
        previous = normal;
    }
    normals
}

/// Per-station curve radius and turn sign
fn annotate_curvature(
    positions: &[Point3<f64>],
    tangents: &[Vector3<f64>],
    normals: &[Vector3<f64>],
    cyclic: bool,
) -> (Vec<f64>, Vec<f64>) {
    let n = positions.len();
    let mut radii = vec![f64::INFINITY; n];
    let mut signs = vec![0.0; n];

    let interior: Vec<usize> = if cyclic {
        (0..n).collect()
    } else {
        (1..n.saturating_sub(1)).collect()
    };

    for &i in &interior {
        let prev = positions[(i + n - 1) % n];
        let next = positions[(i + 1) % n];
        let a = positions[i] - prev;
        let b = next - positions[i];
        let (la, lb) = (a.norm(), b.norm());
        if la <= POINT_EPSILON || lb <= POINT_EPSILON {
            continue;
        }

        let angle = a.angle(&b);
        if angle < ANGLE_EPSILON {
            continue;
        }
        radii[i] = ((la + lb) * 0.5) / angle;

        let bend = b / lb - a / la;
        let bend_len = bend.norm();
        if bend_len > POINT_EPSILON {
            let binormal = tangents[i].cross(&normals[i]);
            signs[i] = (bend.dot(&binormal) / bend_len).clamp(-1.0, 1.0);
        }
    }

    if !cyclic && n >= 3 {
        radii[0] = radii[1];
        signs[0] = signs[1];
        radii[n - 1] = radii[n - 2];
        signs[n - 1] = signs[n - 2];
    }
    (radii, signs)
}
