// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-section profiles
//!
//! Profiles live in the section plane: `x` is lateral (along the station
//! binormal) and `y` points up (along the station normal). Points run
//! counter-clockwise and every edge `i -> i + 1` carries a role.

use std::f64::consts::PI;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mesh::PatchName;

/// Arc segments for an open circular section without subdivision
pub const OPEN_CIRCULAR_MIN_SEGMENTS: usize = 16;
/// Segments for a closed pipe without subdivision
pub const CLOSED_PIPE_MIN_SEGMENTS: usize = 24;

/// Supported section families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    #[default]
    Trapezoidal,
    Rectangular,
    Triangular,
    OpenCircular,
    ClosedPipe,
}

impl SectionType {
    #[inline]
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::OpenCircular | Self::ClosedPipe)
    }

    /// Closed sections have no free surface
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedPipe)
    }
}

/// Section dimensions in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionParams {
    pub section_type: SectionType,
    /// Bottom width, or diameter for circular sections
    pub bottom_width: f64,
    /// Horizontal run per unit rise of the side walls
    pub side_slope: f64,
    /// Design water height
    pub height: f64,
    pub freeboard: f64,
    /// Wall lining thickness, 0 for none
    pub lining_thickness: f64,
    /// Resample straight edges and circles to `profile_resolution`
    pub subdivide: bool,
    /// Target edge length for subdivision
    pub profile_resolution: f64,
}

impl Default for SectionParams {
    fn default() -> Self {
        Self {
            section_type: SectionType::Trapezoidal,
            bottom_width: 2.0,
            side_slope: 1.5,
            height: 2.0,
            freeboard: 0.3,
            lining_thickness: 0.15,
            subdivide: true,
            profile_resolution: 1.0,
        }
    }
}

impl SectionParams {
    /// Height plus freeboard
    #[inline]
    pub fn total_height(&self) -> f64 {
        self.height + self.freeboard
    }

    /// Effective side slope (zero for rectangular sections)
    #[inline]
    pub fn slope(&self) -> f64 {
        match self.section_type {
            SectionType::Rectangular => 0.0,
            _ => self.side_slope,
        }
    }

    /// Circle radius for circular sections
    #[inline]
    pub fn radius(&self) -> f64 {
        self.bottom_width * 0.5
    }

    /// Top width of the inner profile
    pub fn top_width(&self) -> f64 {
        let h = self.total_height();
        match self.section_type {
            SectionType::Trapezoidal | SectionType::Rectangular => {
                self.bottom_width + 2.0 * self.slope() * h
            }
            SectionType::Triangular => 2.0 * self.side_slope * h,
            SectionType::OpenCircular | SectionType::ClosedPipe => self.bottom_width,
        }
    }

    #[inline]
    pub fn has_lining(&self) -> bool {
        self.lining_thickness > 0.0
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidProfile(format!("{} must be positive, got {}", name, value)))
            }
        };
        let non_negative = |name: &str, value: f64| -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidProfile(format!("{} must not be negative, got {}", name, value)))
            }
        };

        match self.section_type {
            SectionType::Trapezoidal => {
                positive("bottom_width", self.bottom_width)?;
                non_negative("side_slope", self.side_slope)?;
                positive("height", self.height)?;
            }
            SectionType::Rectangular => {
                positive("bottom_width", self.bottom_width)?;
                positive("height", self.height)?;
            }
            SectionType::Triangular => {
                positive("side_slope", self.side_slope)?;
                positive("height", self.height)?;
            }
            SectionType::OpenCircular | SectionType::ClosedPipe => {
                positive("diameter", self.bottom_width)?;
            }
        }
        non_negative("freeboard", self.freeboard)?;
        non_negative("lining_thickness", self.lining_thickness)?;
        if self.subdivide {
            positive("profile_resolution", self.profile_resolution)?;
        }
        Ok(())
    }
}

/// What a profile edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRole {
    Bed,
    Wall,
    FreeSurface,
}

impl EdgeRole {
    /// Patch that faces swept from this edge belong to
    #[inline]
    pub fn patch(&self) -> PatchName {
        match self {
            Self::Bed => PatchName::Bottom,
            Self::Wall => PatchName::Walls,
            Self::FreeSurface => PatchName::Top,
        }
    }
}

/// Closed 2D polygon with one role per edge
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProfile {
    pub points: Vec<Point2<f64>>,
    /// `roles[i]` describes the edge from `points[i]` to `points[i + 1]`
    pub roles: Vec<EdgeRole>,
}

impl ChannelProfile {
    pub fn new(points: Vec<Point2<f64>>, roles: Vec<EdgeRole>) -> Self {
        debug_assert_eq!(points.len(), roles.len());
        Self { points, roles }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Vertex indices of edge `i`
    #[inline]
    pub fn edge(&self, i: usize) -> (usize, usize) {
        (i, (i + 1) % self.points.len())
    }

    pub fn edge_length(&self, i: usize) -> f64 {
        let (a, b) = self.edge(i);
        (self.points[b] - self.points[a]).norm()
    }

    /// Largest lateral extent from the centerline
    pub fn half_width(&self) -> f64 {
        self.points.iter().fold(0.0, |m, p| m.max(p.x.abs()))
    }

    /// Enclosed area
    pub fn area(&self) -> f64 {
        crate::triangulation::signed_area(&self.points).abs()
    }

    /// Sum of the lengths of edges with the given role
    pub fn role_length(&self, role: EdgeRole) -> f64 {
        (0..self.len())
            .filter(|&i| self.roles[i] == role)
            .map(|i| self.edge_length(i))
            .sum()
    }

    pub fn has_free_surface(&self) -> bool {
        self.roles.contains(&EdgeRole::FreeSurface)
    }

    /// First and last vertex of the free-surface chain, in profile order
    pub fn free_surface_chain(&self) -> Option<(usize, usize)> {
        let n = self.len();
        let first_edge = (0..n).find(|&i| {
            self.roles[i] == EdgeRole::FreeSurface
                && self.roles[(i + n - 1) % n] != EdgeRole::FreeSurface
        })?;
        let mut last_edge = first_edge;
        while self.roles[(last_edge + 1) % n] == EdgeRole::FreeSurface
            && (last_edge + 1) % n != first_edge
        {
            last_edge = (last_edge + 1) % n;
        }
        Some((first_edge, (last_edge + 1) % n))
    }

    /// Same roles, new point positions
    pub fn with_points(&self, points: Vec<Point2<f64>>) -> Self {
        debug_assert_eq!(points.len(), self.points.len());
        Self {
            points,
            roles: self.roles.clone(),
        }
    }
}

/// Inner profile and optional lining profile with matching vertex order
#[derive(Debug, Clone, PartialEq)]
pub struct SectionProfiles {
    pub inner: ChannelProfile,
    pub outer: Option<ChannelProfile>,
}

impl SectionProfiles {
    /// Vertices per station ring
    #[inline]
    pub fn ring_size(&self) -> usize {
        self.inner.len() + self.outer.as_ref().map_or(0, ChannelProfile::len)
    }

    /// Half width used by the curvature guard
    pub fn half_width(&self) -> f64 {
        self.outer.as_ref().unwrap_or(&self.inner).half_width()
    }
}

/// How much of the section the fluid domain fills
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "level", rename_all = "snake_case")]
pub enum FillMode {
    /// Full channel height including freeboard
    #[default]
    Full,
    /// Truncate at a water level above the bed
    WaterLevel(f64),
}

/// Segment counts shared by every ring of one sweep.
///
/// Rings built from the same layout have the same vertex count and edge
/// roles, whatever their dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLayout {
    /// Segments per edge of a straight-sided corner polygon
    Polygon(Vec<usize>),
    /// Circular arc closed by a free-surface chord
    Arc { arc: usize, chord: usize },
    /// Full circle
    Ring(usize),
}

impl ProfileLayout {
    /// Grow every count so it also covers `other`
    pub fn widen(&mut self, other: &ProfileLayout) -> Result<()> {
        match (self, other) {
            (Self::Polygon(a), Self::Polygon(b)) if a.len() == b.len() => {
                for (x, y) in a.iter_mut().zip(b) {
                    *x = (*x).max(*y);
                }
            }
            (Self::Arc { arc, chord }, Self::Arc { arc: other_arc, chord: other_chord }) => {
                *arc = (*arc).max(*other_arc);
                *chord = (*chord).max(*other_chord);
            }
            (Self::Ring(a), Self::Ring(b)) => *a = (*a).max(*b),
            (a, b) => {
                return Err(Error::InvalidProfile(format!(
                    "section topology changes from {:?} to {:?}",
                    a, b
                )))
            }
        }
        Ok(())
    }
}

/// Corner polygon before subdivision
struct Outline {
    inner: Vec<Point2<f64>>,
    outer: Option<Vec<Point2<f64>>>,
    roles: Vec<EdgeRole>,
}

impl Outline {
    /// One count per edge, shared by inner and outer
    fn segments(&self, target: Option<f64>) -> Vec<usize> {
        let n = self.inner.len();
        (0..n)
            .map(|i| {
                let j = (i + 1) % n;
                let inner_len = (self.inner[j] - self.inner[i]).norm();
                let outer_len = self.outer.as_ref().map_or(0.0, |o| (o[j] - o[i]).norm());
                segment_count(inner_len.max(outer_len), target)
            })
            .collect()
    }
}

/// Section shape before subdivision
enum Shape {
    Straight(Outline),
    /// Arc around the invert spanning `half_angle` to either side of it
    Arc {
        r: f64,
        t: f64,
        half_angle: f64,
        /// Length the arc segment count is derived from
        circumference: f64,
        minimum: usize,
    },
    Ring {
        r: f64,
        t: f64,
        circumference: f64,
        minimum: usize,
    },
}

impl Shape {
    fn layout(&self, target: Option<f64>) -> ProfileLayout {
        match self {
            Self::Straight(outline) => ProfileLayout::Polygon(outline.segments(target)),
            Self::Arc {
                r,
                t,
                half_angle,
                circumference,
                minimum,
            } => ProfileLayout::Arc {
                arc: arc_segments(*circumference, *minimum, target),
                chord: segment_count(2.0 * (r + t) * half_angle.sin(), target),
            },
            Self::Ring {
                circumference,
                minimum,
                ..
            } => ProfileLayout::Ring(arc_segments(*circumference, *minimum, target)),
        }
    }

    fn build(self, layout: &ProfileLayout) -> Result<SectionProfiles> {
        match (self, layout) {
            (Self::Straight(outline), ProfileLayout::Polygon(segments))
                if segments.len() == outline.inner.len() =>
            {
                Ok(subdivide_outline(outline, segments))
            }
            (Self::Arc { r, t, half_angle, .. }, ProfileLayout::Arc { arc, chord }) => {
                Ok(wetted_arc_profiles(r, t, *arc, *chord, half_angle))
            }
            (Self::Ring { r, t, .. }, ProfileLayout::Ring(segments)) => {
                Ok(ring_profiles(r, t, *segments))
            }
            (_, layout) => Err(Error::InvalidProfile(format!(
                "layout {:?} does not fit the section shape",
                layout
            ))),
        }
    }
}

/// Target edge length, `None` when subdivision is off
#[inline]
fn target_length(params: &SectionParams) -> Option<f64> {
    params.subdivide.then_some(params.profile_resolution)
}

/// Pieces a straight edge of `length` is split into
fn segment_count(length: f64, target: Option<f64>) -> usize {
    target.map_or(1, |t| ((length / t).ceil() as usize).max(1))
}

/// Segment count for a circular arc
fn arc_segments(circumference: f64, minimum: usize, target: Option<f64>) -> usize {
    target.map_or(minimum, |t| ((circumference / t).ceil() as usize).max(minimum))
}

/// Straight-sided corner polygon up to `height`
fn straight_outline(params: &SectionParams, height: f64, t: f64) -> Outline {
    match params.section_type {
        SectionType::Triangular => triangle_outline(params.side_slope, height, t),
        _ => trapezoid_outline(params.bottom_width, params.slope(), height, t),
    }
}

fn section_shape(params: &SectionParams) -> Shape {
    let t = params.lining_thickness;
    let r = params.radius();
    match params.section_type {
        SectionType::Trapezoidal | SectionType::Rectangular | SectionType::Triangular => {
            Shape::Straight(straight_outline(params, params.total_height(), t))
        }
        SectionType::OpenCircular => Shape::Arc {
            r,
            t,
            half_angle: 0.5 * PI,
            circumference: (r + t) * PI,
            minimum: OPEN_CIRCULAR_MIN_SEGMENTS,
        },
        SectionType::ClosedPipe => Shape::Ring {
            r,
            t,
            circumference: (r + t) * 2.0 * PI,
            minimum: CLOSED_PIPE_MIN_SEGMENTS,
        },
    }
}

fn fluid_shape(params: &SectionParams, fill: FillMode) -> Result<Shape> {
    let r = params.radius();
    let full = match params.section_type {
        SectionType::OpenCircular => r,
        SectionType::ClosedPipe => params.bottom_width,
        _ => params.total_height(),
    };
    let level = match fill {
        FillMode::Full => full,
        FillMode::WaterLevel(level) => {
            if !(level.is_finite() && level > 0.0) {
                return Err(Error::InvalidProfile(format!(
                    "water level must be positive, got {}",
                    level
                )));
            }
            level.min(full)
        }
    };

    Ok(match params.section_type {
        SectionType::Trapezoidal | SectionType::Rectangular | SectionType::Triangular => {
            Shape::Straight(straight_outline(params, level, 0.0))
        }
        SectionType::OpenCircular => Shape::Arc {
            r,
            t: 0.0,
            half_angle: if level < r {
                waterline_angle(r, level)
            } else {
                0.5 * PI
            },
            circumference: r * PI,
            minimum: OPEN_CIRCULAR_MIN_SEGMENTS,
        },
        SectionType::ClosedPipe if level < full => Shape::Arc {
            r,
            t: 0.0,
            half_angle: waterline_angle(r, level),
            circumference: r * 2.0 * PI,
            minimum: CLOSED_PIPE_MIN_SEGMENTS,
        },
        SectionType::ClosedPipe => Shape::Ring {
            r,
            t: 0.0,
            circumference: r * 2.0 * PI,
            minimum: CLOSED_PIPE_MIN_SEGMENTS,
        },
    })
}

/// Build the inner profile and, for lined sections, the outer lining profile
pub fn build_section_profiles(params: &SectionParams) -> Result<SectionProfiles> {
    let layout = section_layout(params)?;
    section_shape(params).build(&layout)
}

/// Segment counts [`build_section_profiles`] would use for `params`
pub fn section_layout(params: &SectionParams) -> Result<ProfileLayout> {
    params.validate()?;
    Ok(section_shape(params).layout(target_length(params)))
}

/// Section profiles with the segment counts of a shared layout
pub fn build_section_profiles_with(
    params: &SectionParams,
    layout: &ProfileLayout,
) -> Result<SectionProfiles> {
    params.validate()?;
    section_shape(params).build(layout)
}

/// Fluid cross-section (no lining) for the requested fill
pub fn build_fluid_profile(params: &SectionParams, fill: FillMode) -> Result<ChannelProfile> {
    let layout = fluid_layout(params, fill)?;
    build_fluid_profile_with(params, fill, &layout)
}

/// Segment counts [`build_fluid_profile`] would use
pub fn fluid_layout(params: &SectionParams, fill: FillMode) -> Result<ProfileLayout> {
    params.validate()?;
    Ok(fluid_shape(params, fill)?.layout(target_length(params)))
}

/// Fluid cross-section with the segment counts of a shared layout
pub fn build_fluid_profile_with(
    params: &SectionParams,
    fill: FillMode,
    layout: &ProfileLayout,
) -> Result<ChannelProfile> {
    params.validate()?;
    Ok(fluid_shape(params, fill)?.build(layout)?.inner)
}

/// Bottom-left, bottom-right, top-right, top-left
fn trapezoid_outline(b: f64, m: f64, h: f64, t: f64) -> Outline {
    let half = b * 0.5;
    let top = half + m * h;
    let inner = vec![
        Point2::new(-half, 0.0),
        Point2::new(half, 0.0),
        Point2::new(top, h),
        Point2::new(-top, h),
    ];

    // walls move out by t along their normal, the bed drops by t
    let outer = (t > 0.0).then(|| {
        let shift = t * (1.0 + m * m).sqrt();
        let bottom = half + shift - m * t;
        vec![
            Point2::new(-bottom, -t),
            Point2::new(bottom, -t),
            Point2::new(top + shift, h),
            Point2::new(-(top + shift), h),
        ]
    });

    Outline {
        inner,
        outer,
        roles: vec![EdgeRole::Bed, EdgeRole::Wall, EdgeRole::FreeSurface, EdgeRole::Wall],
    }
}

/// Apex, top-right, top-left
fn triangle_outline(m: f64, h: f64, t: f64) -> Outline {
    let inner = vec![
        Point2::new(0.0, 0.0),
        Point2::new(m * h, h),
        Point2::new(-m * h, h),
    ];

    let outer = (t > 0.0).then(|| {
        let shift = t * (1.0 + m * m).sqrt();
        vec![
            Point2::new(0.0, -shift / m),
            Point2::new(m * h + shift, h),
            Point2::new(-(m * h + shift), h),
        ]
    });

    Outline {
        inner,
        outer,
        roles: vec![EdgeRole::Wall, EdgeRole::FreeSurface, EdgeRole::Wall],
    }
}

/// Resample every edge with the given per-edge counts
fn subdivide_outline(outline: Outline, segments: &[usize]) -> SectionProfiles {
    let Outline { inner, outer, roles } = outline;
    let n = inner.len();
    let total: usize = segments.iter().sum();
    let mut inner_points = Vec::with_capacity(total);
    let mut outer_points = outer.as_ref().map(|_| Vec::with_capacity(total));
    let mut point_roles = Vec::with_capacity(total);

    for i in 0..n {
        let j = (i + 1) % n;
        let count = segments[i].max(1);
        for k in 0..count {
            let u = k as f64 / count as f64;
            inner_points.push(inner[i] + (inner[j] - inner[i]) * u);
            if let (Some(points), Some(o)) = (outer_points.as_mut(), outer.as_ref()) {
                points.push(o[i] + (o[j] - o[i]) * u);
            }
            point_roles.push(roles[i]);
        }
    }

    SectionProfiles {
        outer: outer_points.map(|points| ChannelProfile::new(points, point_roles.clone())),
        inner: ChannelProfile::new(inner_points, point_roles),
    }
}

/// Arc around the invert spanning `half_angle` to either side, from the left
/// rim to the right rim, closed by a free-surface chord of `chord` segments.
fn wetted_arc_profiles(r: f64, t: f64, arc: usize, chord: usize, half_angle: f64) -> SectionProfiles {
    let start = 1.5 * PI - half_angle;
    let sweep = 2.0 * half_angle;
    let chord = chord.max(1);
    let outline = |radius: f64| -> Vec<Point2<f64>> {
        let mut points: Vec<Point2<f64>> = (0..=arc)
            .map(|k| {
                let a = start + sweep * k as f64 / arc as f64;
                Point2::new(radius * a.cos(), r + radius * a.sin())
            })
            .collect();
        let (left, right) = (points[0], points[arc]);
        points.extend((1..chord).map(|k| right + (left - right) * (k as f64 / chord as f64)));
        points
    };

    let mut roles = vec![EdgeRole::Wall; arc];
    roles.extend(std::iter::repeat(EdgeRole::FreeSurface).take(chord));

    SectionProfiles {
        inner: ChannelProfile::new(outline(r), roles.clone()),
        outer: (t > 0.0).then(|| ChannelProfile::new(outline(r + t), roles)),
    }
}

/// Angle from the invert to the waterline at depth `level`
#[inline]
fn waterline_angle(r: f64, level: f64) -> f64 {
    ((r - level) / r).clamp(-1.0, 1.0).acos()
}

/// Full circle starting at the invert
fn ring_profiles(r: f64, t: f64, segments: usize) -> SectionProfiles {
    let ring = |radius: f64| -> Vec<Point2<f64>> {
        (0..segments)
            .map(|k| {
                let a = -0.5 * PI + 2.0 * PI * k as f64 / segments as f64;
                Point2::new(radius * a.cos(), r + radius * a.sin())
            })
            .collect()
    };
    let roles = vec![EdgeRole::Wall; segments];

    SectionProfiles {
        inner: ChannelProfile::new(ring(r), roles.clone()),
        outer: (t > 0.0).then(|| ChannelProfile::new(ring(r + t), roles)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(section_type: SectionType) -> SectionParams {
        SectionParams {
            section_type,
            subdivide: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_trapezoid_corners() {
        let p = SectionParams {
            lining_thickness: 0.0,
            ..params(SectionType::Trapezoidal)
        };
        let profiles = build_section_profiles(&p).unwrap();
        let inner = &profiles.inner;

        assert!(profiles.outer.is_none());
        assert_eq!(inner.len(), 4);
        // top width = b + 2 m H = 2 + 2 * 1.5 * 2.3
        assert_relative_eq!(inner.points[2].x - inner.points[3].x, 8.9, epsilon = 1e-12);
        assert_relative_eq!(inner.points[2].y, 2.3, epsilon = 1e-12);
        assert_eq!(
            inner.roles,
            vec![EdgeRole::Bed, EdgeRole::Wall, EdgeRole::FreeSurface, EdgeRole::Wall]
        );
        assert_relative_eq!(inner.area(), (2.0 + 1.5 * 2.3) * 2.3, epsilon = 1e-12);
    }

    #[test]
    fn test_lining_offset_is_slope_aware() {
        let p = params(SectionType::Trapezoidal);
        let profiles = build_section_profiles(&p).unwrap();
        let inner = &profiles.inner;
        let outer = profiles.outer.as_ref().unwrap();

        assert_eq!(inner.len(), outer.len());
        assert_relative_eq!(outer.points[0].y, -0.15, epsilon = 1e-12);

        // distance from the outer wall corner to the inner wall line equals t
        let (a, b) = (inner.points[1], inner.points[2]);
        let dir = (b - a).normalize();
        let rel = outer.points[1] - a;
        let distance = (rel.x * dir.y - rel.y * dir.x).abs();
        assert_relative_eq!(distance, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_rectangular_ignores_side_slope() {
        let p = SectionParams {
            bottom_width: 2.0,
            height: 1.5,
            freeboard: 0.0,
            lining_thickness: 0.0,
            ..params(SectionType::Rectangular)
        };
        let inner = build_section_profiles(&p).unwrap().inner;
        assert_relative_eq!(inner.points[2].x, 1.0);
        assert_relative_eq!(inner.points[3].x, -1.0);
    }

    #[test]
    fn test_triangular_apex_and_lining() {
        let p = SectionParams {
            side_slope: 1.0,
            height: 1.0,
            freeboard: 0.0,
            lining_thickness: 0.1,
            ..params(SectionType::Triangular)
        };
        let profiles = build_section_profiles(&p).unwrap();
        let outer = profiles.outer.unwrap();
        assert_eq!(profiles.inner.len(), 3);
        assert_relative_eq!(outer.points[0].y, -0.1 * 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_subdivision_respects_target() {
        let p = SectionParams {
            subdivide: true,
            profile_resolution: 0.4,
            ..Default::default()
        };
        let profiles = build_section_profiles(&p).unwrap();
        let inner = &profiles.inner;
        let outer = profiles.outer.as_ref().unwrap();

        assert_eq!(inner.len(), outer.len());
        for i in 0..inner.len() {
            assert!(inner.edge_length(i) <= 0.4 + 1e-9);
            assert!(outer.edge_length(i) <= 0.4 + 1e-9);
        }
        // outer top width 9.44 m gives 24 free-surface segments on both profiles
        assert_eq!(inner.roles.iter().filter(|r| **r == EdgeRole::FreeSurface).count(), 24);
        let (start, end) = inner.free_surface_chain().unwrap();
        assert_relative_eq!(inner.points[start].y, 2.3, epsilon = 1e-12);
        assert_relative_eq!(inner.points[end].y, 2.3, epsilon = 1e-12);
    }

    #[test]
    fn test_free_surface_is_subdivided() {
        for section_type in [
            SectionType::Trapezoidal,
            SectionType::Rectangular,
            SectionType::Triangular,
            SectionType::OpenCircular,
        ] {
            let p = SectionParams {
                section_type,
                lining_thickness: 0.0,
                ..Default::default()
            };
            let inner = build_section_profiles(&p).unwrap().inner;
            let longest = (0..inner.len()).map(|i| inner.edge_length(i)).fold(0.0, f64::max);
            assert!(longest <= 1.0 + 1e-9, "{:?} has an edge of {}", section_type, longest);
            assert!(inner.role_length(EdgeRole::FreeSurface) > 1.0);
        }

        let fluid = build_fluid_profile(&SectionParams::default(), FillMode::WaterLevel(1.0)).unwrap();
        for i in 0..fluid.len() {
            assert!(fluid.edge_length(i) <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_shared_layout_keeps_vertex_count() {
        let narrow = SectionParams::default();
        let wide = SectionParams {
            bottom_width: 6.0,
            height: 3.0,
            ..Default::default()
        };
        let mut layout = section_layout(&narrow).unwrap();
        layout.widen(&section_layout(&wide).unwrap()).unwrap();

        let a = build_section_profiles_with(&narrow, &layout).unwrap();
        let b = build_section_profiles_with(&wide, &layout).unwrap();
        assert_eq!(a.ring_size(), b.ring_size());
        assert_eq!(a.inner.roles, b.inner.roles);
        for i in 0..b.inner.len() {
            assert!(b.inner.edge_length(i) <= 1.0 + 1e-9);
            assert!(b.outer.as_ref().unwrap().edge_length(i) <= 1.0 + 1e-9);
        }

        let pipe = section_layout(&SectionParams {
            section_type: SectionType::ClosedPipe,
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(layout.widen(&pipe), Err(Error::InvalidProfile(_))));
        assert!(build_section_profiles_with(&narrow, &pipe).is_err());
    }

    #[test]
    fn test_open_circular_segments() {
        let p = SectionParams {
            bottom_width: 2.0,
            lining_thickness: 0.0,
            ..params(SectionType::OpenCircular)
        };
        let inner = build_section_profiles(&p).unwrap().inner;
        assert_eq!(inner.len(), OPEN_CIRCULAR_MIN_SEGMENTS + 1);
        assert_eq!(inner.free_surface_chain(), Some((16, 0)));
        assert_relative_eq!(inner.area(), PI * 0.5, max_relative = 0.01);
        let lowest = inner.points.iter().fold(f64::MAX, |m, p| m.min(p.y));
        assert_relative_eq!(lowest, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_closed_pipe_annulus() {
        let p = SectionParams {
            bottom_width: 1.0,
            lining_thickness: 0.1,
            ..params(SectionType::ClosedPipe)
        };
        let profiles = build_section_profiles(&p).unwrap();
        assert_eq!(profiles.inner.len(), CLOSED_PIPE_MIN_SEGMENTS);
        assert!(!profiles.inner.has_free_surface());
        assert_eq!(profiles.ring_size(), 2 * CLOSED_PIPE_MIN_SEGMENTS);
        assert_relative_eq!(profiles.half_width(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_fluid_profile_water_level() {
        let p = SectionParams {
            lining_thickness: 0.0,
            ..params(SectionType::Trapezoidal)
        };
        let fluid = build_fluid_profile(&p, FillMode::WaterLevel(1.0)).unwrap();
        assert_relative_eq!(fluid.area(), (2.0 + 1.5) * 1.0, epsilon = 1e-12);

        let full = build_fluid_profile(&p, FillMode::Full).unwrap();
        assert_relative_eq!(full.points[2].y, 2.3, epsilon = 1e-12);

        // partially filled pipe: half full gives half the disc
        let pipe = SectionParams {
            bottom_width: 2.0,
            ..params(SectionType::ClosedPipe)
        };
        let half = build_fluid_profile(&pipe, FillMode::WaterLevel(1.0)).unwrap();
        assert!(half.has_free_surface());
        assert_relative_eq!(half.area(), PI * 0.5, max_relative = 0.01);
    }

    #[test]
    fn test_invalid_dimensions() {
        let p = SectionParams {
            bottom_width: 0.0,
            ..Default::default()
        };
        assert!(matches!(build_section_profiles(&p), Err(Error::InvalidProfile(_))));

        let p = SectionParams {
            side_slope: 0.0,
            ..params(SectionType::Triangular)
        };
        assert!(build_section_profiles(&p).is_err());

        let p = SectionParams {
            height: -1.0,
            ..Default::default()
        };
        assert!(build_section_profiles(&p).is_err());
    }
}
