// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hydraulic section properties and path slope summaries

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::path::PathPolyline;
use crate::profile::{SectionParams, SectionType};

/// Roughness of a concrete-lined channel
pub const DEFAULT_MANNING_N: f64 = 0.015;
/// Bed slope used when none is known (m/m)
pub const DEFAULT_BED_SLOPE: f64 = 0.001;

/// Segments shorter than this in plan are left out of segment slopes
const MIN_HORIZONTAL: f64 = 0.001;

/// Flow properties of a section at one water depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydraulicInfo {
    pub water_depth: f64,
    /// Width at the water surface, 0 for a full pipe
    pub top_width: f64,
    pub total_height: f64,
    pub area: f64,
    pub wetted_perimeter: f64,
    pub hydraulic_radius: f64,
    pub manning_n: f64,
    pub slope: f64,
    pub velocity: f64,
    pub discharge: f64,
}

impl HydraulicInfo {
    /// Manning velocity and discharge from the current geometry
    fn apply_manning(&mut self) {
        if self.hydraulic_radius > 0.0 && self.slope > 0.0 && self.manning_n > 0.0 {
            self.velocity =
                self.hydraulic_radius.powf(2.0 / 3.0) * self.slope.sqrt() / self.manning_n;
            self.discharge = self.velocity * self.area;
        }
    }
}

/// Area, wetted perimeter and top width of a circle of radius `r` filled to `depth`
fn circular_segment(r: f64, depth: f64) -> (f64, f64, f64) {
    if depth >= 2.0 * r {
        return (PI * r * r, 2.0 * PI * r, 0.0);
    }
    let theta = 2.0 * ((r - depth) / r).clamp(-1.0, 1.0).acos();
    let area = r * r * (theta - theta.sin()) / 2.0;
    let top = 2.0 * (depth * (2.0 * r - depth)).max(0.0).sqrt();
    (area, r * theta, top)
}

/// Properties of `params` at `water_depth` (the design height when `None`)
pub fn hydraulic_info(
    params: &SectionParams,
    water_depth: Option<f64>,
    slope: f64,
    manning_n: f64,
) -> HydraulicInfo {
    let depth = water_depth.unwrap_or(params.height).max(0.0);
    let b = params.bottom_width;
    let m = params.side_slope;

    let (depth, area, wetted_perimeter, top_width) = match params.section_type {
        SectionType::Trapezoidal => (
            depth,
            (b + m * depth) * depth,
            b + 2.0 * depth * (1.0 + m * m).sqrt(),
            b + 2.0 * m * depth,
        ),
        SectionType::Rectangular => (depth, b * depth, b + 2.0 * depth, b),
        SectionType::Triangular => (
            depth,
            m * depth * depth,
            2.0 * depth * (1.0 + m * m).sqrt(),
            2.0 * m * depth,
        ),
        SectionType::OpenCircular => {
            // the open section is a half circle
            let depth = depth.min(params.radius());
            let (a, p, t) = circular_segment(params.radius(), depth);
            (depth, a, p, t)
        }
        SectionType::ClosedPipe => {
            let depth = depth.min(b);
            let (a, p, t) = circular_segment(params.radius(), depth);
            (depth, a, p, t)
        }
    };

    let hydraulic_radius = if wetted_perimeter > 0.0 {
        area / wetted_perimeter
    } else {
        0.0
    };

    let mut info = HydraulicInfo {
        water_depth: depth,
        top_width,
        total_height: params.total_height(),
        area,
        wetted_perimeter,
        hydraulic_radius,
        manning_n,
        slope,
        velocity: 0.0,
        discharge: 0.0,
    };
    info.apply_manning();
    info
}

/// Elevation and gradient summary of a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlopeInfo {
    pub start_elevation: f64,
    pub end_elevation: f64,
    /// Absolute elevation difference between the ends
    pub elevation_drop: f64,
    /// Plan distance between the ends
    pub horizontal_length: f64,
    /// Length along the polyline in 3D
    pub curve_length: f64,
    pub average_slope: f64,
    pub average_slope_percent: f64,
    pub min_slope: f64,
    pub max_slope: f64,
}

/// Slope summary of `path`, `None` when it has no points
pub fn slope_info(path: &PathPolyline) -> Option<SlopeInfo> {
    let first = *path.points.first()?;
    let last = *path.points.last()?;

    let mut curve_length = 0.0;
    let mut min_slope = f64::INFINITY;
    let mut max_slope = f64::NEG_INFINITY;
    for pair in path.points.windows(2) {
        let d = pair[1] - pair[0];
        curve_length += d.norm();
        let horizontal = d.x.hypot(d.y);
        if horizontal > MIN_HORIZONTAL {
            let s = d.z.abs() / horizontal;
            min_slope = min_slope.min(s);
            max_slope = max_slope.max(s);
        }
    }
    if !min_slope.is_finite() {
        min_slope = 0.0;
        max_slope = 0.0;
    }

    let elevation_drop = (first.z - last.z).abs();
    let horizontal_length = (last.x - first.x).hypot(last.y - first.y);
    let average_slope = if horizontal_length > MIN_HORIZONTAL {
        elevation_drop / horizontal_length
    } else {
        0.0
    };

    Some(SlopeInfo {
        start_elevation: first.z,
        end_elevation: last.z,
        elevation_drop,
        horizontal_length,
        curve_length,
        average_slope,
        average_slope_percent: average_slope * 100.0,
        min_slope,
        max_slope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trapezoid_at_design_depth() {
        let params = SectionParams::default();
        let info = hydraulic_info(&params, None, DEFAULT_BED_SLOPE, DEFAULT_MANNING_N);

        assert_relative_eq!(info.area, (2.0 + 1.5 * 2.0) * 2.0);
        assert_relative_eq!(info.top_width, 8.0);
        assert_relative_eq!(info.wetted_perimeter, 2.0 + 4.0 * 3.25_f64.sqrt());
        assert_relative_eq!(info.total_height, 2.3);
        assert_relative_eq!(info.discharge, info.velocity * info.area);

        let expected_v = info.hydraulic_radius.powf(2.0 / 3.0) * 0.001_f64.sqrt() / 0.015;
        assert_relative_eq!(info.velocity, expected_v, max_relative = 1e-12);
    }

    #[test]
    fn test_rectangle() {
        let params = SectionParams {
            section_type: SectionType::Rectangular,
            bottom_width: 3.0,
            ..Default::default()
        };
        let info = hydraulic_info(&params, Some(1.0), DEFAULT_BED_SLOPE, DEFAULT_MANNING_N);
        assert_relative_eq!(info.area, 3.0);
        assert_relative_eq!(info.wetted_perimeter, 5.0);
        assert_relative_eq!(info.hydraulic_radius, 0.6);
    }

    #[test]
    fn test_pipe_half_and_full() {
        let params = SectionParams {
            section_type: SectionType::ClosedPipe,
            bottom_width: 2.0,
            ..Default::default()
        };
        let half = hydraulic_info(&params, Some(1.0), DEFAULT_BED_SLOPE, DEFAULT_MANNING_N);
        assert_relative_eq!(half.area, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(half.wetted_perimeter, PI, epsilon = 1e-12);
        assert_relative_eq!(half.top_width, 2.0, epsilon = 1e-12);

        let full = hydraulic_info(&params, Some(5.0), DEFAULT_BED_SLOPE, DEFAULT_MANNING_N);
        assert_relative_eq!(full.water_depth, 2.0);
        assert_relative_eq!(full.area, PI);
        assert_relative_eq!(full.hydraulic_radius, 0.5);
        assert_eq!(full.top_width, 0.0);
    }

    #[test]
    fn test_open_circular_clamps_to_radius() {
        let params = SectionParams {
            section_type: SectionType::OpenCircular,
            bottom_width: 2.0,
            ..Default::default()
        };
        let info = hydraulic_info(&params, Some(3.0), DEFAULT_BED_SLOPE, DEFAULT_MANNING_N);
        assert_relative_eq!(info.water_depth, 1.0);
        assert_relative_eq!(info.area, PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_depth_has_no_flow() {
        let info = hydraulic_info(&SectionParams::default(), Some(0.0), 0.001, 0.015);
        assert_eq!(info.area, 0.0);
        assert_eq!(info.velocity, 0.0);
        assert_eq!(info.discharge, 0.0);
    }

    #[test]
    fn test_slope_info() {
        let path = PathPolyline::open(&[[0.0, 0.0, 10.0], [100.0, 0.0, 9.0], [100.0, 50.0, 8.0]]);
        let info = slope_info(&path).unwrap();

        assert_relative_eq!(info.start_elevation, 10.0);
        assert_relative_eq!(info.end_elevation, 8.0);
        assert_relative_eq!(info.elevation_drop, 2.0);
        assert_relative_eq!(info.horizontal_length, 12500.0_f64.sqrt());
        assert_relative_eq!(info.average_slope, 2.0 / 12500.0_f64.sqrt());
        assert_relative_eq!(info.min_slope, 0.01);
        assert_relative_eq!(info.max_slope, 0.02);
        assert_relative_eq!(
            info.curve_length,
            10001.0_f64.sqrt() + 2501.0_f64.sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_slope_info_empty() {
        assert!(slope_info(&PathPolyline::new(Vec::new(), false)).is_none());
    }
}
