// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Curvature guard
//!
//! On tight bends the inside half of a swept profile folds over itself.
//! The guard squeezes that half towards the centerline. This is a
//! heuristic: it reduces overlaps, it does not compute exact offsets.
//!
//! Radii come from station neighbors. On a sharp polyline corner only the
//! corner station sees a finite radius, so the rings on either side are
//! left untouched and can still overlap it. Sample such paths adaptively
//! or round the corner into an arc to keep the shell free of overlaps.

use std::borrow::Cow;

use nalgebra::Point2;

use crate::path::Station;
use crate::profile::{ChannelProfile, SectionProfiles};

/// Safety radius as a multiple of the profile half width
pub const SAFETY_FACTOR: f64 = 1.2;
/// Lower bound on the lateral scale of inside vertices
pub const MIN_COMPRESSION: f64 = 0.1;

const TURN_EPSILON: f64 = 1e-6;

/// Lateral scale for inside-of-turn vertices, `None` when no guard is needed
pub fn compression_factor(curve_radius: f64, turn_sign: f64, half_width: f64) -> Option<f64> {
    if !curve_radius.is_finite() || turn_sign.abs() < TURN_EPSILON || half_width <= 0.0 {
        return None;
    }
    let safety_radius = SAFETY_FACTOR * half_width;
    if curve_radius >= safety_radius {
        return None;
    }
    Some((curve_radius / safety_radius).clamp(MIN_COMPRESSION, 1.0))
}

/// Scale the lateral coordinate of inside-of-turn points.
///
/// A positive `turn_sign` bends towards `+x`, so points with `x > 0` are
/// inside the turn.
pub fn compress_points(points: &[Point2<f64>], turn_sign: f64, compression: f64) -> Vec<Point2<f64>> {
    let side = turn_sign.signum();
    points
        .iter()
        .map(|p| {
            if p.x * side > 0.0 {
                Point2::new(p.x * compression, p.y)
            } else {
                *p
            }
        })
        .collect()
}

/// Guarded copy of a single profile
pub fn guard_profile<'a>(
    profile: &'a ChannelProfile,
    curve_radius: f64,
    turn_sign: f64,
    half_width: f64,
) -> Cow<'a, ChannelProfile> {
    match compression_factor(curve_radius, turn_sign, half_width) {
        Some(c) => Cow::Owned(profile.with_points(compress_points(&profile.points, turn_sign, c))),
        None => Cow::Borrowed(profile),
    }
}

/// Guarded inner/outer pair for a station; both shells get the same factor
pub fn guard_section<'a>(profiles: &'a SectionProfiles, station: &Station) -> Cow<'a, SectionProfiles> {
    let Some(c) =
        compression_factor(station.curve_radius, station.turn_sign, profiles.half_width())
    else {
        return Cow::Borrowed(profiles);
    };

    let squeeze = |p: &ChannelProfile| p.with_points(compress_points(&p.points, station.turn_sign, c));
    Cow::Owned(SectionProfiles {
        inner: squeeze(&profiles.inner),
        outer: profiles.outer.as_ref().map(squeeze),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{build_section_profiles, SectionParams};
    use approx::assert_relative_eq;

    fn profiles() -> SectionProfiles {
        build_section_profiles(&SectionParams {
            subdivide: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_noop_on_straight_or_wide_bends() {
        assert_eq!(compression_factor(f64::INFINITY, 1.0, 5.0), None);
        assert_eq!(compression_factor(3.0, 0.0, 5.0), None);
        assert_eq!(compression_factor(6.0, 1.0, 5.0), None);
        assert_eq!(compression_factor(100.0, -1.0, 5.0), None);
    }

    #[test]
    fn test_compression_is_clamped() {
        assert_relative_eq!(compression_factor(3.0, 1.0, 5.0).unwrap(), 0.5);
        assert_relative_eq!(compression_factor(0.01, -1.0, 5.0).unwrap(), MIN_COMPRESSION);
    }

    #[test]
    fn test_only_inside_vertices_move() {
        let p = profiles();
        let hw = p.half_width();
        let guarded = guard_profile(&p.inner, hw * 0.6, -1.0, hw);
        let guarded = guarded.as_ref();

        for (before, after) in p.inner.points.iter().zip(&guarded.points) {
            assert_eq!(before.y, after.y);
            if before.x < 0.0 {
                assert_relative_eq!(after.x, before.x * 0.5, epsilon = 1e-12);
            } else {
                assert_eq!(before.x, after.x);
            }
        }
    }

    #[test]
    fn test_section_guard_matches_shells() {
        let p = profiles();
        let station = Station {
            position: nalgebra::Point3::origin(),
            tangent: nalgebra::Vector3::x(),
            normal: nalgebra::Vector3::z(),
            station_distance: 0.0,
            curve_radius: 1.0,
            turn_sign: 1.0,
        };
        let guarded = guard_section(&p, &station);
        assert!(matches!(guarded, Cow::Owned(_)));
        let outer = guarded.outer.as_ref().unwrap();
        let c = 1.0 / (SAFETY_FACTOR * p.half_width());
        assert_relative_eq!(outer.points[2].x, p.outer.as_ref().unwrap().points[2].x * c, epsilon = 1e-12);
        assert_eq!(guarded.inner.points[0], p.inner.points[0]);
    }
}
