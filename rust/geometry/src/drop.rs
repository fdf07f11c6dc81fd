// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drop structures
//!
//! A drop lowers the channel by `drop_height` over a short run. The path is
//! cut at every drop, each piece is swept on its own at its lowered
//! elevation, and consecutive pieces are bridged by connector rings.
//! Connectors of unlined tubes carry top faces over the free surface like
//! the rest of the tube; lined connectors stay open there.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cleanup::weld_vertices;
use crate::error::{Error, Result};
use crate::mesh::SweepMesh;
use crate::path::{SampledPath, Station};
use crate::profile::SectionProfiles;
use crate::sweep::{
    finish_shell, knit_rings, push_ring, ring_points, station_distances, station_profiles,
    sweep_alignment, sweep_stations, sweep_structural, translate_stations, RingLayout,
    SectionSource, SweepOptions,
};
use crate::transition::ChannelAlignment;

/// Forward run of a vertical drop, keeps its wall from being exactly vertical
pub const VERTICAL_DROP_RUN: f64 = 0.05;
/// Tread depth per step when a stepped drop has no length
pub const DEFAULT_STEP_TREAD: f64 = 0.3;

/// Vertices closer than this are merged after the pieces are joined
const WELD_TOLERANCE: f64 = 1e-6;

/// Drop geometry family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    #[default]
    Vertical,
    Inclined,
    Stepped,
}

/// Elevation discontinuity at a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropStructure {
    /// Arc length where the drop starts
    pub station: f64,
    pub drop_height: f64,
    pub kind: DropKind,
    /// Horizontal length of an inclined or stepped drop
    pub length: f64,
    pub step_count: u32,
}

impl Default for DropStructure {
    fn default() -> Self {
        Self {
            station: 0.0,
            drop_height: 1.0,
            kind: DropKind::Vertical,
            length: 0.0,
            step_count: 1,
        }
    }
}

impl DropStructure {
    pub fn validate(&self) -> Result<()> {
        if !(self.drop_height.is_finite() && self.drop_height > 0.0) {
            return Err(Error::InvalidDrop(format!(
                "drop height must be positive, got {}",
                self.drop_height
            )));
        }
        if !self.station.is_finite() {
            return Err(Error::InvalidDrop("drop station is not finite".into()));
        }
        match self.kind {
            DropKind::Inclined if !(self.length.is_finite() && self.length > 0.0) => {
                Err(Error::InvalidDrop(format!(
                    "inclined drop requires a positive length, got {}",
                    self.length
                )))
            }
            DropKind::Stepped if self.step_count < 1 => {
                Err(Error::InvalidDrop("stepped drop requires at least 1 step".into()))
            }
            DropKind::Stepped if !(self.length.is_finite() && self.length >= 0.0) => {
                Err(Error::InvalidDrop(format!(
                    "stepped drop length must not be negative, got {}",
                    self.length
                )))
            }
            _ => Ok(()),
        }
    }

    /// Rise over run, infinite for vertical drops
    pub fn slope(&self) -> f64 {
        match self.kind {
            DropKind::Vertical => f64::INFINITY,
            _ => self.drop_height / self.run_length(),
        }
    }

    /// Height of one step
    pub fn step_height(&self) -> f64 {
        self.drop_height / self.step_count.max(1) as f64
    }

    /// Tread depth of one step
    pub fn step_length(&self) -> f64 {
        if self.length > 0.0 {
            self.length / self.step_count.max(1) as f64
        } else {
            DEFAULT_STEP_TREAD
        }
    }

    /// Arc length the drop occupies along the path
    pub fn run_length(&self) -> f64 {
        match self.kind {
            DropKind::Vertical => VERTICAL_DROP_RUN,
            DropKind::Inclined => self.length,
            DropKind::Stepped => self.step_length() * self.step_count.max(1) as f64,
        }
    }

    /// Arc length where the channel continues below the drop
    #[inline]
    pub fn end_station(&self) -> f64 {
        self.station + self.run_length()
    }

    /// Connector ring placement as (fraction of run, depth below the top)
    fn ramp(&self, resolution: f64) -> Vec<(f64, f64)> {
        let h = self.drop_height;
        match self.kind {
            DropKind::Vertical => vec![(0.0, 0.0), (1.0, h)],
            DropKind::Inclined => {
                let rings = ((self.length / resolution).ceil() as usize).max(3);
                (0..=rings)
                    .map(|i| {
                        let u = i as f64 / rings as f64;
                        (u, u * h)
                    })
                    .collect()
            }
            DropKind::Stepped => {
                let steps = self.step_count.max(1) as usize;
                let rise = self.step_height();
                // each riser leans forward like a vertical drop, within a quarter tread
                let riser = VERTICAL_DROP_RUN.min(0.25 * self.step_length()) / self.run_length();
                let mut ramp = Vec::with_capacity(2 * steps + 1);
                for s in 0..steps {
                    let u = s as f64 / steps as f64;
                    ramp.push((u, s as f64 * rise));
                    ramp.push((u + riser, (s + 1) as f64 * rise));
                }
                ramp.push((1.0, h));
                ramp
            }
        }
    }
}

/// Check drops against the path and return them sorted by station
pub fn validate_drops(drops: &[DropStructure], path_length: f64) -> Result<Vec<DropStructure>> {
    let mut sorted = drops.to_vec();
    for drop in &sorted {
        drop.validate()?;
    }
    sorted.sort_by(|a, b| a.station.total_cmp(&b.station));

    for drop in &sorted {
        if drop.station <= 0.0 || drop.end_station() >= path_length {
            return Err(Error::InvalidDrop(format!(
                "drop at {:.3} m (run {:.3} m) must lie strictly inside the path of {:.3} m",
                drop.station,
                drop.run_length(),
                path_length
            )));
        }
    }
    for pair in sorted.windows(2) {
        if pair[1].station <= pair[0].end_station() {
            return Err(Error::InvalidDrop(format!(
                "drops at {:.3} m and {:.3} m overlap",
                pair[0].station, pair[1].station
            )));
        }
    }
    Ok(sorted)
}

/// Sweep the structure along a path with elevation drops.
///
/// Without drops this is the plain structural sweep.
pub fn sweep_with_drops(
    path: &SampledPath,
    profiles: &SectionProfiles,
    drops: &[DropStructure],
    options: &SweepOptions,
) -> Result<SweepMesh> {
    if drops.is_empty() {
        return sweep_structural(path, profiles, options);
    }
    let drops = checked_drops(path, drops)?;
    sweep_pieces(path, &SectionSource::Fixed(profiles), profiles.outer.is_some(), &drops, options)
}

/// Sweep along an alignment with transition zones and elevation drops
pub fn sweep_alignment_with_drops(
    path: &SampledPath,
    alignment: &ChannelAlignment,
    drops: &[DropStructure],
    options: &SweepOptions,
) -> Result<SweepMesh> {
    if drops.is_empty() {
        return sweep_alignment(path, alignment, options);
    }
    let drops = checked_drops(path, drops)?;

    // the layout must also cover every connector ring
    let mut distances = station_distances(&path.stations);
    for drop in &drops {
        let run = drop.run_length();
        distances.extend(
            drop.ramp(path.resolution)
                .iter()
                .map(|&(u, _)| drop.station + u * run),
        );
    }
    let source = SectionSource::aligned(alignment, &distances)?;
    sweep_pieces(path, &source, alignment.base.has_lining(), &drops, options)
}

fn checked_drops(path: &SampledPath, drops: &[DropStructure]) -> Result<Vec<DropStructure>> {
    if path.cyclic {
        return Err(Error::InvalidDrop("drops are not supported on closed paths".into()));
    }
    validate_drops(drops, path.total_length)
}

/// Sweep every piece between validated, sorted drops and bridge them
fn sweep_pieces(
    path: &SampledPath,
    source: &SectionSource<'_>,
    lined: bool,
    drops: &[DropStructure],
    options: &SweepOptions,
) -> Result<SweepMesh> {
    let min_gap = path.resolution * 0.25;

    // sub-ranges between drops, each with the cumulative drop above it
    let mut pieces: Vec<Vec<Station>> = Vec::with_capacity(drops.len() + 1);
    let mut from = 0.0;
    let mut depth = 0.0;
    for drop in drops {
        pieces.push(lowered(path.stations_between(from, drop.station, min_gap), depth));
        from = drop.end_station();
        depth += drop.drop_height;
    }
    pieces.push(lowered(path.stations_between(from, path.total_length, min_gap), depth));

    let last_piece = pieces.len() - 1;
    let mut joined = SweepMesh::new();

    for (k, stations) in pieces.iter().enumerate() {
        let piece_options = SweepOptions {
            cap_inlet: options.cap_inlet && k == 0,
            cap_outlet: options.cap_outlet && k == last_piece,
            curvature_guard: options.curvature_guard,
        };
        let sections = source.sections(stations)?;
        joined.merge(&sweep_stations(stations, false, &sections, &piece_options)?);

        if let Some(drop) = drops.get(k) {
            let (Some(upper), Some(lower)) = (stations.last(), pieces[k + 1].first()) else {
                continue;
            };
            let connector = build_connector(drop, upper, lower, source, path.resolution, options)?;
            debug!(
                station = drop.station,
                height = drop.drop_height,
                kind = ?drop.kind,
                faces = connector.face_count(),
                "inserted drop"
            );
            joined.merge(&connector);
        }
    }

    let (welded_mesh, welded) = weld_vertices(&joined, WELD_TOLERANCE);
    let (mesh, flipped) = finish_shell(welded_mesh, lined);

    debug!(
        drops = drops.len(),
        pieces = pieces.len(),
        welded,
        flipped,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "built structure with drops"
    );
    Ok(mesh)
}

fn lowered(stations: Vec<Station>, depth: f64) -> Vec<Station> {
    if depth == 0.0 {
        return stations;
    }
    translate_stations(&stations, &Vector3::new(0.0, 0.0, -depth))
}

/// Rings bridging the end of one piece to the start of the next
fn build_connector(
    drop: &DropStructure,
    upper: &Station,
    lower: &Station,
    source: &SectionSource<'_>,
    resolution: f64,
    options: &SweepOptions,
) -> Result<SweepMesh> {
    let h = drop.drop_height;
    // lower station lifted back to the upper elevation
    let lower_plan = lower.translated(&Vector3::new(0.0, 0.0, h));
    let ramp = drop.ramp(resolution);
    let last = ramp.len() - 1;

    let stations: Vec<Station> = ramp
        .iter()
        .enumerate()
        .map(|(i, &(u, depth))| {
            if i == 0 {
                *upper
            } else if i == last {
                *lower
            } else {
                upper
                    .lerp(&lower_plan, u)
                    .translated(&Vector3::new(0.0, 0.0, -depth))
            }
        })
        .collect();
    let sections = source.sections(&stations)?;
    let layout = RingLayout::new(sections.at(0));

    let mut mesh = SweepMesh::new();
    let mut previous: Option<u32> = None;
    for (i, station) in stations.iter().enumerate() {
        let section = station_profiles(sections.at(i), station, options.curvature_guard);
        let base = push_ring(&mut mesh, &ring_points(station, &section));
        if let Some(a) = previous {
            knit_rings(&mut mesh, &layout, a, base);
        }
        previous = Some(base);
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{validate_mesh, ValidationOptions};
    use crate::mesh::PatchName;
    use crate::path::{sample_path, PathPolyline, SamplingParams};
    use crate::profile::{build_section_profiles, SectionParams, SectionType};
    use approx::assert_relative_eq;

    fn path(length: f64) -> SampledPath {
        let polyline = PathPolyline::open(&[[0.0, 0.0, 0.0], [length, 0.0, 0.0]]);
        sample_path(&polyline, &SamplingParams::default()).unwrap()
    }

    fn unlined() -> SectionProfiles {
        build_section_profiles(&SectionParams {
            section_type: SectionType::Rectangular,
            lining_thickness: 0.0,
            subdivide: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_run_lengths() {
        let vertical = DropStructure::default();
        assert_relative_eq!(vertical.run_length(), VERTICAL_DROP_RUN);
        assert!(vertical.slope().is_infinite());

        let stepped = DropStructure {
            kind: DropKind::Stepped,
            step_count: 4,
            drop_height: 2.0,
            ..Default::default()
        };
        assert_relative_eq!(stepped.run_length(), 4.0 * DEFAULT_STEP_TREAD);
        assert_relative_eq!(stepped.step_height(), 0.5);

        let inclined = DropStructure {
            kind: DropKind::Inclined,
            length: 4.0,
            drop_height: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(inclined.slope(), 0.25);
    }

    #[test]
    fn test_invalid_drops() {
        let bad_height = DropStructure {
            station: 5.0,
            drop_height: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_height.validate(), Err(Error::InvalidDrop(_))));

        let bad_incline = DropStructure {
            station: 5.0,
            kind: DropKind::Inclined,
            ..Default::default()
        };
        assert!(bad_incline.validate().is_err());

        let outside = DropStructure {
            station: 9.99,
            ..Default::default()
        };
        assert!(validate_drops(&[outside], 10.0).is_err());

        let a = DropStructure {
            station: 4.0,
            kind: DropKind::Inclined,
            length: 2.0,
            ..Default::default()
        };
        let b = DropStructure {
            station: 5.0,
            ..Default::default()
        };
        assert!(validate_drops(&[b, a], 10.0).is_err());
    }

    #[test]
    fn test_vertical_drop_lowers_downstream() {
        let drop = DropStructure {
            station: 5.0,
            drop_height: 1.0,
            ..Default::default()
        };
        let mesh = sweep_with_drops(&path(10.0), &unlined(), &[drop], &SweepOptions::default()).unwrap();

        let (min, max) = mesh.bounds();
        assert_relative_eq!(min.z, -1.0, epsilon = 1e-9);
        assert!(max.z > 2.0);
        let outlet = mesh.patch(PatchName::Outlet);
        assert!(!outlet.is_empty());
        for &f in outlet {
            for p in mesh.face_points(f) {
                assert!(p.z < 1.5);
                assert_relative_eq!(p.x, 10.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_lined_drops_stay_watertight() {
        let profiles = build_section_profiles(&SectionParams {
            subdivide: false,
            ..Default::default()
        })
        .unwrap();
        let drops = [
            DropStructure {
                station: 3.0,
                drop_height: 0.5,
                kind: DropKind::Inclined,
                length: 2.0,
                ..Default::default()
            },
            DropStructure {
                station: 8.0,
                drop_height: 0.6,
                kind: DropKind::Stepped,
                step_count: 3,
                ..Default::default()
            },
        ];
        let mesh = sweep_with_drops(&path(15.0), &profiles, &drops, &SweepOptions::default()).unwrap();
        let report = validate_mesh(
            &mesh,
            &ValidationOptions {
                check_self_intersections: false,
            },
        );
        assert!(report.is_watertight, "{:?}", report.errors);
        assert!(report.has_consistent_normals);
        assert_relative_eq!(mesh.bounds().0.z, -1.1 - 0.15, epsilon = 1e-9);
    }

    #[test]
    fn test_unlined_drops_close_the_tube() {
        let drops = [
            DropStructure {
                station: 3.0,
                drop_height: 0.8,
                ..Default::default()
            },
            DropStructure {
                station: 6.0,
                drop_height: 0.6,
                kind: DropKind::Stepped,
                step_count: 3,
                ..Default::default()
            },
            DropStructure {
                station: 10.0,
                drop_height: 0.5,
                kind: DropKind::Inclined,
                length: 2.0,
                ..Default::default()
            },
        ];
        let mesh = sweep_with_drops(&path(15.0), &unlined(), &drops, &SweepOptions::default()).unwrap();
        let report = validate_mesh(&mesh, &ValidationOptions::default());

        assert_eq!(report.boundary_edges, 0);
        assert!(report.is_watertight, "{:?}", report.errors);
        assert_eq!(report.degenerate_faces, 0);
        assert_eq!(report.self_intersections, 0);
        assert!(report.is_valid, "{:?}", report.warnings);
        assert!(!mesh.patch(PatchName::Top).is_empty());
    }

    #[test]
    fn test_stepped_risers_lean_forward() {
        let drop = DropStructure {
            station: 5.0,
            drop_height: 0.6,
            kind: DropKind::Stepped,
            step_count: 3,
            ..Default::default()
        };
        let ramp = drop.ramp(1.0);
        assert_eq!(ramp.len(), 7);
        for w in ramp.windows(2) {
            assert!(w[1].0 > w[0].0, "ring fractions {:?}", ramp);
        }
        assert_relative_eq!(ramp[1].0, VERTICAL_DROP_RUN / drop.run_length(), epsilon = 1e-12);

        let lined = build_section_profiles(&SectionParams {
            subdivide: false,
            ..Default::default()
        })
        .unwrap();
        for profiles in [lined, unlined()] {
            let mesh = sweep_with_drops(&path(12.0), &profiles, &[drop], &SweepOptions::default()).unwrap();
            let report = validate_mesh(&mesh, &ValidationOptions::default());
            assert!(report.is_watertight, "{:?}", report.errors);
            assert_eq!(report.degenerate_faces, 0);
            assert_eq!(report.self_intersections, 0);
        }
    }

    #[test]
    fn test_drops_rejected_on_closed_paths() {
        let polyline = PathPolyline::closed(&[
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [10.0, 10.0, 0.0],
        ]);
        let sampled = sample_path(&polyline, &SamplingParams::default()).unwrap();
        let drop = DropStructure {
            station: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            sweep_with_drops(&sampled, &unlined(), &[drop], &SweepOptions::default()),
            Err(Error::InvalidDrop(_))
        ));
    }
}
