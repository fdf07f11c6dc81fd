// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sweep builder
//!
//! Places a profile ring at every station and knits consecutive rings into
//! quad strips. Unlined sections sweep into a closed tube; lined sections
//! sweep into a shell between the inner and outer profiles that stays open
//! over the free surface.

use std::borrow::Cow;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cleanup::remove_loose_vertices;
use crate::error::{Error, Result};
use crate::guard::{compression_factor, guard_section};
use crate::mesh::{PatchName, SweepMesh};
use crate::path::{SampledPath, Station};
use crate::profile::{
    build_fluid_profile, EdgeRole, FillMode, ProfileLayout, SectionParams, SectionProfiles,
};
use crate::transition::ChannelAlignment;
use crate::triangulation::triangulate_cap;

/// Profiles with less area than this are treated as collapsed
const MIN_PROFILE_AREA: f64 = 1e-12;

/// Options for the structural sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    pub cap_inlet: bool,
    pub cap_outlet: bool,
    /// Compress the inside of tight bends
    pub curvature_guard: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            cap_inlet: true,
            cap_outlet: true,
            curvature_guard: true,
        }
    }
}

/// Options for the fluid-domain sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidDomainOptions {
    pub cap_inlet: bool,
    pub cap_outlet: bool,
    pub fill: FillMode,
    /// Straight prolongation before the first station, in metres
    pub inlet_extension: f64,
    /// Straight prolongation after the last station, in metres
    pub outlet_extension: f64,
    pub curvature_guard: bool,
}

impl Default for FluidDomainOptions {
    fn default() -> Self {
        Self {
            cap_inlet: true,
            cap_outlet: true,
            fill: FillMode::Full,
            inlet_extension: 0.0,
            outlet_extension: 0.0,
            curvature_guard: true,
        }
    }
}

/// Which end of the sweep a cap closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapEnd {
    Inlet,
    Outlet,
}

impl CapEnd {
    fn patch(self) -> PatchName {
        match self {
            Self::Inlet => PatchName::Inlet,
            Self::Outlet => PatchName::Outlet,
        }
    }
}

/// Ring profiles for the stations of one sweep
pub(crate) enum StationSections<'a> {
    /// Same profiles at every station
    Uniform(&'a SectionProfiles),
    /// One profile pair per station, all built from one layout
    Varying(Vec<SectionProfiles>),
}

impl StationSections<'_> {
    #[inline]
    pub(crate) fn at(&self, i: usize) -> &SectionProfiles {
        match self {
            Self::Uniform(profiles) => *profiles,
            Self::Varying(list) => &list[i],
        }
    }

    fn min_area(&self) -> f64 {
        match self {
            Self::Uniform(profiles) => profiles.inner.area(),
            Self::Varying(list) => list
                .iter()
                .map(|p| p.inner.area())
                .fold(f64::INFINITY, f64::min),
        }
    }
}

/// Where a sweep takes its ring profiles from
pub(crate) enum SectionSource<'a> {
    Fixed(&'a SectionProfiles),
    Aligned {
        alignment: &'a ChannelAlignment,
        layout: ProfileLayout,
    },
}

impl<'a> SectionSource<'a> {
    /// Source for an alignment whose layout covers the given arc lengths
    pub(crate) fn aligned(alignment: &'a ChannelAlignment, stations: &[f64]) -> Result<Self> {
        Ok(Self::Aligned {
            layout: alignment.layout(stations)?,
            alignment,
        })
    }

    /// Profiles for one run of stations
    pub(crate) fn sections(&self, stations: &[Station]) -> Result<StationSections<'a>> {
        match self {
            Self::Fixed(profiles) => Ok(StationSections::Uniform(*profiles)),
            Self::Aligned { alignment, layout } => Ok(StationSections::Varying(
                alignment.profiles_with(&station_distances(stations), layout)?,
            )),
        }
    }
}

/// Arc length of every station
pub(crate) fn station_distances(stations: &[Station]) -> Vec<f64> {
    stations.iter().map(|s| s.station_distance).collect()
}

/// Index layout of one station ring
pub(crate) struct RingLayout<'a> {
    roles: &'a [EdgeRole],
    inner: usize,
    lined: bool,
    /// Free-surface chain ends where the lining crest runs
    crest: Option<(usize, usize)>,
}

impl<'a> RingLayout<'a> {
    pub(crate) fn new(profiles: &'a SectionProfiles) -> Self {
        let lined = profiles.outer.is_some();
        Self {
            roles: &profiles.inner.roles,
            inner: profiles.inner.len(),
            lined,
            crest: if lined {
                profiles.inner.free_surface_chain()
            } else {
                None
            },
        }
    }

    /// Vertices per ring
    #[inline]
    pub(crate) fn stride(&self) -> usize {
        if self.lined {
            2 * self.inner
        } else {
            self.inner
        }
    }
}

/// Append a ring, returning the index of its first vertex
pub(crate) fn push_ring(mesh: &mut SweepMesh, ring: &[Point3<f64>]) -> u32 {
    let base = mesh.vertex_count() as u32;
    mesh.vertices.extend_from_slice(ring);
    base
}

/// World positions of a station's ring: inner points, then outer points
pub(crate) fn ring_points(station: &Station, profiles: &SectionProfiles) -> Vec<Point3<f64>> {
    let mut ring = Vec::with_capacity(profiles.ring_size());
    ring.extend(profiles.inner.points.iter().map(|p| station.to_world(p)));
    if let Some(outer) = &profiles.outer {
        ring.extend(outer.points.iter().map(|p| station.to_world(p)));
    }
    ring
}

/// Profiles for a station, guarded when requested
pub(crate) fn station_profiles<'a>(
    profiles: &'a SectionProfiles,
    station: &Station,
    guard: bool,
) -> Cow<'a, SectionProfiles> {
    if guard {
        guard_section(profiles, station)
    } else {
        Cow::Borrowed(profiles)
    }
}

/// Instantiate every ring in station order
pub(crate) fn instantiate_rings(
    stations: &[Station],
    sections: &StationSections<'_>,
    guard: bool,
) -> Vec<Vec<Point3<f64>>> {
    if guard {
        let guarded = stations
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                compression_factor(s.curve_radius, s.turn_sign, sections.at(*i).half_width())
                    .is_some()
            })
            .count();
        if guarded > 0 {
            warn!(
                stations = guarded,
                half_width = sections.at(0).half_width(),
                "curve radius below safety radius, compressing inside of turn"
            );
        }
    }

    stations
        .par_iter()
        .enumerate()
        .map(|(i, s)| ring_points(s, &station_profiles(sections.at(i), s, guard)))
        .collect()
}

/// Quads between two consecutive rings
pub(crate) fn knit_rings(mesh: &mut SweepMesh, layout: &RingLayout<'_>, a: u32, b: u32) {
    let n = layout.inner;
    let o = n as u32;

    for j in 0..n {
        let role = layout.roles[j];
        let (j0, j1) = (j as u32, ((j + 1) % n) as u32);

        if !layout.lined {
            mesh.add_quad(a + j0, b + j0, b + j1, a + j1, Some(role.patch()));
            continue;
        }

        if role == EdgeRole::FreeSurface {
            continue;
        }
        // inner shell faces into the channel, outer shell faces away
        mesh.add_quad(a + j0, a + j1, b + j1, b + j0, Some(role.patch()));
        mesh.add_quad(a + o + j0, b + o + j0, b + o + j1, a + o + j1, Some(role.patch()));
    }

    if let Some((start, end)) = layout.crest {
        let (s, e) = (start as u32, end as u32);
        mesh.add_quad(a + s, a + o + s, b + o + s, b + s, Some(PatchName::Top));
        mesh.add_quad(a + e, b + e, b + o + e, a + o + e, Some(PatchName::Top));
    }
}

/// Close one end of the sweep
pub(crate) fn add_cap(
    mesh: &mut SweepMesh,
    layout: &RingLayout<'_>,
    station: &Station,
    section: &SectionProfiles,
    base: u32,
    end: CapEnd,
) -> Result<()> {
    let patch = Some(end.patch());
    let n = layout.inner;

    if layout.lined {
        let o = n as u32;
        for j in 0..n {
            if layout.roles[j] == EdgeRole::FreeSurface {
                continue;
            }
            let (j0, j1) = (base + j as u32, base + ((j + 1) % n) as u32);
            match end {
                CapEnd::Inlet => mesh.add_quad(j0, j0 + o, j1 + o, j1, patch),
                CapEnd::Outlet => mesh.add_quad(j0, j1, j1 + o, j0 + o, patch),
            };
        }
        return Ok(());
    }

    let cap = triangulate_cap(&section.inner.points)?;
    let center = cap
        .center
        .map(|c| mesh.add_vertex(station.to_world(&c)))
        .unwrap_or(u32::MAX);
    let index = |k: usize| if k == n { center } else { base + k as u32 };

    for t in &cap.triangles {
        let (v0, v1, v2) = (index(t[0]), index(t[1]), index(t[2]));
        // counter-clockwise in the section plane faces backwards along the path
        match end {
            CapEnd::Inlet => mesh.add_triangle(v0, v1, v2, patch),
            CapEnd::Outlet => mesh.add_triangle(v0, v2, v1, patch),
        };
    }
    Ok(())
}

/// Sweep rings along stations without the final orientation pass.
///
/// Lined shells keep the interior free-surface vertices of every ring
/// unreferenced; [`finish_shell`] drops them.
pub(crate) fn sweep_stations(
    stations: &[Station],
    cyclic: bool,
    sections: &StationSections<'_>,
    options: &SweepOptions,
) -> Result<SweepMesh> {
    if stations.len() < 2 {
        return Err(Error::InvalidPath(format!(
            "need at least 2 stations, got {}",
            stations.len()
        )));
    }
    if let StationSections::Varying(list) = sections {
        if list.len() != stations.len() {
            return Err(Error::InvalidProfile(format!(
                "{} profiles for {} stations",
                list.len(),
                stations.len()
            )));
        }
    }
    let reference = sections.at(0);
    if reference.inner.len() < 3 {
        return Err(Error::InvalidProfile(format!(
            "profile needs at least 3 points, got {}",
            reference.inner.len()
        )));
    }
    if sections.min_area() < MIN_PROFILE_AREA {
        return Err(Error::EmptyResult("profile collapses to zero area".into()));
    }

    let layout = RingLayout::new(reference);
    let stride = layout.stride();
    let rings = instantiate_rings(stations, sections, options.curvature_guard);

    let segments = if cyclic { stations.len() } else { stations.len() - 1 };
    let mut mesh = SweepMesh::with_capacity(stations.len() * stride + 2, segments * stride + 2 * stride);
    mesh.cyclic = cyclic;

    for ring in &rings {
        push_ring(&mut mesh, ring);
    }
    for i in 0..segments {
        let a = (i * stride) as u32;
        let b = (((i + 1) % stations.len()) * stride) as u32;
        knit_rings(&mut mesh, &layout, a, b);
    }

    if !cyclic {
        if options.cap_inlet {
            let first = &stations[0];
            let section = station_profiles(sections.at(0), first, options.curvature_guard);
            add_cap(&mut mesh, &layout, first, &section, 0, CapEnd::Inlet)?;
        }
        if options.cap_outlet {
            let last_index = stations.len() - 1;
            let last = &stations[last_index];
            let section = station_profiles(sections.at(last_index), last, options.curvature_guard);
            let base = (last_index * stride) as u32;
            add_cap(&mut mesh, &layout, last, &section, base, CapEnd::Outlet)?;
        }
    }

    if mesh.is_empty() {
        return Err(Error::EmptyResult("sweep produced no faces".into()));
    }
    Ok(mesh)
}

/// Drop unreferenced ring vertices of lined shells, then orient outward.
///
/// Returns the number of flipped faces.
pub(crate) fn finish_shell(mesh: SweepMesh, lined: bool) -> (SweepMesh, usize) {
    let mut mesh = if lined {
        remove_loose_vertices(&mesh).0
    } else {
        mesh
    };
    let flipped = mesh.orient_outward();
    (mesh, flipped)
}

/// Sweep the channel structure along a sampled path
pub fn sweep_structural(
    path: &SampledPath,
    profiles: &SectionProfiles,
    options: &SweepOptions,
) -> Result<SweepMesh> {
    let sections = StationSections::Uniform(profiles);
    let mesh = sweep_stations(&path.stations, path.cyclic, &sections, options)?;
    let (mesh, flipped) = finish_shell(mesh, profiles.outer.is_some());

    debug!(
        stations = path.len(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        lined = profiles.outer.is_some(),
        flipped,
        "built structural sweep"
    );
    Ok(mesh)
}

/// Sweep the channel structure with section dimensions following an
/// alignment's transition zones
pub fn sweep_alignment(
    path: &SampledPath,
    alignment: &ChannelAlignment,
    options: &SweepOptions,
) -> Result<SweepMesh> {
    let source = SectionSource::aligned(alignment, &station_distances(&path.stations))?;
    let sections = source.sections(&path.stations)?;
    let mesh = sweep_stations(&path.stations, path.cyclic, &sections, options)?;
    let (mesh, flipped) = finish_shell(mesh, alignment.base.has_lining());

    debug!(
        stations = path.len(),
        transitions = alignment.transitions.len(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        flipped,
        "built structural sweep along alignment"
    );
    Ok(mesh)
}

/// Straight stations prolonging the path beyond one of its ends
fn extension_stations(end: &Station, length: f64, resolution: f64, backwards: bool) -> Vec<Station> {
    let count = ((length / resolution).ceil() as usize).max(2);
    let sign = if backwards { -1.0 } else { 1.0 };
    let step = |i: usize| -> Station {
        let d = length * i as f64 / count as f64;
        Station {
            position: end.position + end.tangent * (sign * d),
            station_distance: end.station_distance + sign * d,
            curve_radius: f64::INFINITY,
            turn_sign: 0.0,
            ..*end
        }
    };

    if backwards {
        (1..=count).rev().map(step).collect()
    } else {
        (1..=count).map(step).collect()
    }
}

/// Sweep the fluid domain: the channel interior as a closed, capped volume
/// with boundary patches for CFD
pub fn sweep_fluid_domain(
    path: &SampledPath,
    params: &SectionParams,
    options: &FluidDomainOptions,
) -> Result<SweepMesh> {
    let profiles = SectionProfiles {
        inner: build_fluid_profile(params, options.fill)?,
        outer: None,
    };
    fluid_sweep(path, options, |_| Ok(StationSections::Uniform(&profiles)))
}

/// Fluid domain whose section follows an alignment's transition zones
pub fn sweep_fluid_alignment(
    path: &SampledPath,
    alignment: &ChannelAlignment,
    options: &FluidDomainOptions,
) -> Result<SweepMesh> {
    fluid_sweep(path, options, |stations| {
        let profiles = alignment.fluid_profiles_at(&station_distances(stations), options.fill)?;
        Ok(StationSections::Varying(profiles))
    })
}

fn fluid_sweep<'a>(
    path: &SampledPath,
    options: &FluidDomainOptions,
    sections: impl FnOnce(&[Station]) -> Result<StationSections<'a>>,
) -> Result<SweepMesh> {
    let mut stations: Cow<'_, [Station]> = Cow::Borrowed(&path.stations);
    let extend = |length: f64| length.is_finite() && length > 0.0;
    if !path.cyclic && (extend(options.inlet_extension) || extend(options.outlet_extension)) {
        if let (Some(first), Some(last)) = (path.stations.first(), path.stations.last()) {
            let mut extended = Vec::with_capacity(path.len() + 8);
            if extend(options.inlet_extension) {
                extended.extend(extension_stations(first, options.inlet_extension, path.resolution, true));
            }
            extended.extend_from_slice(&path.stations);
            if extend(options.outlet_extension) {
                extended.extend(extension_stations(last, options.outlet_extension, path.resolution, false));
            }
            stations = Cow::Owned(extended);
        }
    } else if path.cyclic && (options.inlet_extension > 0.0 || options.outlet_extension > 0.0) {
        warn!("extensions ignored on a closed path");
    }

    let sweep_options = SweepOptions {
        cap_inlet: options.cap_inlet,
        cap_outlet: options.cap_outlet,
        curvature_guard: options.curvature_guard,
    };
    let sections = sections(&*stations)?;
    let mut mesh = sweep_stations(&stations, path.cyclic, &sections, &sweep_options)?;
    mesh.orient_outward();

    debug!(
        stations = stations.len(),
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        fill = ?options.fill,
        "built fluid domain"
    );
    Ok(mesh)
}

/// Move every vertex by a world offset
pub(crate) fn translate_stations(stations: &[Station], offset: &Vector3<f64>) -> Vec<Station> {
    stations.iter().map(|s| s.translated(offset)).collect()
}
