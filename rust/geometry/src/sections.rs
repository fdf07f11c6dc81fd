// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-section cuts along a sampled path

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hydraulics::{hydraulic_info, HydraulicInfo, DEFAULT_BED_SLOPE, DEFAULT_MANNING_N};
use crate::path::SampledPath;
use crate::profile::{build_section_profiles, SectionParams};
use crate::transition::ChannelAlignment;

/// Share of the channel height used as design depth when none is given
pub const DESIGN_DEPTH_RATIO: f64 = 0.75;

/// Where to cut sections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionsParams {
    pub start: f64,
    /// `None` runs to the end of the path
    pub end: Option<f64>,
    pub step: f64,
    /// Add a final cut at `end` when the step does not land on it
    pub include_endpoints: bool,
}

impl Default for SectionsParams {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
            step: 10.0,
            include_endpoints: true,
        }
    }
}

impl SectionsParams {
    /// Station distances for a path of length `length`
    pub fn get_stations(&self, length: f64) -> Result<Vec<f64>> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(Error::InvalidPath(format!(
                "section step must be positive, got {}",
                self.step
            )));
        }

        let end = self.end.unwrap_or(length).min(length);
        let start = self.start.max(0.0);
        if start > end {
            return Ok(Vec::new());
        }

        // multiply rather than accumulate so long paths do not drift
        let count = ((end - start) / self.step + 1e-9).floor() as usize;
        let mut stations: Vec<f64> = (0..=count).map(|i| start + i as f64 * self.step).collect();
        if self.include_endpoints && stations.last().is_some_and(|&s| end - s > 1e-9) {
            stations.push(end);
        }
        Ok(stations)
    }
}

/// One cross-section cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCut {
    /// Distance along the path
    pub station: f64,
    pub position: [f64; 3],
    pub tangent: [f64; 3],
    pub normal: [f64; 3],
    /// Inner section outline in world space
    pub profile_points: Vec<[f64; 3]>,
    pub hydraulics: HydraulicInfo,
}

/// Cut `path` at the stations of `sections`.
///
/// Hydraulic properties use `water_depth`, or three quarters of the design
/// height when `None`.
pub fn generate_sections(
    path: &SampledPath,
    params: &SectionParams,
    sections: &SectionsParams,
    water_depth: Option<f64>,
) -> Result<Vec<SectionCut>> {
    params.validate()?;
    cut_sections(path, sections, water_depth, |_| *params)
}

/// Cuts whose outline and hydraulics follow an alignment's transitions
pub fn generate_alignment_sections(
    path: &SampledPath,
    alignment: &ChannelAlignment,
    sections: &SectionsParams,
    water_depth: Option<f64>,
) -> Result<Vec<SectionCut>> {
    alignment.validate()?;
    cut_sections(path, sections, water_depth, |s| alignment.params_at(s))
}

fn cut_sections(
    path: &SampledPath,
    sections: &SectionsParams,
    water_depth: Option<f64>,
    params_at: impl Fn(f64) -> SectionParams,
) -> Result<Vec<SectionCut>> {
    let stations = sections.get_stations(path.total_length)?;
    let mut cuts = Vec::with_capacity(stations.len());

    for distance in stations {
        let Some(station) = path.station_at(distance) else {
            continue;
        };
        let params = params_at(distance);
        let profiles = build_section_profiles(&params)?;
        let depth = water_depth.unwrap_or(params.height * DESIGN_DEPTH_RATIO);
        let profile_points = profiles
            .inner
            .points
            .iter()
            .map(|p| station.to_world(p).coords.into())
            .collect::<Vec<[f64; 3]>>();

        cuts.push(SectionCut {
            station: distance,
            position: station.position.coords.into(),
            tangent: station.tangent.into(),
            normal: station.normal.into(),
            profile_points,
            hydraulics: hydraulic_info(&params, Some(depth), DEFAULT_BED_SLOPE, DEFAULT_MANNING_N),
        });
    }
    Ok(cuts)
}
