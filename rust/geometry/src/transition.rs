// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transition zones
//!
//! Section dimensions change linearly across a zone and hold their end
//! values until the next zone starts. All rings of one sweep are built
//! from a single [`ProfileLayout`], so consecutive rings always match.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::{
    build_fluid_profile_with, build_section_profiles_with, fluid_layout, section_layout,
    FillMode, ProfileLayout, SectionParams, SectionProfiles,
};

/// Dimensions set at one end of a zone; unset values carry over
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionOverrides {
    pub bottom_width: Option<f64>,
    pub side_slope: Option<f64>,
    pub height: Option<f64>,
    pub freeboard: Option<f64>,
    pub lining_thickness: Option<f64>,
}

impl SectionOverrides {
    /// `base` with the set dimensions replaced
    pub fn apply(&self, base: &SectionParams) -> SectionParams {
        SectionParams {
            bottom_width: self.bottom_width.unwrap_or(base.bottom_width),
            side_slope: self.side_slope.unwrap_or(base.side_slope),
            height: self.height.unwrap_or(base.height),
            freeboard: self.freeboard.unwrap_or(base.freeboard),
            lining_thickness: self.lining_thickness.unwrap_or(base.lining_thickness),
            ..*base
        }
    }
}

/// Linear change of section dimensions between two stations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionZone {
    pub start_station: f64,
    pub end_station: f64,
    #[serde(default)]
    pub start: SectionOverrides,
    #[serde(default)]
    pub end: SectionOverrides,
}

impl TransitionZone {
    #[inline]
    pub fn length(&self) -> f64 {
        self.end_station - self.start_station
    }

    #[inline]
    pub fn contains(&self, station: f64) -> bool {
        self.start_station <= station && station <= self.end_station
    }

    /// Interpolation factor at `station`, clamped to the zone
    pub fn factor(&self, station: f64) -> f64 {
        if self.length() <= 0.0 {
            return 0.0;
        }
        ((station - self.start_station) / self.length()).clamp(0.0, 1.0)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_params(a: &SectionParams, b: &SectionParams, t: f64) -> SectionParams {
    SectionParams {
        bottom_width: lerp(a.bottom_width, b.bottom_width, t),
        side_slope: lerp(a.side_slope, b.side_slope, t),
        height: lerp(a.height, b.height, t),
        freeboard: lerp(a.freeboard, b.freeboard, t),
        lining_thickness: lerp(a.lining_thickness, b.lining_thickness, t),
        ..*a
    }
}

/// Base section plus ordered transition zones
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelAlignment {
    pub base: SectionParams,
    pub transitions: Vec<TransitionZone>,
}

impl ChannelAlignment {
    pub fn new(base: SectionParams) -> Self {
        Self {
            base,
            transitions: Vec::new(),
        }
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Add a zone that starts from the dimensions in effect at
    /// `start_station` and ends at them with `target` applied.
    pub fn add_transition(
        &mut self,
        start_station: f64,
        end_station: f64,
        target: SectionOverrides,
    ) -> &TransitionZone {
        let zone = TransitionZone {
            start_station,
            end_station,
            start: SectionOverrides::default(),
            end: target,
        };
        let index = self
            .transitions
            .partition_point(|z| z.start_station <= start_station);
        self.transitions.insert(index, zone);
        &self.transitions[index]
    }

    /// Resolved dimensions at both ends of every zone, in order
    fn resolved(&self) -> impl Iterator<Item = (&TransitionZone, SectionParams, SectionParams)> {
        let mut current = self.base;
        self.transitions.iter().map(move |zone| {
            let start = zone.start.apply(&current);
            let end = zone.end.apply(&start);
            current = end;
            (zone, start, end)
        })
    }

    /// Section dimensions at an arc length
    pub fn params_at(&self, station: f64) -> SectionParams {
        let mut params = self.base;
        for (zone, start, end) in self.resolved() {
            if station < zone.start_station {
                break;
            }
            params = if zone.contains(station) {
                lerp_params(&start, &end, zone.factor(station))
            } else {
                end
            };
        }
        params
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        let lined = self.base.has_lining();

        for pair in self.transitions.windows(2) {
            if pair[1].start_station < pair[0].end_station {
                return Err(Error::InvalidProfile(format!(
                    "transitions at {:.3} m and {:.3} m overlap or are out of order",
                    pair[0].start_station, pair[1].start_station
                )));
            }
        }
        for (zone, start, end) in self.resolved() {
            if !(zone.start_station.is_finite()
                && zone.end_station.is_finite()
                && zone.length() > 0.0)
            {
                return Err(Error::InvalidProfile(format!(
                    "transition from {} m to {} m has no positive length",
                    zone.start_station, zone.end_station
                )));
            }
            for params in [start, end] {
                params.validate()?;
                if params.has_lining() != lined {
                    return Err(Error::InvalidProfile(format!(
                        "transition at {:.3} m switches the lining on or off",
                        zone.start_station
                    )));
                }
            }
        }
        Ok(())
    }

    /// Segment counts covering every given station and every zone end
    pub fn layout(&self, stations: &[f64]) -> Result<ProfileLayout> {
        self.validate()?;
        let mut layout = section_layout(&self.base)?;
        for params in self.checkpoints(stations) {
            layout.widen(&section_layout(&params)?)?;
        }
        Ok(layout)
    }

    /// Structural profiles at each station, sharing `layout`
    pub fn profiles_with(
        &self,
        stations: &[f64],
        layout: &ProfileLayout,
    ) -> Result<Vec<SectionProfiles>> {
        stations
            .par_iter()
            .map(|&s| build_section_profiles_with(&self.params_at(s), layout))
            .collect()
    }

    /// Structural profiles at each station
    pub fn profiles_at(&self, stations: &[f64]) -> Result<Vec<SectionProfiles>> {
        let layout = self.layout(stations)?;
        self.profiles_with(stations, &layout)
    }

    /// Unlined fluid profiles at each station
    pub fn fluid_profiles_at(&self, stations: &[f64], fill: FillMode) -> Result<Vec<SectionProfiles>> {
        self.validate()?;
        let mut layout = fluid_layout(&self.base, fill)?;
        for params in self.checkpoints(stations) {
            layout.widen(&fluid_layout(&params, fill)?)?;
        }

        stations
            .par_iter()
            .map(|&s| -> Result<SectionProfiles> {
                Ok(SectionProfiles {
                    inner: build_fluid_profile_with(&self.params_at(s), fill, &layout)?,
                    outer: None,
                })
            })
            .collect()
    }

    fn checkpoints<'a>(&'a self, stations: &'a [f64]) -> impl Iterator<Item = SectionParams> + 'a {
        self.resolved()
            .flat_map(|(_, start, end)| [start, end])
            .chain(stations.iter().map(|&s| self.params_at(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SectionType;
    use approx::assert_relative_eq;

    fn widening() -> ChannelAlignment {
        let mut alignment = ChannelAlignment::new(SectionParams::default());
        alignment.add_transition(
            10.0,
            20.0,
            SectionOverrides {
                bottom_width: Some(4.0),
                height: Some(3.0),
                ..Default::default()
            },
        );
        alignment
    }

    #[test]
    fn test_params_interpolate_and_hold() {
        let alignment = widening();
        assert_relative_eq!(alignment.params_at(5.0).bottom_width, 2.0);
        assert_relative_eq!(alignment.params_at(10.0).bottom_width, 2.0);
        assert_relative_eq!(alignment.params_at(15.0).bottom_width, 3.0);
        assert_relative_eq!(alignment.params_at(15.0).height, 2.5);
        assert_relative_eq!(alignment.params_at(20.0).bottom_width, 4.0);
        assert_relative_eq!(alignment.params_at(40.0).bottom_width, 4.0);
        assert_relative_eq!(alignment.params_at(40.0).side_slope, 1.5);
    }

    #[test]
    fn test_chained_transitions_start_where_previous_ended() {
        let mut alignment = widening();
        alignment.add_transition(
            30.0,
            40.0,
            SectionOverrides {
                bottom_width: Some(1.0),
                ..Default::default()
            },
        );
        assert_eq!(alignment.transitions.len(), 2);
        assert_relative_eq!(alignment.params_at(30.0).bottom_width, 4.0);
        assert_relative_eq!(alignment.params_at(35.0).bottom_width, 2.5);
        assert_relative_eq!(alignment.params_at(35.0).height, 3.0);
        assert_relative_eq!(alignment.params_at(50.0).bottom_width, 1.0);
        assert!(alignment.validate().is_ok());
    }

    #[test]
    fn test_profiles_share_vertex_count() {
        let alignment = widening();
        let stations: Vec<f64> = (0..=30).map(f64::from).collect();
        let profiles = alignment.profiles_at(&stations).unwrap();

        let size = profiles[0].ring_size();
        assert!(profiles.iter().all(|p| p.ring_size() == size));
        assert!(profiles[30].inner.area() > profiles[0].inner.area());
        for p in &profiles {
            for i in 0..p.inner.len() {
                assert!(p.inner.edge_length(i) <= 1.0 + 1e-9);
            }
        }

        let fluid = alignment
            .fluid_profiles_at(&stations, FillMode::WaterLevel(1.0))
            .unwrap();
        assert!(fluid.iter().all(|p| p.inner.len() == fluid[0].inner.len()));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut overlapping = widening();
        overlapping.transitions.push(TransitionZone {
            start_station: 15.0,
            end_station: 25.0,
            start: SectionOverrides::default(),
            end: SectionOverrides::default(),
        });
        assert!(matches!(overlapping.validate(), Err(Error::InvalidProfile(_))));

        let mut unlined = widening();
        unlined.transitions[0].end.lining_thickness = Some(0.0);
        assert!(unlined.validate().is_err());

        let mut empty = widening();
        empty.transitions[0].end_station = 10.0;
        assert!(empty.validate().is_err());

        let mut negative = widening();
        negative.transitions[0].end.bottom_width = Some(-1.0);
        assert!(negative.profiles_at(&[0.0, 15.0]).is_err());
    }

    #[test]
    fn test_pipe_fill_topology_must_not_change() {
        let mut alignment = ChannelAlignment::new(SectionParams {
            section_type: SectionType::ClosedPipe,
            bottom_width: 1.0,
            ..Default::default()
        });
        alignment.add_transition(
            0.0,
            10.0,
            SectionOverrides {
                bottom_width: Some(3.0),
                ..Default::default()
            },
        );
        // full below 1 m diameter, partially filled above
        let result = alignment.fluid_profiles_at(&[0.0, 10.0], FillMode::WaterLevel(1.5));
        assert!(matches!(result, Err(Error::InvalidProfile(_))));
    }
}
