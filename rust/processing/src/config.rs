// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Job descriptions loaded from JSON.

use std::path::Path;

use cadhy_geometry::{
    ChannelAlignment, CleanupOptions, DropStructure, FluidDomainOptions, PathPolyline,
    SamplingParams, SectionParams, SectionsParams, SweepOptions, TransitionZone, ValidationOptions,
};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Channel axis as plain coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub points: Vec<[f64; 3]>,
    #[serde(default)]
    pub closed: bool,
}

impl AxisSpec {
    pub fn to_polyline(&self) -> PathPolyline {
        if self.closed {
            PathPolyline::closed(&self.points)
        } else {
            PathPolyline::open(&self.points)
        }
    }
}

/// Everything needed to build one channel and its derived outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelJob {
    pub name: String,
    pub axis: AxisSpec,
    pub sampling: SamplingParams,
    pub section: SectionParams,
    /// Zones where the section dimensions change along the axis.
    pub transitions: Vec<TransitionZone>,
    pub sweep: SweepOptions,
    /// Drop structures along the axis.
    pub drops: Vec<DropStructure>,
    /// Build a fluid domain next to the structure.
    pub fluid: Option<FluidDomainOptions>,
    /// Cut cross sections along the axis.
    pub sections: Option<SectionsParams>,
    /// Water depth for section hydraulics, 75 % of the height when unset.
    pub water_depth: Option<f64>,
    /// Cleanup applied to both meshes before validation.
    pub cleanup: Option<CleanupOptions>,
    pub validation: ValidationOptions,
    pub manning_n: f64,
}

impl Default for ChannelJob {
    fn default() -> Self {
        Self {
            name: "channel".into(),
            axis: AxisSpec::default(),
            sampling: SamplingParams::default(),
            section: SectionParams::default(),
            transitions: Vec::new(),
            sweep: SweepOptions::default(),
            drops: Vec::new(),
            fluid: None,
            sections: None,
            water_depth: None,
            cleanup: None,
            validation: ValidationOptions::default(),
            manning_n: cadhy_geometry::hydraulics::DEFAULT_MANNING_N,
        }
    }
}

impl ChannelJob {
    /// Parse a job from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let job: ChannelJob = serde_json::from_str(text)?;
        job.check()?;
        Ok(job)
    }

    /// Load a job file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Section and transitions as one alignment.
    pub fn alignment(&self) -> ChannelAlignment {
        ChannelAlignment {
            base: self.section,
            transitions: self.transitions.clone(),
        }
    }

    /// Reject jobs that cannot produce a channel before any work is done.
    pub fn check(&self) -> Result<()> {
        if self.axis.points.len() < 2 {
            return Err(ProcessingError::InvalidJob(format!(
                "axis needs at least 2 points, got {}",
                self.axis.points.len()
            )));
        }
        if !(self.manning_n.is_finite() && self.manning_n > 0.0) {
            return Err(ProcessingError::InvalidJob(format!(
                "manning_n must be positive, got {}",
                self.manning_n
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadhy_geometry::{DropKind, FillMode, SectionType};

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job = ChannelJob::from_json(r#"{"axis": {"points": [[0,0,0],[10,0,0]]}}"#).unwrap();
        assert_eq!(job.name, "channel");
        assert_eq!(job.section, SectionParams::default());
        assert!(job.fluid.is_none());
        assert!(!job.axis.to_polyline().closed);
    }

    #[test]
    fn test_full_job() {
        let text = r#"{
            "name": "spillway",
            "axis": {"points": [[0,0,5],[20,0,4],[40,10,3]]},
            "sampling": {"resolution": 0.5, "adaptive": true},
            "section": {"section_type": "closed_pipe", "bottom_width": 1.2},
            "drops": [{"station": 10.0, "drop_height": 0.8, "kind": "stepped", "step_count": 3}],
            "fluid": {"fill": {"mode": "water_level", "level": 0.6}, "outlet_extension": 5.0},
            "sections": {"step": 5.0}
        }"#;
        let job = ChannelJob::from_json(text).unwrap();

        assert_eq!(job.section.section_type, SectionType::ClosedPipe);
        assert_eq!(job.section.freeboard, 0.3);
        assert_eq!(job.drops[0].kind, DropKind::Stepped);
        let fluid = job.fluid.unwrap();
        assert_eq!(fluid.fill, FillMode::WaterLevel(0.6));
        assert_eq!(fluid.outlet_extension, 5.0);
        assert_eq!(job.sections.unwrap().step, 5.0);
    }

    #[test]
    fn test_transitions() {
        let text = r#"{
            "axis": {"points": [[0,0,0],[30,0,0]]},
            "section": {"bottom_width": 2.0},
            "transitions": [
                {"start_station": 10.0, "end_station": 20.0, "end": {"bottom_width": 3.5}}
            ]
        }"#;
        let job = ChannelJob::from_json(text).unwrap();
        let alignment = job.alignment();
        assert_eq!(alignment.transitions.len(), 1);
        assert_eq!(alignment.transitions[0].start.bottom_width, None);
        assert_eq!(alignment.params_at(25.0).bottom_width, 3.5);
        assert_eq!(alignment.params_at(5.0).bottom_width, 2.0);
    }

    #[test]
    fn test_rejects_short_axis() {
        let err = ChannelJob::from_json(r#"{"axis": {"points": [[0,0,0]]}}"#).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidJob(_)));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            ChannelJob::from_json("{not json"),
            Err(ProcessingError::Json(_))
        ));
    }
}
