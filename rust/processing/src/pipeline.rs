// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel build pipeline with progress milestones.

use std::time::Instant;

use cadhy_geometry::{
    analysis::{cfd_domain_info, mesh_stats, validate_mesh},
    build_section_profiles, cleanup_mesh, compute_quality, generate_alignment_sections,
    generate_sections, hydraulic_info,
    hydraulics::DEFAULT_BED_SLOPE,
    sample_path, slope_info, sweep_alignment_with_drops, sweep_fluid_alignment, sweep_fluid_domain,
    sweep_with_drops, CleanupOptions, CleanupStats, FluidDomainOptions, SampledPath,
    SectionProfiles, SweepMesh, ValidationOptions,
};
use serde::{Deserialize, Serialize};

use crate::config::ChannelJob;
use crate::error::Result;
use crate::report::{FluidReport, JobReport, MeshBuffers, MeshReport, ProcessingStats};

/// Pipeline milestones reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Sampling,
    Profiles,
    Topology,
    Validation,
}

impl BuildStage {
    /// Completion percentage when the stage starts.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Sampling => 10,
            Self::Profiles => 30,
            Self::Topology => 60,
            Self::Validation => 90,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sampling => "Sampling path",
            Self::Profiles => "Building profiles",
            Self::Topology => "Generating topology",
            Self::Validation => "Validating mesh",
        }
    }
}

/// Meshes built for a job, before reporting.
#[derive(Debug, Clone)]
pub struct ChannelBuild {
    pub path: SampledPath,
    pub profiles: SectionProfiles,
    pub structure: SweepMesh,
    pub fluid: Option<SweepMesh>,
    pub structure_cleanup: Option<CleanupStats>,
    pub fluid_cleanup: Option<CleanupStats>,
    pub setup_time_ms: u64,
    pub geometry_time_ms: u64,
}

fn apply_cleanup(mesh: SweepMesh, options: Option<&CleanupOptions>) -> (SweepMesh, Option<CleanupStats>) {
    match options {
        Some(options) => {
            let (cleaned, stats) = cleanup_mesh(&mesh, options);
            (cleaned, Some(stats))
        }
        None => (mesh, None),
    }
}

/// Build the fluid domain for a sampled path.
pub fn build_fluid_domain(job: &ChannelJob, path: &SampledPath, options: &FluidDomainOptions) -> Result<SweepMesh> {
    if !job.drops.is_empty() {
        tracing::warn!(drops = job.drops.len(), "fluid domain follows the axis without drops");
    }
    if job.transitions.is_empty() {
        Ok(sweep_fluid_domain(path, &job.section, options)?)
    } else {
        Ok(sweep_fluid_alignment(path, &job.alignment(), options)?)
    }
}

/// Build the structure, following transitions when the job has any.
fn build_structure(
    job: &ChannelJob,
    path: &SampledPath,
    profiles: &SectionProfiles,
) -> Result<SweepMesh> {
    if job.transitions.is_empty() {
        Ok(sweep_with_drops(path, profiles, &job.drops, &job.sweep)?)
    } else {
        Ok(sweep_alignment_with_drops(path, &job.alignment(), &job.drops, &job.sweep)?)
    }
}

/// Sample, profile and sweep a job's channel and optional fluid domain.
pub fn build_channel<F>(job: &ChannelJob, mut progress: F) -> Result<ChannelBuild>
where
    F: FnMut(BuildStage),
{
    let _span = tracing::info_span!("build_channel", name = %job.name).entered();
    job.check()?;
    let setup_start = Instant::now();

    progress(BuildStage::Sampling);
    let path = sample_path(&job.axis.to_polyline(), &job.sampling)?;
    tracing::debug!(
        stations = path.len(),
        length = path.total_length,
        cyclic = path.cyclic,
        "sampled axis"
    );

    progress(BuildStage::Profiles);
    let profiles = build_section_profiles(&job.section)?;
    if !job.transitions.is_empty() {
        job.alignment().validate()?;
    }
    tracing::debug!(
        section = ?job.section.section_type,
        ring_size = profiles.ring_size(),
        lined = profiles.outer.is_some(),
        transitions = job.transitions.len(),
        "built section profiles"
    );
    let setup_time_ms = setup_start.elapsed().as_millis() as u64;

    progress(BuildStage::Topology);
    let geometry_start = Instant::now();
    let (structure, fluid) = rayon::join(
        || build_structure(job, &path, &profiles),
        || job.fluid.as_ref().map(|options| build_fluid_domain(job, &path, options)),
    );
    let (structure, structure_cleanup) = apply_cleanup(structure?, job.cleanup.as_ref());
    let (fluid, fluid_cleanup) = match fluid.transpose()? {
        Some(mesh) => {
            let (mesh, stats) = apply_cleanup(mesh, job.cleanup.as_ref());
            (Some(mesh), stats)
        }
        None => (None, None),
    };
    let geometry_time_ms = geometry_start.elapsed().as_millis() as u64;

    tracing::info!(
        vertices = structure.vertex_count(),
        faces = structure.face_count(),
        fluid_faces = fluid.as_ref().map_or(0, |m| m.face_count()),
        geometry_time_ms,
        "channel geometry complete"
    );

    Ok(ChannelBuild {
        path,
        profiles,
        structure,
        fluid,
        structure_cleanup,
        fluid_cleanup,
        setup_time_ms,
        geometry_time_ms,
    })
}

fn mesh_report(
    mesh: &SweepMesh,
    options: &ValidationOptions,
    cleanup: Option<CleanupStats>,
    include_buffers: bool,
) -> MeshReport {
    let ((stats, validation), quality) = rayon::join(
        || (mesh_stats(mesh), validate_mesh(mesh, options)),
        || compute_quality(mesh),
    );
    MeshReport {
        stats,
        validation,
        quality,
        cleanup,
        buffers: include_buffers.then(|| MeshBuffers::from_mesh(mesh)),
    }
}

/// Run a job end to end and collect its report.
pub fn run_job<F>(job: &ChannelJob, include_buffers: bool, mut progress: F) -> Result<JobReport>
where
    F: FnMut(BuildStage),
{
    let total_start = Instant::now();
    let build = build_channel(job, &mut progress)?;

    progress(BuildStage::Validation);
    let validation_start = Instant::now();
    let structure = mesh_report(
        &build.structure,
        &job.validation,
        build.structure_cleanup,
        include_buffers,
    );
    let fluid = build.fluid.as_ref().map(|mesh| FluidReport {
        mesh: mesh_report(mesh, &job.validation, build.fluid_cleanup, include_buffers),
        domain: cfd_domain_info(mesh, &job.validation),
    });

    let polyline = job.axis.to_polyline();
    let slope = slope_info(&polyline);
    let bed_slope = slope
        .map(|s| s.average_slope)
        .filter(|&s| s > 0.0)
        .unwrap_or(DEFAULT_BED_SLOPE);
    let hydraulics = hydraulic_info(&job.section, job.water_depth, bed_slope, job.manning_n);

    let sections = match &job.sections {
        Some(params) if job.transitions.is_empty() => {
            generate_sections(&build.path, &job.section, params, job.water_depth)?
        }
        Some(params) => {
            generate_alignment_sections(&build.path, &job.alignment(), params, job.water_depth)?
        }
        None => Vec::new(),
    };
    let validation_time_ms = validation_start.elapsed().as_millis() as u64;

    let stats = ProcessingStats {
        stations: build.path.len(),
        curved_stations: build.path.curved_station_count(),
        path_length: build.path.total_length,
        setup_time_ms: build.setup_time_ms,
        geometry_time_ms: build.geometry_time_ms,
        validation_time_ms,
        total_time_ms: total_start.elapsed().as_millis() as u64,
    };

    tracing::info!(
        name = %job.name,
        valid = structure.validation.is_valid,
        rating = ?structure.quality.rating,
        sections = sections.len(),
        total_time_ms = stats.total_time_ms,
        "job complete"
    );

    Ok(JobReport {
        name: job.name.clone(),
        structure,
        fluid,
        hydraulics,
        slope,
        sections,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisSpec;
    use crate::error::ProcessingError;
    use cadhy_geometry::{
        DropStructure, PatchName, SectionOverrides, SectionParams, SectionsParams, TransitionZone,
    };

    fn straight_job() -> ChannelJob {
        ChannelJob {
            name: "test".into(),
            axis: AxisSpec {
                points: vec![[0.0, 0.0, 1.0], [20.0, 0.0, 1.0]],
                closed: false,
            },
            section: SectionParams {
                lining_thickness: 0.0,
                ..Default::default()
            },
            validation: ValidationOptions {
                check_self_intersections: false,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_order() {
        let mut stages = Vec::new();
        run_job(&straight_job(), false, |s| stages.push(s)).unwrap();
        assert_eq!(
            stages,
            vec![
                BuildStage::Sampling,
                BuildStage::Profiles,
                BuildStage::Topology,
                BuildStage::Validation
            ]
        );
        assert!(stages.windows(2).all(|w| w[0].progress() < w[1].progress()));
    }

    #[test]
    fn test_structure_and_fluid_report() {
        let job = ChannelJob {
            fluid: Some(FluidDomainOptions::default()),
            sections: Some(SectionsParams {
                step: 5.0,
                ..Default::default()
            }),
            ..straight_job()
        };
        let report = run_job(&job, true, |_| {}).unwrap();

        assert!(report.structure.validation.is_watertight);
        assert!(report.is_valid());
        let fluid = report.fluid.as_ref().unwrap();
        assert!(fluid.domain.is_watertight);
        assert!(fluid.domain.patch_areas[&PatchName::Inlet] > 0.0);
        assert_eq!(report.sections.len(), 5);
        assert_eq!(report.stats.stations, 21);

        let buffers = report.structure.buffers.as_ref().unwrap();
        assert_eq!(buffers.vertex_count(), report.structure.stats.vertices);

        // a flat axis falls back to the default bed slope
        assert_eq!(report.hydraulics.slope, DEFAULT_BED_SLOPE);
        assert_eq!(report.slope.unwrap().average_slope, 0.0);
    }

    #[test]
    fn test_report_serializes() {
        let report = run_job(&straight_job(), false, |_| {}).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"structure\""));
        assert!(!json.contains("\"buffers\""));
    }

    #[test]
    fn test_drops_and_cleanup() {
        let job = ChannelJob {
            drops: vec![DropStructure {
                station: 10.0,
                drop_height: 0.5,
                ..Default::default()
            }],
            cleanup: Some(CleanupOptions::default()),
            ..straight_job()
        };
        let report = run_job(&job, false, |_| {}).unwrap();
        assert!(report.structure.cleanup.is_some());
        assert_eq!(report.structure.validation.boundary_edges, 0);
        assert!(report.structure.validation.is_watertight);
        assert!(report.is_valid());
    }

    #[test]
    fn test_transitions_reach_every_output() {
        let job = ChannelJob {
            transitions: vec![TransitionZone {
                start_station: 5.0,
                end_station: 15.0,
                start: SectionOverrides::default(),
                end: SectionOverrides {
                    bottom_width: Some(3.0),
                    ..Default::default()
                },
            }],
            drops: vec![DropStructure {
                station: 10.0,
                drop_height: 0.5,
                ..Default::default()
            }],
            fluid: Some(FluidDomainOptions::default()),
            sections: Some(SectionsParams::default()),
            water_depth: Some(1.0),
            ..straight_job()
        };
        let report = run_job(&job, false, |_| {}).unwrap();

        assert!(report.is_valid(), "{:?}", report.structure.validation.errors);
        assert!(report.fluid.as_ref().unwrap().domain.is_watertight);
        // trapezoid at 1 m depth: (b + 1.5) * 1
        assert_eq!(report.sections.len(), 3);
        assert!((report.sections[0].hydraulics.area - 3.5).abs() < 1e-9);
        assert!((report.sections[2].hydraulics.area - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_bad_transition_is_rejected() {
        let job = ChannelJob {
            transitions: vec![TransitionZone {
                start_station: 5.0,
                end_station: 5.0,
                start: SectionOverrides::default(),
                end: SectionOverrides::default(),
            }],
            ..straight_job()
        };
        assert!(matches!(
            run_job(&job, false, |_| {}),
            Err(ProcessingError::Geometry(_))
        ));
    }

    #[test]
    fn test_geometry_error_propagates() {
        let job = ChannelJob {
            section: SectionParams {
                bottom_width: -1.0,
                ..Default::default()
            },
            ..straight_job()
        };
        assert!(matches!(
            run_job(&job, false, |_| {}),
            Err(ProcessingError::Geometry(_))
        ));
    }
}
