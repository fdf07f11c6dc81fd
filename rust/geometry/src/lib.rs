// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CADHY Geometry Kernel
//!
//! Sweep-mesh generation for open channels, pipes and their CFD fluid
//! domains: path sampling with rotation-minimizing frames, parametric
//! cross sections with transition zones, curvature guarding, drop
//! structures, and mesh validation, cleanup and quality analysis.

pub mod analysis;
pub mod bvh;
pub mod cleanup;
pub mod drop;
pub mod error;
pub mod guard;
pub mod hydraulics;
pub mod mesh;
pub mod path;
pub mod profile;
pub mod quality;
pub mod sections;
pub mod sweep;
pub mod transition;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector2, Vector3};

pub use analysis::{
    cfd_domain_info, count_self_intersections, mesh_stats, mesh_volume, patch_areas, surface_area,
    validate_mesh, CfdDomainInfo, MeshStats, ValidationOptions, ValidationResult,
};
pub use cleanup::{cleanup_mesh, CleanupOptions, CleanupStats};
pub use drop::{
    sweep_alignment_with_drops, sweep_with_drops, validate_drops, DropKind, DropStructure,
};
pub use error::{Error, Result};
pub use hydraulics::{hydraulic_info, slope_info, HydraulicInfo, SlopeInfo};
pub use mesh::{Face, PatchName, SweepMesh};
pub use path::{sample_path, PathPolyline, SampledPath, SamplingParams, Station};
pub use profile::{
    build_fluid_profile, build_fluid_profile_with, build_section_profiles,
    build_section_profiles_with, fluid_layout, section_layout, ChannelProfile, EdgeRole, FillMode,
    ProfileLayout, SectionParams, SectionProfiles, SectionType,
};
pub use quality::{compute_quality, QualityMetrics, QualityRating};
pub use sections::{generate_alignment_sections, generate_sections, SectionCut, SectionsParams};
pub use sweep::{
    sweep_alignment, sweep_fluid_alignment, sweep_fluid_domain, sweep_structural,
    FluidDomainOptions, SweepOptions,
};
pub use transition::{ChannelAlignment, SectionOverrides, TransitionZone};
pub use triangulation::triangulate_polygon;
