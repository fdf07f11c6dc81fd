// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serializable outputs of a channel job.

use std::collections::BTreeMap;

use cadhy_geometry::{
    CfdDomainInfo, CleanupStats, HydraulicInfo, MeshStats, PatchName, QualityMetrics, SectionCut,
    SlopeInfo, SweepMesh, ValidationResult,
};
use serde::{Deserialize, Serialize};

/// Triangulated mesh ready for a viewer or exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffers {
    /// Vertex positions (x, y, z triplets).
    pub positions: Vec<f64>,
    /// Triangle indices.
    pub indices: Vec<u32>,
    /// Triangle indices (into `indices / 3`) per boundary patch.
    pub patches: BTreeMap<PatchName, Vec<u32>>,
}

impl MeshBuffers {
    pub fn from_mesh(mesh: &SweepMesh) -> Self {
        let positions = mesh.vertices.iter().flat_map(|p| [p.x, p.y, p.z]).collect();

        let mut face_patch: Vec<Option<PatchName>> = vec![None; mesh.face_count()];
        for (name, faces) in &mesh.patches {
            for &f in faces {
                face_patch[f] = Some(*name);
            }
        }

        let triangles = mesh.triangles();
        let mut indices = Vec::with_capacity(triangles.len() * 3);
        let mut patches: BTreeMap<PatchName, Vec<u32>> = BTreeMap::new();
        for (t, (tri, face)) in triangles.iter().enumerate() {
            indices.extend_from_slice(tri);
            if let Some(name) = face_patch[*face] {
                patches.entry(name).or_default().push(t as u32);
            }
        }

        Self {
            positions,
            indices,
            patches,
        }
    }

    /// Get the number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get the number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Checks and metrics for one built mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshReport {
    pub stats: MeshStats,
    pub validation: ValidationResult,
    pub quality: QualityMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffers: Option<MeshBuffers>,
}

/// Fluid-domain report with boundary information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidReport {
    pub mesh: MeshReport,
    pub domain: CfdDomainInfo,
}

/// Processing statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub stations: usize,
    pub curved_stations: usize,
    pub path_length: f64,
    /// Time spent sampling and building profiles (ms).
    pub setup_time_ms: u64,
    /// Time spent sweeping (ms).
    pub geometry_time_ms: u64,
    /// Time spent validating and measuring (ms).
    pub validation_time_ms: u64,
    pub total_time_ms: u64,
}

/// Everything a job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub structure: MeshReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fluid: Option<FluidReport>,
    pub hydraulics: HydraulicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<SlopeInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sections: Vec<SectionCut>,
    pub stats: ProcessingStats,
}

impl JobReport {
    /// Valid when every produced mesh passed validation.
    pub fn is_valid(&self) -> bool {
        self.structure.validation.is_valid
            && self
                .fluid
                .as_ref()
                .map_or(true, |f| f.mesh.validation.is_valid)
    }
}
