// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared channel processing pipeline.
//!
//! Turns a [`ChannelJob`] into meshes and a serializable [`JobReport`],
//! reporting [`BuildStage`] milestones along the way.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::{AxisSpec, ChannelJob};
pub use error::{ProcessingError, Result};
pub use pipeline::{build_channel, build_fluid_domain, run_job, BuildStage, ChannelBuild};
pub use report::{FluidReport, JobReport, MeshBuffers, MeshReport, ProcessingStats};
