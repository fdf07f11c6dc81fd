// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building channel meshes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid drop structure: {0}")]
    InvalidDrop(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Triangulation failed: {0}")]
    TriangulationError(String),
}

impl Error {
    /// Short machine-readable code for reports
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::InvalidProfile(_) => "INVALID_PROFILE",
            Self::InvalidDrop(_) => "INVALID_DROP",
            Self::EmptyResult(_) => "EMPTY_RESULT",
            Self::TriangulationError(_) => "TRIANGULATION_ERROR",
        }
    }
}
