//! Upload module
//!
//! Chunked, sequential upload of local files to the service. A transfer runs
//! in three phases: register the object, register and upload every chunk in
//! ascending order, then finish.

use crate::routes::{RouteError, TargetKind};
use crate::transport::TransportError;
use thiserror::Error;

pub mod engine;
pub mod payload;
pub mod planner;
pub mod session;
pub mod source;

pub use engine::UploadEngine;
pub use planner::{plan, ChunkDescriptor, ChunkPlanner};
pub use session::{TransferSession, TransferState};
pub use source::SourceFile;

/// Which chunk sub-step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    Register,
    Upload,
}

impl std::fmt::Display for ChunkStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStep::Register => f.write_str("registering"),
            ChunkStep::Upload => f.write_str("uploading"),
        }
    }
}

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Cannot read '{0}': {1}")]
    SourceUnavailable(String, #[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("{status} - {kind} registration failed")]
    RegisterFailed { kind: TargetKind, status: u16 },

    #[error("{kind} registration response has no identifier")]
    MissingIdentifier { kind: TargetKind },

    #[error("{status} - Something went wrong while {step} chunk {chunk} of {kind} '{id}'")]
    ChunkFailed {
        kind: TargetKind,
        id: String,
        chunk: u64,
        step: ChunkStep,
        status: u16,
    },

    #[error("Chunk {chunk} of {kind} '{id}' was registered without an identifier")]
    MissingChunkIdentifier {
        kind: TargetKind,
        id: String,
        chunk: u64,
    },

    #[error("{kind} upload failed")]
    FinishFailed { kind: TargetKind, status: u16 },

    #[error(transparent)]
    State(#[from] session::InvalidTransition),
}

impl UploadError {
    /// HTTP status behind the failure, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::RegisterFailed { status, .. }
            | UploadError::ChunkFailed { status, .. }
            | UploadError::FinishFailed { status, .. } => Some(*status),
            UploadError::Transport(TransportError::RequestError(e)) => {
                e.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }
}

/// Logical destination of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub kind: TargetKind,
    /// Project SUUID for packages, run SUUID for artifacts and results
    pub parent_suuid: String,
    pub description: Option<String>,
    pub job_name: Option<String>,
}

impl UploadTarget {
    pub fn package(project_suuid: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Package,
            parent_suuid: project_suuid.into(),
            description: None,
            job_name: None,
        }
    }

    pub fn artifact(run_suuid: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::RunArtifact,
            parent_suuid: run_suuid.into(),
            description: None,
            job_name: Some(job_name.into()),
        }
    }

    pub fn result(run_suuid: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::RunResult,
            parent_suuid: run_suuid.into(),
            description: None,
            job_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Final result of one upload call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub ok: bool,
    pub message: String,
    /// HTTP status of the failing call
    pub status: Option<u16>,
    /// Identifier assigned by the server, when registration got that far
    pub remote_object_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = UploadError::RegisterFailed {
            kind: TargetKind::Package,
            status: 400,
        };
        assert_eq!(err.to_string(), "400 - Package registration failed");
        assert_eq!(err.status(), Some(400));

        let err = UploadError::ChunkFailed {
            kind: TargetKind::RunArtifact,
            id: "a1".into(),
            chunk: 3,
            step: ChunkStep::Register,
            status: 500,
        };
        assert_eq!(
            err.to_string(),
            "500 - Something went wrong while registering chunk 3 of Artifact 'a1'"
        );

        let err = UploadError::FinishFailed {
            kind: TargetKind::RunResult,
            status: 502,
        };
        assert_eq!(err.to_string(), "Result upload failed");
    }

    #[test]
    fn test_upload_target_constructors() {
        let target = UploadTarget::artifact("run1", "train").with_description("model");
        assert_eq!(target.kind, TargetKind::RunArtifact);
        assert_eq!(target.job_name.as_deref(), Some("train"));
        assert_eq!(target.description.as_deref(), Some("model"));
        assert_eq!(UploadTarget::result("run1").kind, TargetKind::RunResult);
    }
}
