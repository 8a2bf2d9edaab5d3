//! Transfer session state
//!
//! Tracks one file transfer through `created → registering → uploading →
//! finishing → done`. Transitions only move forward; any state except `done`
//! may drop to `failed`, which is terminal.

use crate::routes::TargetKind;
use std::fmt;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferState {
    Created,
    Registering,
    Uploading,
    Finishing,
    Done,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Created => "created",
            TransferState::Registering => "registering",
            TransferState::Uploading => "uploading",
            TransferState::Finishing => "finishing",
            TransferState::Done => "done",
            TransferState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transfer state change: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TransferState,
    pub to: TransferState,
}

/// Protocol state of one upload
#[derive(Debug, Clone)]
pub struct TransferSession {
    target_kind: TargetKind,
    remote_object_id: Option<String>,
    chunks_uploaded: u64,
    total_chunks: u64,
    state: TransferState,
}

impl TransferSession {
    pub fn new(target_kind: TargetKind, total_chunks: u64) -> Self {
        Self {
            target_kind,
            remote_object_id: None,
            chunks_uploaded: 0,
            total_chunks,
            state: TransferState::Created,
        }
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    /// Identifier assigned by the register response
    pub fn remote_object_id(&self) -> Option<&str> {
        self.remote_object_id.as_deref()
    }

    pub fn chunks_uploaded(&self) -> u64 {
        self.chunks_uploaded
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// `created → registering`
    pub fn begin_register(&mut self) -> Result<(), InvalidTransition> {
        self.advance(TransferState::Created, TransferState::Registering)
    }

    /// `registering → uploading`, recording the server-assigned identifier
    pub fn registered(&mut self, remote_object_id: String) -> Result<(), InvalidTransition> {
        self.advance(TransferState::Registering, TransferState::Uploading)?;
        self.remote_object_id = Some(remote_object_id);
        Ok(())
    }

    /// Count one chunk whose register and byte upload both succeeded
    pub fn chunk_uploaded(&mut self) -> Result<(), InvalidTransition> {
        if self.state != TransferState::Uploading || self.chunks_uploaded >= self.total_chunks {
            return Err(InvalidTransition {
                from: self.state,
                to: TransferState::Uploading,
            });
        }
        self.chunks_uploaded += 1;
        Ok(())
    }

    /// `uploading → finishing`; requires every chunk to be acknowledged
    pub fn begin_finish(&mut self) -> Result<(), InvalidTransition> {
        if self.chunks_uploaded != self.total_chunks {
            return Err(InvalidTransition {
                from: self.state,
                to: TransferState::Finishing,
            });
        }
        self.advance(TransferState::Uploading, TransferState::Finishing)
    }

    /// `finishing → done`
    pub fn finished(&mut self) -> Result<(), InvalidTransition> {
        self.advance(TransferState::Finishing, TransferState::Done)
    }

    /// Move to `failed`; a finished session stays `done`
    pub fn fail(&mut self) {
        if self.state != TransferState::Done {
            self.state = TransferState::Failed;
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TransferState::Done
    }

    fn advance(&mut self, from: TransferState, to: TransferState) -> Result<(), InvalidTransition> {
        if self.state != from {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut session = TransferSession::new(TargetKind::Package, 2);
        session.begin_register().unwrap();
        session.registered("pkg1".into()).unwrap();
        assert_eq!(session.remote_object_id(), Some("pkg1"));

        session.chunk_uploaded().unwrap();
        assert!(session.begin_finish().is_err());
        session.chunk_uploaded().unwrap();
        session.begin_finish().unwrap();
        session.finished().unwrap();
        assert!(session.is_done());
        assert_eq!(session.chunks_uploaded(), 2);
    }

    #[test]
    fn test_no_chunks_before_register() {
        let mut session = TransferSession::new(TargetKind::RunArtifact, 1);
        assert!(session.chunk_uploaded().is_err());
        session.begin_register().unwrap();
        assert!(session.chunk_uploaded().is_err());
    }

    #[test]
    fn test_cannot_rewind() {
        let mut session = TransferSession::new(TargetKind::RunResult, 1);
        session.begin_register().unwrap();
        let err = session.begin_register().unwrap_err();
        assert_eq!(err.from, TransferState::Registering);
        assert_eq!(err.to, TransferState::Registering);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut session = TransferSession::new(TargetKind::Package, 1);
        session.begin_register().unwrap();
        session.fail();
        assert_eq!(session.state(), TransferState::Failed);
        assert!(session.registered("x".into()).is_err());
    }

    #[test]
    fn test_too_many_chunks_rejected() {
        let mut session = TransferSession::new(TargetKind::Package, 1);
        session.begin_register().unwrap();
        session.registered("x".into()).unwrap();
        session.chunk_uploaded().unwrap();
        assert!(session.chunk_uploaded().is_err());
    }
}
