//! Upload session state machine.

use crate::error::UploadError;

/// Lifecycle of a single upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStatus {
    Pending,
    Acknowledged,
    Uploading,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> to` is an edge of the state machine.
    pub fn can_transition_to(self, to: Self) -> bool {
        use UploadStatus::*;
        match (self, to) {
            (Pending, Acknowledged) => true,
            (Acknowledged, Uploading | Finalizing) => true,
            (Uploading, Finalizing | Complete) => true,
            (Finalizing, Complete) => true,
            // Cancellation only stops the next chunk; once `upload:end` is
            // out the session runs to Complete or Failed.
            (Pending | Uploading, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Per-session record, owned by its [`UploadSession`](crate::UploadSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    pub status: UploadStatus,
    /// Number of chunks the server has acknowledged.
    pub current_chunk_index: u64,
    pub bytes_confirmed: u64,
    pub total_bytes: u64,
    pub last_error: Option<String>,
}

impl UploadState {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            status: UploadStatus::Pending,
            current_chunk_index: 0,
            bytes_confirmed: 0,
            total_bytes,
            last_error: None,
        }
    }

    /// Moves to `to`, rejecting edges the state machine does not have.
    pub fn transition(&mut self, to: UploadStatus) -> Result<(), UploadError> {
        if !self.status.can_transition_to(to) {
            return Err(UploadError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Records a chunk acknowledgment.
    ///
    /// `reported` is the server's running total; confirmed bytes never move
    /// backwards and never exceed the payload size.
    pub fn confirm_chunk(&mut self, reported: u64) {
        self.current_chunk_index += 1;
        self.bytes_confirmed = self.bytes_confirmed.max(reported.min(self.total_bytes));
    }
}

impl Default for UploadState {
    fn default() -> Self {
        Self::new(0)
    }
}
