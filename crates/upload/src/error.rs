//! Upload error types.

use std::time::Duration;

use crate::state::UploadStatus;

/// Terminal failures of an upload session.
///
/// Cancellation is not an error; it is reported as
/// [`UploadOutcome::Cancelled`](crate::UploadOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("channel not connected")]
    NotConnected,

    #[error("failed to read file: {0}")]
    ReadFailure(#[source] chunkwire_transfer::TransferError),

    /// Message reported by the server, verbatim.
    #[error("{0}")]
    Server(String),

    #[error("no response from server within {0:?}")]
    AckTimeout(Duration),

    #[error("channel lost mid-upload: {0}")]
    ChannelLost(String),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("session already started")]
    AlreadyStarted,

    #[error("illegal state transition {from:?} -> {to:?}")]
    IllegalTransition { from: UploadStatus, to: UploadStatus },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
