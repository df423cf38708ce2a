//! Channel error types.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Errors from the event channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame error: {0}")]
    Protocol(#[from] chunkwire_protocol::ProtocolError),

    #[error("invalid channel URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("channel identity must not be empty")]
    EmptyIdentity,

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to connect after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("connection closed")]
    Closed,
}
