//! Wire protocol for chunked uploads over a persistent event channel.
//!
//! Defines the event names exchanged with the server, the payload of each
//! event, and the text/binary frame encoding used on the WebSocket.

pub mod constants;
pub mod events;
pub mod frame;

pub use events::{ChunkHeader, ChunkReceived, UploadFailed, UploadStart};
pub use frame::{BinaryFrame, EventFrame};

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary frame truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("binary frame header must be a JSON object")]
    HeaderNotObject,

    #[error("binary frame header has no event name")]
    MissingEvent,
}
