use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client -> server payloads
// ---------------------------------------------------------------------------

/// Payload of `upload:start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStart {
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub identity: String,
}

/// Header of an `upload:chunk` binary frame.
///
/// `chunk_size` is the length of *this* chunk, not the configured size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeader {
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

// ---------------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------------

/// Payload of `upload:chunk-received`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceived {
    /// Total bytes the server has stored so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_size: Option<u64>,
}

/// Payload of `upload:error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadFailed {
    /// Message used when the server gives no reason.
    pub const FALLBACK_MESSAGE: &'static str = "Upload failed";

    /// Returns the server's reason, or the fallback when absent or blank.
    pub fn message(&self) -> String {
        match self.error.as_deref() {
            Some(e) if !e.trim().is_empty() => e.to_string(),
            _ => Self::FALLBACK_MESSAGE.to_string(),
        }
    }
}
