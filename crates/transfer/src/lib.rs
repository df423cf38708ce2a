//! Chunk planning, payload sources and progress math.
//!
//! Everything here is transport-agnostic: the upload session combines a
//! [`ChunkPlan`] with a [`PayloadSource`] and reports [`UploadProgress`].

mod payload;
mod planner;
mod progress;

pub use payload::{
    BoxFuture, FilePayload, MemoryPayload, Payload, PayloadSource, detect_mime_type,
};
pub use planner::{ChunkDescriptor, ChunkIter, ChunkPlan, plan};
pub use progress::{UploadProgress, overall_percent, percent_in_flight};

pub use chunkwire_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("range {offset}+{length} is outside a payload of {size} bytes")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: u64, got: u64 },
}
