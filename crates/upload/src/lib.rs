//! Chunked uploads over a persistent event channel.
//!
//! This crate holds the **client-side protocol**: an [`UploadSession`] walks
//! one payload through the handshake, and an [`UploadQueue`] runs sessions
//! back to back. It knows nothing about sockets; anything implementing
//! [`EventChannel`](chunkwire_channel::EventChannel) will do.
//!
//! # Handshake
//!
//! 1. **Start**: `upload:start` announces name, size and MIME type
//! 2. **Acknowledge**: the server answers `upload:acknowledged`
//! 3. **Chunks**: each `upload:chunk` waits for `upload:chunk-received`
//! 4. **End**: `upload:end` after the last acknowledgment
//! 5. **Complete**: the server answers `upload:complete` (or `upload:error`)

pub mod consumer;
pub mod error;
pub mod queue;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use consumer::CompletionConsumer;
pub use error::UploadError;
pub use queue::UploadQueue;
pub use session::UploadSession;
pub use state::{UploadState, UploadStatus};
pub use types::{
    DEFAULT_ACK_TIMEOUT, FileResult, FileStatus, QueueEvent, QueueReport, UploadConfig,
    UploadOutcome,
};
