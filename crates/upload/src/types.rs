//! Data types for uploads and the queue.

use std::time::Duration;

use chunkwire_protocol::constants::DEFAULT_CHUNK_SIZE;
use chunkwire_transfer::UploadProgress;

/// Default wait for any server reply before the session gives up.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// How long to wait for each server reply. `None` waits forever.
    pub ack_timeout: Option<Duration>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
        }
    }
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The server's completion payload.
    Completed(serde_json::Value),
    /// Stopped on request before completing.
    Cancelled,
}

/// Per-file status as tracked by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Uploading,
    Complete,
    Error(String),
    Cancelled,
}

/// Final record for one file of a queue run.
#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub name: String,
    pub status: FileStatus,
    pub progress: UploadProgress,
    /// Server completion payload, for completed files.
    pub response: Option<serde_json::Value>,
}

/// Progress event emitted by [`UploadQueue`](crate::UploadQueue).
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A file's session is starting.
    Started { index: usize, name: String },
    /// A file reported progress; `overall` is the mean over all files.
    Progress {
        index: usize,
        progress: UploadProgress,
        overall: u8,
    },
    /// A file reached a terminal status.
    Finished { index: usize, status: FileStatus },
}

/// Summary of a queue run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueReport {
    pub files: Vec<FileResult>,
    pub cancelled: bool,
}

impl QueueReport {
    pub fn completed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Complete)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Error(_)))
            .count()
    }
}
