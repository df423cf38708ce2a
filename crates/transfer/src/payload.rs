//! Payload metadata and byte sources.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::trace;

use crate::TransferError;

/// Boxed future returned by [`PayloadSource`] reads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Immutable description of a binary blob to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// Something the upload session can read chunk bytes from.
///
/// Implementations must return exactly `length` bytes for any range inside
/// the payload; anything else is a read failure.
pub trait PayloadSource: Send + Sync {
    /// Metadata announced in the start signal.
    fn payload(&self) -> &Payload;

    /// Reads `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Vec<u8>, TransferError>>;
}

fn check_range(payload: &Payload, offset: u64, length: u64) -> Result<(), TransferError> {
    match offset.checked_add(length) {
        Some(end) if end <= payload.size => Ok(()),
        _ => Err(TransferError::OutOfRange {
            offset,
            length,
            size: payload.size,
        }),
    }
}

// ---------------------------------------------------------------------------
// MemoryPayload
// ---------------------------------------------------------------------------

/// A payload held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryPayload {
    payload: Payload,
    data: Arc<[u8]>,
}

impl MemoryPayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            payload: Payload {
                name: name.into(),
                size: data.len() as u64,
                mime_type: mime_type.into(),
            },
            data,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl PayloadSource for MemoryPayload {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Vec<u8>, TransferError>> {
        Box::pin(async move {
            check_range(&self.payload, offset, length)?;
            let start = offset as usize;
            Ok(self.data[start..start + length as usize].to_vec())
        })
    }
}

// ---------------------------------------------------------------------------
// FilePayload
// ---------------------------------------------------------------------------

/// A payload backed by a file on disk.
///
/// The size is captured at open time; if the file shrinks afterwards the
/// affected reads fail with [`TransferError::ShortRead`].
pub struct FilePayload {
    payload: Payload,
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FilePayload {
    /// Opens `path`, deriving the name from the file name and the MIME type
    /// from the extension.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let mime_type = detect_mime_type(&name).to_string();

        Ok(Self {
            payload: Payload {
                name,
                size,
                mime_type,
            },
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadSource for FilePayload {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Vec<u8>, TransferError>> {
        Box::pin(async move {
            check_range(&self.payload, offset, length)?;

            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(offset)).await?;

            let mut buf = vec![0u8; length as usize];
            let mut filled = 0;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    return Err(TransferError::ShortRead {
                        offset,
                        wanted: length,
                        got: filled as u64,
                    });
                }
                filled += n;
            }

            trace!(path = %self.path.display(), offset, length, "read chunk");
            Ok(buf)
        })
    }
}

/// Guesses a MIME type from a file name's extension.
///
/// Falls back to `application/octet-stream`.
pub fn detect_mime_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        _ => "application/octet-stream",
    }
}
