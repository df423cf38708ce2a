//! Hook run after a queue finishes uploading.

use chunkwire_transfer::BoxFuture;

use crate::types::FileResult;

/// Notified once after a queue run that completed at least one file and was
/// not cancelled. Typically refreshes cached listings or quota displays.
pub trait CompletionConsumer: Send + Sync {
    fn on_uploads_complete<'a>(&'a self, results: &'a [FileResult]) -> BoxFuture<'a, ()>;
}
