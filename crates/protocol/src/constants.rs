//! Event names and protocol-level defaults.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Client -> server events
// ---------------------------------------------------------------------------

/// Announces a new transfer.
pub const EVENT_UPLOAD_START: &str = "upload:start";
/// Carries one chunk's bytes (binary frame).
pub const EVENT_UPLOAD_CHUNK: &str = "upload:chunk";
/// Signals that every chunk has been sent.
pub const EVENT_UPLOAD_END: &str = "upload:end";

// ---------------------------------------------------------------------------
// Server -> client events
// ---------------------------------------------------------------------------

/// Server is ready to receive chunk 0.
pub const EVENT_UPLOAD_ACKNOWLEDGED: &str = "upload:acknowledged";
/// Acknowledges one chunk and gates the next send.
pub const EVENT_UPLOAD_CHUNK_RECEIVED: &str = "upload:chunk-received";
/// The transfer was fully processed.
pub const EVENT_UPLOAD_COMPLETE: &str = "upload:complete";
/// The server aborted the transfer.
pub const EVENT_UPLOAD_ERROR: &str = "upload:error";

// ---------------------------------------------------------------------------
// Local lifecycle events (dispatched by the channel, never sent on the wire)
// ---------------------------------------------------------------------------

/// A connection (or reconnection) was established.
pub const EVENT_CONNECT: &str = "connect";
/// The live connection went away.
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Automatic reconnection gave up.
pub const EVENT_RECONNECT_FAILED: &str = "reconnect_failed";

/// Returns `true` for events the channel raises itself.
pub fn is_local_event(name: &str) -> bool {
    matches!(
        name,
        EVENT_CONNECT | EVENT_DISCONNECT | EVENT_RECONNECT_FAILED
    )
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default chunk size: 512 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

/// Reconnection attempts after an unexpected disconnect.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;

/// Fixed delay between reconnection attempts.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Query parameter carrying the channel identity on the connect URL.
pub const IDENTITY_QUERY_PARAM: &str = "userId";

/// Interval between keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Silence window after which the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Largest frame accepted in either direction.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
