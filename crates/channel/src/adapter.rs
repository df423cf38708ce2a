//! The event channel seam.
//!
//! The upload session only ever sees `&dyn EventChannel`, so tests can
//! script a server without a socket.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::ChannelIdentity;

/// Boxed future returned by channel operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An event received from the server (or raised locally by the channel).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub name: String,
    pub data: Option<serde_json::Value>,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Subscriber callback. Runs on the channel's reader task and must not block.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Handle returned by [`EventChannel::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// A persistent bidirectional message channel.
pub trait EventChannel: Send + Sync {
    /// Returns `true` while a live connection exists.
    fn is_connected(&self) -> bool;

    /// Identity of the live connection, if any.
    fn identity(&self) -> Option<ChannelIdentity>;

    /// Sends a JSON event. Fails silently (logged) when disconnected.
    fn emit<'a>(&'a self, event: &'a str, data: Option<serde_json::Value>) -> BoxFuture<'a, ()>;

    /// Sends an event carrying raw bytes. Fails silently (logged) when
    /// disconnected.
    fn emit_binary<'a>(
        &'a self,
        event: &'a str,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> BoxFuture<'a, ()>;

    /// Subscribes `handler` to `event`.
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Unsubscribes one handler. Unknown ids are ignored.
    fn off(&self, event: &str, id: HandlerId);

    /// Drops every handler subscribed to `event`.
    fn remove_all_listeners(&self, event: &str);
}
