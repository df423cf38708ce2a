//! WebSocket-backed [`EventChannel`].
//!
//! At most one live socket exists per channel. Connecting with a different
//! identity replaces it; connecting again with the same identity is a no-op.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use chunkwire_protocol::constants::{
    EVENT_DISCONNECT, EVENT_RECONNECT_FAILED, is_local_event,
};

use crate::adapter::{BoxFuture, EventChannel, EventHandler, HandlerId};
use crate::error::ChannelError;
use crate::reconnection::{
    ChannelContext, cancel_reconnect, connect_once, install, teardown,
};
use crate::registry::HandlerRegistry;
use crate::types::{ChannelConfig, ChannelIdentity, ConnectionState};

/// Reason reported with `disconnect` when the caller closes the channel.
const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Persistent event channel over a WebSocket.
pub struct WsChannel {
    ctx: ChannelContext,
}

impl WsChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            ctx: ChannelContext::new(config),
        }
    }

    /// Opens the channel for `identity`.
    ///
    /// Retries with the configured fixed delay before giving up. An empty
    /// identity is refused without touching the network.
    pub async fn connect(&self, identity: impl Into<ChannelIdentity>) -> Result<(), ChannelError> {
        let identity = identity.into();
        if identity.is_empty() {
            warn!("refusing to open a channel without an identity");
            return Err(ChannelError::EmptyIdentity);
        }
        if self.is_live_as(&identity) {
            debug!(identity = %identity, "already connected");
            return Ok(());
        }

        cancel_reconnect(&self.ctx.reconnect_cancel);
        let _ops = self.ctx.ops.lock().await;
        if self.is_live_as(&identity) {
            return Ok(());
        }
        self.ctx.manual_disconnect.store(false, Ordering::Release);

        if teardown(&self.ctx) {
            info!(identity = %identity, "switching channel identity");
            self.ctx.raise(
                EVENT_DISCONNECT,
                serde_json::json!({ "reason": CLIENT_DISCONNECT_REASON }),
            );
        }

        {
            let mut live = self.ctx.live.write().unwrap_or_else(|e| e.into_inner());
            live.identity = Some(identity.clone());
            live.state = ConnectionState::Connecting;
        }

        let reconnect = &self.ctx.config.reconnect;
        let retries = if reconnect.enabled { reconnect.attempts } else { 0 };
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                tokio::time::sleep(reconnect.delay).await;
            }
            match connect_once(&self.ctx, &identity).await {
                Ok(client) => {
                    install(&self.ctx, client, &identity);
                    return Ok(());
                }
                Err(e) => {
                    warn!(identity = %identity, attempt, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        self.ctx.set_state(ConnectionState::Disconnected);
        let attempts = retries + 1;
        self.ctx.raise(
            EVENT_RECONNECT_FAILED,
            serde_json::json!({ "attempts": attempts }),
        );

        match last_error {
            Some(e) if retries == 0 => Err(e),
            Some(e) => Err(ChannelError::Exhausted {
                attempts,
                last: e.to_string(),
            }),
            None => Err(ChannelError::Closed),
        }
    }

    /// Closes the channel. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        self.ctx.manual_disconnect.store(true, Ordering::Release);
        cancel_reconnect(&self.ctx.reconnect_cancel);
        let _ops = self.ctx.ops.lock().await;

        if teardown(&self.ctx) {
            info!("channel disconnected");
            self.ctx.raise(
                EVENT_DISCONNECT,
                serde_json::json!({ "reason": CLIENT_DISCONNECT_REASON }),
            );
        }
        self.ctx
            .live
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .identity = None;
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.live().state
    }

    /// Id of the live socket, `None` while disconnected.
    pub fn channel_id(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        self.ctx.live().channel_id
    }

    /// Subscriber registry, shared across reconnections.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.ctx.registry
    }

    fn is_live_as(&self, identity: &ChannelIdentity) -> bool {
        self.is_connected() && self.ctx.live().identity.as_ref() == Some(identity)
    }

    fn outbound_allowed(&self, event: &str) -> bool {
        if is_local_event(event) {
            warn!(event, "reserved event name cannot be emitted");
            return false;
        }
        if !self.is_connected() {
            warn!(event, "channel not connected, dropping event");
            return false;
        }
        true
    }
}

impl Default for WsChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.ctx.manual_disconnect.store(true, Ordering::Release);
        cancel_reconnect(&self.ctx.reconnect_cancel);
        teardown(&self.ctx);
    }
}

impl EventChannel for WsChannel {
    fn is_connected(&self) -> bool {
        self.ctx.connected.load(Ordering::Acquire)
    }

    fn identity(&self) -> Option<ChannelIdentity> {
        if !self.is_connected() {
            return None;
        }
        self.ctx.live().identity
    }

    fn emit<'a>(&'a self, event: &'a str, data: Option<serde_json::Value>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !self.outbound_allowed(event) {
                return;
            }
            let Some(client) = self.ctx.current_client() else {
                warn!(event, "channel not connected, dropping event");
                return;
            };
            if let Err(e) = client.emit(event, data).await {
                warn!(event, error = %e, "failed to emit event");
            }
        })
    }

    fn emit_binary<'a>(
        &'a self,
        event: &'a str,
        header: serde_json::Value,
        data: Vec<u8>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !self.outbound_allowed(event) {
                return;
            }
            let Some(client) = self.ctx.current_client() else {
                warn!(event, "channel not connected, dropping event");
                return;
            };
            if let Err(e) = client.emit_binary(event, &header, &data).await {
                warn!(event, error = %e, "failed to emit binary event");
            }
        })
    }

    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.ctx.registry.on(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) {
        self.ctx.registry.off(event, id);
    }

    fn remove_all_listeners(&self, event: &str) {
        self.ctx.registry.remove_all(event);
    }
}
