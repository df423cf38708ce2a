//! Connection establishment and automatic reconnection.
//!
//! Contains the shared [`ChannelContext`], the close callback installed on
//! every socket, and the fixed-delay reconnect loop.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chunkwire_protocol::constants::{
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_RECONNECT_FAILED, IDENTITY_QUERY_PARAM,
};

use crate::adapter::InboundEvent;
use crate::error::ChannelError;
use crate::registry::HandlerRegistry;
use crate::types::{ChannelConfig, ChannelIdentity, ConnectionState};
use crate::ws_client::{CloseCallback, WsClient};

/// What the channel currently knows about its connection.
#[derive(Debug, Clone)]
pub(crate) struct LiveState {
    /// Identity the channel is (or is trying to be) connected as.
    pub(crate) identity: Option<ChannelIdentity>,
    /// Id of the live socket.
    pub(crate) channel_id: Option<String>,
    pub(crate) state: ConnectionState,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            identity: None,
            channel_id: None,
            state: ConnectionState::Disconnected,
        }
    }
}

/// Shared state handed to close callbacks and the reconnect loop.
#[derive(Clone)]
pub(crate) struct ChannelContext {
    pub(crate) config: Arc<ChannelConfig>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) client: Arc<RwLock<Option<Arc<WsClient>>>>,
    pub(crate) live: Arc<RwLock<LiveState>>,
    pub(crate) connected: Arc<AtomicBool>,
    /// Set when the caller disconnects on purpose.
    pub(crate) manual_disconnect: Arc<AtomicBool>,
    pub(crate) reconnect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    /// Serializes connect, disconnect and reconnect attempts.
    pub(crate) ops: Arc<tokio::sync::Mutex<()>>,
}

impl ChannelContext {
    pub(crate) fn new(config: ChannelConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(HandlerRegistry::new()),
            client: Arc::new(RwLock::new(None)),
            live: Arc::new(RwLock::new(LiveState::default())),
            connected: Arc::new(AtomicBool::new(false)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
            ops: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub(crate) fn live(&self) -> LiveState {
        self.live.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.live.write().unwrap_or_else(|e| e.into_inner()).state = state;
    }

    pub(crate) fn current_client(&self) -> Option<Arc<WsClient>> {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Dispatches a locally raised event to subscribers.
    pub(crate) fn raise(&self, event: &str, data: serde_json::Value) {
        self.registry.dispatch(&InboundEvent::new(event, Some(data)));
    }
}

/// Appends the identity to the base URL as a query parameter.
pub(crate) fn build_url(base: &str, identity: &ChannelIdentity) -> Result<url::Url, ChannelError> {
    let mut url = url::Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair(IDENTITY_QUERY_PARAM, identity.as_str());
    Ok(url)
}

/// One connection attempt, bounded by the configured connect timeout.
pub(crate) async fn connect_once(
    ctx: &ChannelContext,
    identity: &ChannelIdentity,
) -> Result<Arc<WsClient>, ChannelError> {
    let url = build_url(&ctx.config.url, identity)?;
    let id = uuid::Uuid::new_v4().to_string();
    let on_close = make_close_callback(ctx.clone(), id.clone());
    let limit = ctx.config.reconnect.connect_timeout;

    debug!(url = %url, channel_id = %id, "opening channel");
    let connect = WsClient::connect(id, &url, &ctx.config, ctx.registry.clone(), on_close);
    match tokio::time::timeout(limit, connect).await {
        Ok(result) => result.map(Arc::new),
        Err(_) => Err(ChannelError::Timeout(limit)),
    }
}

/// Makes `client` the live connection and raises `connect`.
pub(crate) fn install(ctx: &ChannelContext, client: Arc<WsClient>, identity: &ChannelIdentity) {
    let id = client.id().to_string();
    let previous = ctx
        .client
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .replace(client);
    if let Some(old) = previous {
        old.close();
    }

    {
        let mut live = ctx.live.write().unwrap_or_else(|e| e.into_inner());
        live.identity = Some(identity.clone());
        live.channel_id = Some(id.clone());
        live.state = ConnectionState::Connected;
    }
    ctx.connected.store(true, Ordering::Release);

    info!(identity = %identity, channel_id = %id, "channel connected");
    ctx.raise(EVENT_CONNECT, serde_json::json!({ "id": id }));
}

/// Closes the live socket, if any. Returns whether one was open.
pub(crate) fn teardown(ctx: &ChannelContext) -> bool {
    let previous = ctx.client.write().unwrap_or_else(|e| e.into_inner()).take();
    ctx.connected.store(false, Ordering::Release);
    {
        let mut live = ctx.live.write().unwrap_or_else(|e| e.into_inner());
        live.channel_id = None;
        live.state = ConnectionState::Disconnected;
    }
    match previous {
        Some(client) => {
            client.close();
            true
        }
        None => false,
    }
}

/// Cancels the active reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = reconnect_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

fn make_close_callback(ctx: ChannelContext, id: String) -> CloseCallback {
    Arc::new(move |reason: &str| {
        handle_connection_lost(&ctx, &id, reason);
    })
}

/// Runs when a socket goes away without the caller asking for it.
fn handle_connection_lost(ctx: &ChannelContext, id: &str, reason: &str) {
    let lost = {
        let mut slot = ctx.client.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(current) if current.id() == id => slot.take(),
            _ => None,
        }
    };
    if lost.is_none() {
        debug!(channel_id = %id, "close from stale socket ignored");
        return;
    }
    drop(lost);

    ctx.connected.store(false, Ordering::Release);
    let identity = {
        let mut live = ctx.live.write().unwrap_or_else(|e| e.into_inner());
        live.channel_id = None;
        live.state = ConnectionState::Disconnected;
        live.identity.clone()
    };

    warn!(channel_id = %id, reason, "channel lost");
    ctx.raise(EVENT_DISCONNECT, serde_json::json!({ "reason": reason }));

    if ctx.manual_disconnect.load(Ordering::Acquire) || !ctx.config.reconnect.enabled {
        return;
    }
    let Some(identity) = identity else { return };

    let cancel = CancellationToken::new();
    cancel_reconnect(&ctx.reconnect_cancel);
    if let Ok(mut guard) = ctx.reconnect_cancel.lock() {
        *guard = Some(cancel.clone());
    }
    tokio::spawn(reconnect_loop(identity, ctx.clone(), cancel));
}

/// Fixed-delay reconnection with a bounded number of attempts.
///
/// Returns a boxed future to break the type cycle with the close callback,
/// which spawns this function.
pub(crate) fn reconnect_loop(
    identity: ChannelIdentity,
    ctx: ChannelContext,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let attempts = ctx.config.reconnect.attempts;
        let delay = ctx.config.reconnect.delay;

        for attempt in 1..=attempts {
            ctx.set_state(ConnectionState::Reconnecting { attempt });
            info!(identity = %identity, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(identity = %identity, "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let _ops = ctx.ops.lock().await;
            if cancel.is_cancelled() {
                return;
            }

            match connect_once(&ctx, &identity).await {
                Ok(client) => {
                    if cancel.is_cancelled() {
                        client.close();
                        return;
                    }
                    install(&ctx, client, &identity);
                    info!(identity = %identity, attempt, "reconnected");
                    clear_token(&ctx, &cancel);
                    return;
                }
                Err(e) => {
                    warn!(identity = %identity, attempt, error = %e, "reconnect attempt failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }
        ctx.set_state(ConnectionState::Disconnected);
        warn!(identity = %identity, attempts, "giving up on reconnection");
        ctx.raise(
            EVENT_RECONNECT_FAILED,
            serde_json::json!({ "attempts": attempts }),
        );
        clear_token(&ctx, &cancel);
    })
}

/// Forgets the reconnect token if it is still `ours`.
///
/// Tokens are only replaced after being cancelled under the same lock, so an
/// uncancelled `ours` is necessarily the stored one.
fn clear_token(ctx: &ChannelContext, ours: &CancellationToken) {
    if let Ok(mut guard) = ctx.reconnect_cancel.lock()
        && !ours.is_cancelled()
    {
        *guard = None;
    }
}
