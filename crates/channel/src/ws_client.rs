//! One WebSocket connection to the server.
//!
//! Owns the read, write and ping pumps for a single socket. Reconnection is
//! handled a level up by [`WsChannel`](crate::WsChannel), which replaces the
//! client wholesale.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use chunkwire_protocol::{BinaryFrame, EventFrame};

use crate::error::ChannelError;
use crate::registry::HandlerRegistry;
use crate::types::ChannelConfig;

/// Called once when the socket closes for any reason other than
/// [`WsClient::close`]. The argument is a short reason string.
pub type CloseCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Outbound queue depth. Uploads keep at most one chunk in flight, so this
/// only buffers small control events.
const WRITE_QUEUE_DEPTH: usize = 64;

/// A connected WebSocket with its pumps running.
pub struct WsClient {
    id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Opens the socket at `url` and starts the pumps.
    ///
    /// Incoming events are dispatched through `registry`; `on_close` fires
    /// if the server goes away.
    pub async fn connect(
        id: String,
        url: &url::Url,
        config: &ChannelConfig,
        registry: Arc<HandlerRegistry>,
        on_close: CloseCallback,
    ) -> Result<Self, ChannelError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                .await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let opts = crate::pumps::read::ReadOptions {
                pong_wait: config.pong_wait,
                max_message_size: config.max_message_size,
            };
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, registry, on_close, write_tx, cancel, opts,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                cancel,
                config.ping_period,
            ))
        };

        Ok(Self {
            id,
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        })
    }

    /// Identifier of this connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues a JSON event.
    pub async fn emit(
        &self,
        event: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let frame = EventFrame {
            event: event.to_string(),
            data,
        };
        let text = frame.to_text()?;
        trace!(event, bytes = text.len(), "queue text frame");
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Queues a binary event: `[4 BE bytes][header JSON][data]`.
    pub async fn emit_binary(
        &self,
        event: &str,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Result<(), ChannelError> {
        let frame = BinaryFrame::encode(event, header, data)?;
        trace!(event, bytes = frame.len(), "queue binary frame");
        self.write_tx
            .send(tungstenite::Message::Binary(frame.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Closes the connection. The write pump sends a close frame on its way
    /// out; `on_close` is not invoked.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._ping_handle.abort();
        // The write pump exits on its own once it has flushed the close frame.
    }
}
