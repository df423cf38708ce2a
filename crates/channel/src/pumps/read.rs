//! WebSocket read pump: decodes frames and dispatches events.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use chunkwire_protocol::constants::is_local_event;
use chunkwire_protocol::{BinaryFrame, EventFrame};

use crate::adapter::InboundEvent;
use crate::registry::HandlerRegistry;
use crate::ws_client::CloseCallback;

pub(crate) struct ReadOptions {
    pub(crate) pong_wait: Duration,
    pub(crate) max_message_size: usize,
}

/// Reads frames until the socket closes, dispatching each event.
///
/// Any incoming frame resets the liveness deadline; if nothing arrives
/// within `pong_wait` the connection is treated as dead. Unless the pump
/// was cancelled locally, `on_close` is invoked with the reason on exit.
pub(crate) async fn read_pump<S>(
    mut read: S,
    registry: Arc<HandlerRegistry>,
    on_close: CloseCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    opts: ReadOptions,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(opts.pong_wait);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,

            () = &mut deadline => {
                warn!("ping timeout, closing connection");
                break Some("ping timeout");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + opts.pong_wait);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text(&text, &registry, opts.max_message_size);
                            }
                            tungstenite::Message::Binary(bytes) => {
                                handle_binary(&bytes, &registry, opts.max_message_size);
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(frame = ?frame, "server closed connection");
                                break Some("io server disconnect");
                            }
                            tungstenite::Message::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break Some("transport error");
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break Some("transport close");
                    }
                }
            }
        }
    };

    if let Some(reason) = reason
        && !cancel.is_cancelled()
    {
        on_close(reason);
    }
}

/// Decodes a text frame and dispatches it.
fn handle_text(text: &str, registry: &HandlerRegistry, max_size: usize) {
    if text.len() > max_size {
        warn!("text frame too large ({} bytes), dropping", text.len());
        return;
    }

    let frame = match EventFrame::from_text(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to parse event frame: {e}");
            return;
        }
    };

    dispatch(registry, frame.event, frame.data);
}

/// Decodes a binary frame and dispatches its header as the event data.
fn handle_binary(bytes: &[u8], registry: &HandlerRegistry, max_size: usize) {
    if bytes.len() > max_size {
        warn!("binary frame too large ({} bytes), dropping", bytes.len());
        return;
    }

    let frame = match BinaryFrame::decode(bytes) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to parse binary frame: {e}");
            return;
        }
    };

    trace!(event = %frame.event, bytes = frame.data.len(), "binary payload ignored by client");
    dispatch(registry, frame.event, Some(frame.header));
}

fn dispatch(registry: &HandlerRegistry, name: String, data: Option<serde_json::Value>) {
    if is_local_event(&name) {
        warn!(event = %name, "server sent a reserved event name, dropping");
        return;
    }
    trace!(event = %name, "received event");
    registry.dispatch(&InboundEvent { name, data });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Mutex;

    fn recording_registry(event: &str) -> (Arc<HandlerRegistry>, Arc<Mutex<Vec<InboundEvent>>>) {
        let registry = Arc::new(HandlerRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        registry.on(
            event,
            Arc::new(move |ev: &InboundEvent| s.lock().unwrap().push(ev.clone())),
        );
        (registry, seen)
    }

    fn close_recorder() -> (CloseCallback, Arc<Mutex<Vec<String>>>) {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        let cb: CloseCallback = Arc::new(move |reason: &str| {
            r.lock().unwrap().push(reason.to_string());
        });
        (cb, reasons)
    }

    fn opts() -> ReadOptions {
        ReadOptions {
            pong_wait: Duration::from_secs(60),
            max_message_size: 1024,
        }
    }

    #[test]
    fn handle_text_dispatches_event() {
        let (registry, seen) = recording_registry("upload:chunk-received");
        handle_text(
            r#"{"event":"upload:chunk-received","data":{"uploadedSize":10}}"#,
            &registry,
            1024,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data.as_ref().unwrap()["uploadedSize"], 10);
    }

    #[test]
    fn handle_text_ignores_malformed_json() {
        let (registry, seen) = recording_registry("x");
        handle_text("not valid json {{{", &registry, 1024);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_text_rejects_oversized_frame() {
        let (registry, seen) = recording_registry("x");
        let huge = format!(r#"{{"event":"x","data":"{}"}}"#, "a".repeat(2000));
        handle_text(&huge, &registry, 1024);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn server_cannot_spoof_local_events() {
        let (registry, seen) = recording_registry("disconnect");
        handle_text(r#"{"event":"disconnect"}"#, &registry, 1024);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn handle_binary_dispatches_header() {
        let (registry, seen) = recording_registry("blob");
        let bytes = BinaryFrame::encode("blob", &serde_json::json!({"n": 1}), b"xyz").unwrap();
        handle_binary(&bytes, &registry, 1024);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data.as_ref().unwrap()["n"], 1);
    }

    #[tokio::test]
    async fn read_pump_reports_stream_end() {
        let (registry, _) = recording_registry("x");
        let (on_close, reasons) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(4);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(empty, registry, on_close, write_tx, CancellationToken::new(), opts()).await;

        assert_eq!(*reasons.lock().unwrap(), vec!["transport close"]);
    }

    #[tokio::test]
    async fn read_pump_silent_when_cancelled() {
        let (registry, _) = recording_registry("x");
        let (on_close, reasons) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(silent, registry, on_close, write_tx, cancel, opts()).await;

        assert!(reasons.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_pump_close_frame() {
        let (registry, _) = recording_registry("x");
        let (on_close, reasons) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(4);
        let frames = stream::iter(vec![Ok(tungstenite::Message::Close(None))]);

        read_pump(frames, registry, on_close, write_tx, CancellationToken::new(), opts()).await;

        assert_eq!(*reasons.lock().unwrap(), vec!["io server disconnect"]);
    }

    #[tokio::test]
    async fn read_pump_answers_ping() {
        let (registry, _) = recording_registry("x");
        let (on_close, _) = close_recorder();
        let (write_tx, mut write_rx) = mpsc::channel(4);
        let frames = stream::iter(vec![Ok(tungstenite::Message::Ping(vec![7u8].into()))]);

        read_pump(frames, registry, on_close, write_tx, CancellationToken::new(), opts()).await;

        let reply = write_rx.recv().await.unwrap();
        assert!(matches!(reply, tungstenite::Message::Pong(ref d) if d.as_ref() == [7u8]));
    }

    #[tokio::test]
    async fn read_pump_dispatches_then_closes() {
        let (registry, seen) = recording_registry("upload:acknowledged");
        let (on_close, reasons) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(4);
        let frames = stream::iter(vec![Ok(tungstenite::Message::Text(
            r#"{"event":"upload:acknowledged"}"#.into(),
        ))]);

        read_pump(frames, registry, on_close, write_tx, CancellationToken::new(), opts()).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(*reasons.lock().unwrap(), vec!["transport close"]);
    }

    #[tokio::test]
    async fn read_pump_timeout_on_silence() {
        tokio::time::pause();

        let (registry, _) = recording_registry("x");
        let (on_close, reasons) = close_recorder();
        let (write_tx, _write_rx) = mpsc::channel(4);
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(silent, registry, on_close, write_tx, CancellationToken::new(), opts()).await;

        assert_eq!(*reasons.lock().unwrap(), vec!["ping timeout"]);
    }
}
