//! WebSocket write pump: the only task that touches the sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Forwards queued frames to the socket in order, then sends a close frame.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => {
                let Some(frame) = next else { break };
                if let Err(e) = sink.send(frame).await {
                    error!("WebSocket write error: {e}");
                    return;
                }
                sent += 1;
            }
        }
    }

    debug!(frames = sent, "write pump stopping");
    let _ = sink.send(tungstenite::Message::Close(None)).await;
}
