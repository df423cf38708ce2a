//! Single-file upload session.
//!
//! Drives one payload through the start / chunk / end handshake over an
//! [`EventChannel`]. Exactly one chunk is in flight at a time: chunk `i + 1`
//! is read and sent only after the server acknowledges chunk `i`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chunkwire_channel::{EventChannel, HandlerId, InboundEvent};
use chunkwire_protocol::constants::{
    EVENT_DISCONNECT, EVENT_UPLOAD_ACKNOWLEDGED, EVENT_UPLOAD_CHUNK, EVENT_UPLOAD_CHUNK_RECEIVED,
    EVENT_UPLOAD_COMPLETE, EVENT_UPLOAD_END, EVENT_UPLOAD_ERROR, EVENT_UPLOAD_START,
};
use chunkwire_protocol::{ChunkHeader, ChunkReceived, UploadFailed, UploadStart};
use chunkwire_transfer::{
    ChunkDescriptor, ChunkPlan, PayloadSource, TransferError, UploadProgress,
};

use crate::error::UploadError;
use crate::state::{UploadState, UploadStatus};
use crate::types::{UploadConfig, UploadOutcome};

/// Server replies, decoded off the channel's reader task.
#[derive(Debug)]
enum Signal {
    Acknowledged,
    ChunkReceived(ChunkReceived),
    Complete(serde_json::Value),
    Error(String),
    Disconnected(String),
}

/// Why the send loop stopped early.
enum Halt {
    Cancelled,
    Failed(UploadError),
}

impl From<UploadError> for Halt {
    fn from(e: UploadError) -> Self {
        Self::Failed(e)
    }
}

/// Handlers installed for one session; removed exactly once on drop.
struct Subscriptions<'a> {
    channel: &'a dyn EventChannel,
    ids: Vec<(&'static str, HandlerId)>,
}

impl<'a> Subscriptions<'a> {
    fn install(channel: &'a dyn EventChannel, tx: mpsc::UnboundedSender<Signal>) -> Self {
        let mut subs = Self {
            channel,
            ids: Vec::with_capacity(5),
        };
        subs.add(EVENT_UPLOAD_ACKNOWLEDGED, tx.clone(), |_| Signal::Acknowledged);
        subs.add(EVENT_UPLOAD_CHUNK_RECEIVED, tx.clone(), |ev| {
            Signal::ChunkReceived(decode(ev).unwrap_or_default())
        });
        subs.add(EVENT_UPLOAD_COMPLETE, tx.clone(), |ev| {
            Signal::Complete(ev.data.clone().unwrap_or(serde_json::Value::Null))
        });
        subs.add(EVENT_UPLOAD_ERROR, tx.clone(), |ev| {
            Signal::Error(decode::<UploadFailed>(ev).unwrap_or_default().message())
        });
        subs.add(EVENT_DISCONNECT, tx, |ev| {
            let reason = ev
                .data
                .as_ref()
                .and_then(|d| d.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or("disconnected");
            Signal::Disconnected(reason.to_string())
        });
        subs
    }

    fn add(
        &mut self,
        event: &'static str,
        tx: mpsc::UnboundedSender<Signal>,
        map: fn(&InboundEvent) -> Signal,
    ) {
        let id = self.channel.on(
            event,
            Arc::new(move |ev: &InboundEvent| {
                let _ = tx.send(map(ev));
            }),
        );
        self.ids.push((event, id));
    }
}

impl Drop for Subscriptions<'_> {
    fn drop(&mut self) {
        for (event, id) in self.ids.drain(..) {
            self.channel.off(event, id);
        }
    }
}

fn decode<T: for<'de> serde::Deserialize<'de>>(ev: &InboundEvent) -> Option<T> {
    let data = ev.data.clone()?;
    match serde_json::from_value(data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(event = %ev.name, error = %e, "malformed event payload");
            None
        }
    }
}

/// Uploads one payload.
pub struct UploadSession<'a> {
    channel: &'a dyn EventChannel,
    config: UploadConfig,
    cancel: CancellationToken,
    state: UploadState,
    started: bool,
}

impl<'a> UploadSession<'a> {
    /// Creates a session bound to `channel`. Cancelling `cancel` stops the
    /// session before its next chunk.
    pub fn new(channel: &'a dyn EventChannel, config: UploadConfig, cancel: CancellationToken) -> Self {
        Self {
            channel,
            config,
            cancel,
            state: UploadState::default(),
            started: false,
        }
    }

    /// Current state of the session.
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Runs the upload to a terminal state.
    ///
    /// Progress is reported on `progress` after every chunk acknowledgment
    /// and once more (at 100%) on completion. A session can only be run
    /// once.
    pub async fn upload(
        &mut self,
        source: &dyn PayloadSource,
        progress: &mpsc::Sender<UploadProgress>,
    ) -> Result<UploadOutcome, UploadError> {
        if self.started {
            return Err(UploadError::AlreadyStarted);
        }
        self.started = true;
        self.state = UploadState::new(source.payload().size);

        match self.run(source, progress).await {
            Ok(result) => Ok(UploadOutcome::Completed(result)),
            Err(Halt::Cancelled) => {
                self.state.transition(UploadStatus::Cancelled)?;
                info!(
                    file = %source.payload().name,
                    chunks_acked = self.state.current_chunk_index,
                    "upload cancelled"
                );
                Ok(UploadOutcome::Cancelled)
            }
            Err(Halt::Failed(e)) => {
                if !self.state.status.is_terminal() {
                    self.state.transition(UploadStatus::Failed)?;
                }
                self.state.last_error = Some(e.to_string());
                warn!(file = %source.payload().name, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        source: &dyn PayloadSource,
        progress: &mpsc::Sender<UploadProgress>,
    ) -> Result<serde_json::Value, Halt> {
        let payload = source.payload();
        let plan = ChunkPlan::new(payload.size, self.config.chunk_size).map_err(|e| match e {
            TransferError::ZeroChunkSize => UploadError::ZeroChunkSize,
            other => UploadError::ReadFailure(other),
        })?;

        self.check_cancelled()?;
        if !self.channel.is_connected() {
            return Err(UploadError::NotConnected.into());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subs = Subscriptions::install(self.channel, tx);

        let start = UploadStart {
            filename: payload.name.clone(),
            size: payload.size,
            mime_type: payload.mime_type.clone(),
            identity: self
                .channel
                .identity()
                .map(|id| id.to_string())
                .unwrap_or_default(),
        };
        info!(
            file = %payload.name,
            size = payload.size,
            chunks = plan.total_chunks(),
            "upload started"
        );
        self.channel
            .emit(EVENT_UPLOAD_START, Some(serde_json::to_value(&start).map_err(UploadError::from)?))
            .await;

        let mut in_flight: Option<ChunkDescriptor> = None;
        let mut acked_bytes: u64 = 0;

        loop {
            let signal = self.next_signal(&mut rx).await?;

            match (self.state.status, signal) {
                (_, Signal::Error(message)) => {
                    return Err(UploadError::Server(message).into());
                }
                (_, Signal::Disconnected(reason)) => {
                    return Err(UploadError::ChannelLost(reason).into());
                }
                (UploadStatus::Pending, Signal::Acknowledged) => {
                    self.state.transition(UploadStatus::Acknowledged)?;
                    debug!(file = %payload.name, "server acknowledged upload");
                    match plan.descriptor(0) {
                        Some(first) => {
                            self.state.transition(UploadStatus::Uploading)?;
                            self.send_chunk(source, &plan, first).await?;
                            in_flight = Some(first);
                        }
                        None => self.finish_sending().await?,
                    }
                }
                (UploadStatus::Uploading, Signal::ChunkReceived(ack)) => {
                    let Some(sent) = in_flight.take() else {
                        debug!("chunk acknowledgment with nothing in flight");
                        continue;
                    };
                    acked_bytes += sent.length;
                    let reported = ack.uploaded_size.filter(|&n| n > 0).unwrap_or(acked_bytes);
                    self.state.confirm_chunk(reported);

                    let update =
                        UploadProgress::in_flight(self.state.bytes_confirmed, self.state.total_bytes);
                    debug!(
                        chunk = sent.index,
                        confirmed = update.uploaded_bytes,
                        percent = update.percent,
                        "chunk acknowledged"
                    );
                    let _ = progress.send(update).await;

                    self.check_cancelled()?;
                    match plan.descriptor(self.state.current_chunk_index) {
                        Some(next) => {
                            self.send_chunk(source, &plan, next).await?;
                            in_flight = Some(next);
                        }
                        None => self.finish_sending().await?,
                    }
                }
                (UploadStatus::Uploading | UploadStatus::Finalizing, Signal::Complete(result)) => {
                    self.state.transition(UploadStatus::Complete)?;
                    self.state.bytes_confirmed = self.state.total_bytes;
                    let _ = progress
                        .send(UploadProgress::complete(self.state.total_bytes))
                        .await;
                    info!(file = %payload.name, size = payload.size, "upload complete");
                    return Ok(result);
                }
                (status, signal) => {
                    debug!(?status, ?signal, "ignoring out-of-sequence signal");
                }
            }
        }
    }

    /// Waits for the next server reply, honouring the acknowledgment
    /// timeout.
    ///
    /// Replies already queued win over cancellation. After `upload:end` the
    /// wait ignores cancellation and runs until the server answers, the
    /// channel drops or the timeout expires.
    async fn next_signal(
        &self,
        rx: &mut mpsc::UnboundedReceiver<Signal>,
    ) -> Result<Signal, Halt> {
        let cancellable = self.state.status.can_transition_to(UploadStatus::Cancelled);
        let recv = async {
            match self.config.ack_timeout {
                Some(limit) => tokio::time::timeout(limit, rx.recv()).await.ok(),
                None => Some(rx.recv().await),
            }
        };

        tokio::select! {
            biased;
            received = recv => match received {
                Some(Some(signal)) => Ok(signal),
                Some(None) => Err(UploadError::ChannelLost("listeners removed".into()).into()),
                None => {
                    let limit = self.config.ack_timeout.unwrap_or_default();
                    Err(UploadError::AckTimeout(limit).into())
                }
            },
            _ = self.cancel.cancelled(), if cancellable => Err(Halt::Cancelled),
        }
    }

    async fn send_chunk(
        &self,
        source: &dyn PayloadSource,
        plan: &ChunkPlan,
        chunk: ChunkDescriptor,
    ) -> Result<(), Halt> {
        let data = source
            .read_range(chunk.offset, chunk.length)
            .await
            .map_err(UploadError::ReadFailure)?;
        self.check_cancelled()?;
        if !self.channel.is_connected() {
            return Err(UploadError::ChannelLost("channel not connected".into()).into());
        }

        let header = ChunkHeader {
            chunk_index: chunk.index,
            total_chunks: plan.total_chunks(),
            chunk_size: chunk.length,
        };
        let header = serde_json::to_value(header).map_err(UploadError::from)?;
        debug!(chunk = chunk.index, offset = chunk.offset, length = chunk.length, "sending chunk");
        self.channel
            .emit_binary(EVENT_UPLOAD_CHUNK, header, data)
            .await;
        Ok(())
    }

    async fn finish_sending(&mut self) -> Result<(), Halt> {
        self.state.transition(UploadStatus::Finalizing)?;
        debug!("all chunks acknowledged, sending end of stream");
        self.channel.emit(EVENT_UPLOAD_END, None).await;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }
}
