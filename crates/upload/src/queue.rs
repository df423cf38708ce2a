//! Sequential multi-file upload queue.
//!
//! Runs one [`UploadSession`] at a time over a shared channel, tracks a
//! status per file, and aggregates progress into an overall percentage.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chunkwire_channel::EventChannel;
use chunkwire_transfer::{PayloadSource, UploadProgress, overall_percent};

use crate::consumer::CompletionConsumer;
use crate::session::UploadSession;
use crate::types::{FileResult, FileStatus, QueueEvent, QueueReport, UploadConfig, UploadOutcome};

/// Uploads files strictly one after another.
pub struct UploadQueue<'a> {
    channel: &'a dyn EventChannel,
    config: UploadConfig,
    cancel: CancellationToken,
    consumer: Option<&'a dyn CompletionConsumer>,
}

impl<'a> UploadQueue<'a> {
    pub fn new(channel: &'a dyn EventChannel, config: UploadConfig) -> Self {
        Self {
            channel,
            config,
            cancel: CancellationToken::new(),
            consumer: None,
        }
    }

    /// Sets the consumer notified after a successful run.
    pub fn with_consumer(mut self, consumer: &'a dyn CompletionConsumer) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Returns the token that cancels this queue.
    ///
    /// Cancelling stops the current file before its next chunk; files not
    /// yet started are never started.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads every source in order. A failed file does not stop the queue.
    pub async fn run(
        &self,
        sources: &[Box<dyn PayloadSource>],
        events_tx: &mpsc::Sender<QueueEvent>,
    ) -> QueueReport {
        let mut files: Vec<FileResult> = sources
            .iter()
            .map(|s| FileResult {
                name: s.payload().name.clone(),
                status: FileStatus::Pending,
                progress: UploadProgress::in_flight(0, s.payload().size),
                response: None,
            })
            .collect();
        let mut percents = vec![0u8; sources.len()];

        for (index, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            files[index].status = FileStatus::Uploading;
            let _ = events_tx
                .send(QueueEvent::Started {
                    index,
                    name: files[index].name.clone(),
                })
                .await;

            let (progress_tx, mut progress_rx) = mpsc::channel::<UploadProgress>(16);
            let mut session = UploadSession::new(self.channel, self.config.clone(), self.cancel.clone());

            let upload = async {
                let progress_tx = progress_tx;
                session.upload(&**source, &progress_tx).await
            };
            let forward = async {
                let mut last = None;
                while let Some(update) = progress_rx.recv().await {
                    percents[index] = update.percent;
                    last = Some(update);
                    let _ = events_tx
                        .send(QueueEvent::Progress {
                            index,
                            progress: update,
                            overall: overall_percent(&percents),
                        })
                        .await;
                }
                last
            };
            let (result, last) = tokio::join!(upload, forward);

            let file = &mut files[index];
            if let Some(update) = last {
                file.progress = update;
            }
            file.status = match result {
                Ok(UploadOutcome::Completed(response)) => {
                    file.response = Some(response);
                    FileStatus::Complete
                }
                Ok(UploadOutcome::Cancelled) => FileStatus::Cancelled,
                Err(e) => {
                    error!(file = %file.name, error = %e, "file upload failed");
                    FileStatus::Error(e.to_string())
                }
            };
            let _ = events_tx
                .send(QueueEvent::Finished {
                    index,
                    status: file.status.clone(),
                })
                .await;
        }

        for file in files.iter_mut().filter(|f| f.status == FileStatus::Pending) {
            file.status = FileStatus::Cancelled;
        }
        // A cancel that lands after the last file was stored cancels nothing.
        let cancelled = files.iter().any(|f| f.status == FileStatus::Cancelled);

        let report = QueueReport { files, cancelled };
        info!(
            total = report.files.len(),
            completed = report.completed(),
            failed = report.failed(),
            cancelled,
            "upload queue finished"
        );

        if !cancelled
            && report.completed() > 0
            && let Some(consumer) = self.consumer
        {
            consumer.on_uploads_complete(&report.files).await;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedChannel, Sent, chunk_ack, event, happy_server};
    use chunkwire_transfer::{BoxFuture, MemoryPayload};
    use std::sync::Mutex;

    fn source(name: &str, size: usize) -> Box<dyn PayloadSource> {
        Box::new(MemoryPayload::new(name, "application/octet-stream", vec![7u8; size]))
    }

    fn small_chunks() -> UploadConfig {
        UploadConfig {
            chunk_size: 4,
            ..UploadConfig::default()
        }
    }

    #[derive(Default)]
    struct RecordingConsumer {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl CompletionConsumer for RecordingConsumer {
        fn on_uploads_complete<'a>(&'a self, results: &'a [FileResult]) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let names = results.iter().map(|r| r.name.clone()).collect();
                self.calls.lock().unwrap().push(names);
            })
        }
    }

    /// Fails any file whose name starts with `bad`.
    fn picky_server() -> crate::testing::Script {
        let mut received = 0u64;
        Box::new(move |sent: &Sent| match sent {
            Sent::Event { name, data } if name == "upload:start" => {
                received = 0;
                let filename = data.as_ref().unwrap()["filename"].as_str().unwrap().to_string();
                if filename.starts_with("bad") {
                    vec![event(
                        "upload:error",
                        Some(serde_json::json!({"error": "quota exceeded"})),
                    )]
                } else {
                    vec![event("upload:acknowledged", None)]
                }
            }
            Sent::Binary { data, .. } => {
                received += data.len() as u64;
                vec![chunk_ack(received)]
            }
            _ => vec![event("upload:complete", Some(serde_json::json!({"size": received})))],
        })
    }

    async fn collect(mut rx: mpsc::Receiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn uploads_files_in_order_and_notifies_consumer() {
        let channel = ScriptedChannel::connected(happy_server());
        let consumer = RecordingConsumer::default();
        let queue = UploadQueue::new(&channel, small_chunks()).with_consumer(&consumer);
        let sources = vec![source("a.bin", 6), source("b.bin", 3)];

        let (tx, rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;
        drop(tx);
        let events = collect(rx).await;

        assert!(!report.cancelled);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.files[0].response.as_ref().unwrap()["size"], 6);
        assert_eq!(report.files[1].progress.percent, 100);

        let starts: Vec<String> = channel
            .sent()
            .iter()
            .filter(|s| s.name() == "upload:start")
            .map(|s| match s {
                Sent::Event { data, .. } => data.as_ref().unwrap()["filename"].to_string(),
                Sent::Binary { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(starts, vec!["\"a.bin\"", "\"b.bin\""]);

        let overall: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Progress { overall, .. } => Some(*overall),
                _ => None,
            })
            .collect();
        assert!(overall.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(overall.last(), Some(&100));

        assert_eq!(
            *consumer.calls.lock().unwrap(),
            vec![vec!["a.bin".to_string(), "b.bin".to_string()]]
        );
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_queue() {
        let channel = ScriptedChannel::connected(picky_server());
        let consumer = RecordingConsumer::default();
        let queue = UploadQueue::new(&channel, small_chunks()).with_consumer(&consumer);
        let sources = vec![source("a.bin", 4), source("bad.bin", 4), source("c.bin", 4)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert_eq!(report.files[0].status, FileStatus::Complete);
        assert_eq!(
            report.files[1].status,
            FileStatus::Error("quota exceeded".into())
        );
        assert_eq!(report.files[2].status, FileStatus::Complete);
        assert_eq!(consumer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn all_failed_skips_consumer() {
        let channel = ScriptedChannel::connected(picky_server());
        let consumer = RecordingConsumer::default();
        let queue = UploadQueue::new(&channel, small_chunks()).with_consumer(&consumer);
        let sources = vec![source("bad-1.bin", 4), source("bad-2.bin", 4)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert_eq!(report.failed(), 2);
        assert!(consumer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_stops_current_and_skips_rest() {
        let token = CancellationToken::new();

        let mut inner = happy_server();
        let trigger = token.clone();
        let channel = ScriptedChannel::connected(Box::new(move |sent: &Sent| {
            if let Sent::Binary { header, .. } = sent
                && header["chunkIndex"] == 1
            {
                trigger.cancel();
            }
            inner(sent)
        }));

        let consumer = RecordingConsumer::default();
        let queue = UploadQueue {
            channel: &channel,
            config: small_chunks(),
            cancel: token,
            consumer: Some(&consumer),
        };
        let sources = vec![source("a.bin", 4), source("b.bin", 12), source("c.bin", 4)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert!(report.cancelled);
        assert_eq!(report.files[0].status, FileStatus::Complete);
        assert_eq!(report.files[1].status, FileStatus::Cancelled);
        assert_eq!(report.files[2].status, FileStatus::Cancelled);
        assert!(consumer.calls.lock().unwrap().is_empty());

        let starts = channel
            .sent_names()
            .iter()
            .filter(|n| *n == "upload:start")
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn cancel_during_finalize_keeps_stored_file() {
        let token = CancellationToken::new();

        let mut inner = happy_server();
        let trigger = token.clone();
        let channel = ScriptedChannel::connected(Box::new(move |sent: &Sent| {
            if sent.name() == "upload:end" {
                trigger.cancel();
            }
            inner(sent)
        }));

        let consumer = RecordingConsumer::default();
        let queue = UploadQueue {
            channel: &channel,
            config: small_chunks(),
            cancel: token,
            consumer: Some(&consumer),
        };
        let sources = vec![source("a.bin", 4), source("b.bin", 4)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert!(report.cancelled);
        assert_eq!(report.files[0].status, FileStatus::Complete);
        assert_eq!(report.files[1].status, FileStatus::Cancelled);
        assert!(consumer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_after_last_file_stored_still_notifies_consumer() {
        let token = CancellationToken::new();

        let mut inner = happy_server();
        let trigger = token.clone();
        let channel = ScriptedChannel::connected(Box::new(move |sent: &Sent| {
            if sent.name() == "upload:end" {
                trigger.cancel();
            }
            inner(sent)
        }));

        let consumer = RecordingConsumer::default();
        let queue = UploadQueue {
            channel: &channel,
            config: small_chunks(),
            cancel: token,
            consumer: Some(&consumer),
        };
        let sources = vec![source("only.bin", 6)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert!(!report.cancelled);
        assert_eq!(report.files[0].status, FileStatus::Complete);
        assert_eq!(
            *consumer.calls.lock().unwrap(),
            vec![vec!["only.bin".to_string()]]
        );
    }

    #[tokio::test]
    async fn not_connected_marks_every_file_failed() {
        let channel = ScriptedChannel::disconnected();
        let queue = UploadQueue::new(&channel, small_chunks());
        let sources = vec![source("a.bin", 4), source("b.bin", 4)];

        let (tx, _rx) = mpsc::channel(128);
        let report = queue.run(&sources, &tx).await;

        assert!(report
            .files
            .iter()
            .all(|f| f.status == FileStatus::Error("channel not connected".into())));
        assert!(channel.sent().is_empty());
    }
}
