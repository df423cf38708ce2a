//! Upload run: open the channel, drive the queue, report.

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use chunkwire_channel::WsChannel;
use chunkwire_transfer::{BoxFuture, FilePayload, PayloadSource};
use chunkwire_upload::{CompletionConsumer, FileResult, FileStatus, QueueEvent, UploadQueue};

use crate::config::Config;

/// Logs a summary once the queue has finished.
struct SummaryConsumer;

impl CompletionConsumer for SummaryConsumer {
    fn on_uploads_complete<'a>(&'a self, results: &'a [FileResult]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let stored: u64 = results
                .iter()
                .filter(|r| r.status == FileStatus::Complete)
                .map(|r| r.progress.total_bytes)
                .sum();
            info!(files = results.len(), bytes = stored, "uploads stored on server");
        })
    }
}

pub async fn run(config: Config, files: Vec<PathBuf>) -> anyhow::Result<()> {
    anyhow::ensure!(
        !config.identity.trim().is_empty(),
        "an identity is required (--identity or `identity` in the config file)"
    );

    let mut sources: Vec<Box<dyn PayloadSource>> = Vec::with_capacity(files.len());
    for path in &files {
        let source = FilePayload::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        sources.push(Box::new(source));
    }

    let channel = WsChannel::new(config.channel_config());
    channel
        .connect(config.identity.as_str())
        .await
        .with_context(|| format!("cannot connect to {}", config.url))?;

    let consumer = SummaryConsumer;
    let queue = UploadQueue::new(&channel, config.upload_config()).with_consumer(&consumer);

    let cancel = queue.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    let (events_tx, events_rx) = mpsc::channel(256);
    let total = sources.len();
    let printer = tokio::spawn(print_events(events_rx, total));

    let report = queue.run(&sources, &events_tx).await;
    drop(events_tx);
    let _ = printer.await;
    channel.disconnect().await;

    for file in &report.files {
        if let FileStatus::Error(message) = &file.status {
            eprintln!("  failed: {} ({message})", file.name);
        }
    }
    if report.cancelled {
        anyhow::bail!("upload cancelled after {} of {total} files", report.completed());
    }
    if report.failed() > 0 {
        anyhow::bail!("{} of {total} uploads failed", report.failed());
    }
    eprintln!("uploaded {total} file(s)");
    Ok(())
}

/// Renders queue events on stderr.
async fn print_events(mut rx: mpsc::Receiver<QueueEvent>, total: usize) {
    let mut names = vec![String::new(); total];
    while let Some(event) = rx.recv().await {
        match event {
            QueueEvent::Started { index, name } => {
                eprintln!("[{}/{total}] {name}", index + 1);
                names[index] = name;
            }
            QueueEvent::Progress {
                index,
                progress,
                overall,
            } => {
                eprintln!(
                    "    {}: {}% ({} / {} bytes), overall {overall}%",
                    names[index], progress.percent, progress.uploaded_bytes, progress.total_bytes
                );
            }
            QueueEvent::Finished { index, status } => {
                let label = match status {
                    FileStatus::Complete => "done".to_string(),
                    FileStatus::Cancelled => "cancelled".to_string(),
                    FileStatus::Error(e) => format!("error: {e}"),
                    FileStatus::Pending | FileStatus::Uploading => continue,
                };
                eprintln!("    {}: {label}", names[index]);
            }
        }
    }
}
