//! Long-running workers
//!
//! Two logical workers drive the pipeline:
//!
//! - the file worker polls a [`FileSource`] and runs the batch protocol over
//!   each file to completion, one file at a time
//! - the queue worker takes messages from a [`QueueSource`] and runs the
//!   single-message protocol, one message at a time
//!
//! Both stop when their `CancellationToken` fires, but only between units of
//! work: a file or message that is already being processed finishes (or
//! exhausts its retries) first.

use crate::core::pipeline::Pipeline;
use crate::core::traits::{FileSource, QueueSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Results of one pass over the file source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    /// Files processed and acknowledged
    pub completed: usize,
    /// Files left in place after their retry scope gave up
    pub failed: usize,
    /// Records dispatched across completed files
    pub dispatched: usize,
}

/// Process every file currently available, in source order
///
/// A failed file is logged and left for the next pass; it does not stop the
/// remaining files.
pub async fn drain_files(pipeline: &Pipeline, source: &dyn FileSource) -> DrainSummary {
    let mut summary = DrainSummary::default();

    let files = match source.poll().await {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to poll file source: {}", e);
            return summary;
        }
    };

    for file in &files {
        match pipeline.run_batch(source, file).await {
            Ok(outcome) => {
                summary.completed += 1;
                summary.dispatched += outcome.dispatched;
            }
            Err(e) => {
                error!(file = %file.name, "File not processed: {}", e);
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Poll the file source until cancelled
pub async fn run_file_worker(
    pipeline: Arc<Pipeline>,
    source: Arc<dyn FileSource>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_ms = poll_interval.as_millis() as u64, "File worker started");

    while !shutdown.is_cancelled() {
        let summary = drain_files(&pipeline, source.as_ref()).await;
        if summary.completed + summary.failed > 0 {
            info!(
                completed = summary.completed,
                failed = summary.failed,
                dispatched = summary.dispatched,
                "Finished polling pass"
            );
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    info!("File worker stopped");
}

/// Consume the queue until it closes or the worker is cancelled
///
/// Returns the number of messages acknowledged.
pub async fn run_queue_worker(
    pipeline: Arc<Pipeline>,
    source: Arc<dyn QueueSource>,
    shutdown: CancellationToken,
) -> usize {
    info!("Queue worker started");
    let mut acknowledged = 0;

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = source.receive() => received,
        };

        let delivery = match received {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to receive message: {}", e);
                continue;
            }
        };

        match pipeline.run_message(source.as_ref(), &delivery).await {
            Ok(()) => acknowledged += 1,
            Err(e) => error!(delivery = %delivery.id, "Message not processed: {}", e),
        }
    }

    info!(acknowledged, "Queue worker stopped");
    acknowledged
}
