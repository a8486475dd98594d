//! MCP Transport Layer
//!
//! The stdio serve loop: host bytes in, JSON-RPC frames out.
//!
//! # Architecture
//!
//! ```text
//! reader ──► FrameReader ──► one task per message ──► mpsc ──► writer task ──► writer
//! ```
//!
//! Each message is dispatched on its own task so a slow backend call never
//! stalls reading. All frames pass through a single writer task, which writes
//! each one with one `write_all` followed by a flush; nothing else ever
//! touches the output stream. The queue to the writer is bounded: when the
//! host stops reading, dispatch tasks wait for room instead of buffering.

use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::frame::{FrameError, FrameLimits, FrameReader};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Size of one read from the input stream
pub const READ_CHUNK_BYTES: usize = 64 * 1024;

/// How long shutdown waits for in-flight requests, and then for the writer
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames queued for the writer before dispatch tasks wait for room
pub const OUTPUT_QUEUE_FRAMES: usize = 256;

/// Why the serve loop stopped abnormally
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to read host input: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("failed to write host output: {0}")]
    Write(#[source] std::io::Error),

    #[error("output writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Lines handed to the dispatcher
    pub messages: u64,

    /// Lines dropped for exceeding the message ceiling
    pub dropped: u64,

    /// Dispatch tasks still running when the drain timeout hit
    pub abandoned: usize,
}

/// Serve host messages until end of input or `shutdown` resolves.
///
/// # Arguments
///
/// * `reader` - Host input (stdin)
/// * `writer` - Host output (stdout); receives protocol frames only
/// * `dispatcher` - Message router
/// * `limits` - Framing ceilings
/// * `shutdown` - Resolves when serving should stop early (e.g. Ctrl-C)
///
/// # Errors
///
/// [`TransportError::Frame`] on buffer overflow, returned immediately without
/// draining. Read and write failures are returned after draining.
pub async fn serve<R, W, S>(
    mut reader: R,
    writer: W,
    dispatcher: Dispatcher,
    limits: FrameLimits,
    shutdown: S,
) -> Result<ServeSummary, TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (frames_tx, frames_rx) = mpsc::channel::<String>(OUTPUT_QUEUE_FRAMES);
    let mut writer_task = tokio::spawn(write_frames(writer, frames_rx));

    let mut frames = FrameReader::new(limits);
    let mut in_flight = JoinSet::new();
    let mut summary = ServeSummary::default();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let mut read_error = None;

    tokio::pin!(shutdown);

    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer reading host input");
                break;
            }
        };

        let n = match read {
            Ok(n) => n,
            Err(err) => {
                read_error = Some(err);
                break;
            }
        };

        if n == 0 {
            debug!("Host input closed");
            if let Some(line) = frames.finish() {
                summary.messages += 1;
                spawn_dispatch(&mut in_flight, &dispatcher, line, &frames_tx);
            }
            break;
        }

        for line in frames.push(&chunk[..n])? {
            summary.messages += 1;
            spawn_dispatch(&mut in_flight, &dispatcher, line, &frames_tx);
        }

        while let Some(finished) = in_flight.try_join_next() {
            log_task_result(finished);
        }
    }

    summary.dropped = frames.dropped_messages();
    summary.abandoned = drain(&mut in_flight).await;

    drop(frames_tx);
    // A host that stopped reading output must not hold shutdown forever
    let write_result = match tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await {
        Ok(joined) => joined?,
        Err(_) => {
            warn!("Host output not accepting frames, discarding queued responses");
            writer_task.abort();
            Ok(())
        }
    };

    if let Some(err) = read_error {
        return Err(TransportError::Read(err));
    }
    write_result.map_err(TransportError::Write)?;

    info!(
        messages = summary.messages,
        dropped = summary.dropped,
        abandoned = summary.abandoned,
        "Stdio serve loop finished"
    );
    Ok(summary)
}

fn spawn_dispatch(
    in_flight: &mut JoinSet<()>,
    dispatcher: &Dispatcher,
    line: String,
    frames_tx: &mpsc::Sender<String>,
) {
    let dispatcher = dispatcher.clone();
    let frames_tx = frames_tx.clone();
    in_flight.spawn(async move {
        let Some(response) = dispatcher.handle_line(&line).await else {
            return;
        };
        match response.to_frame() {
            Ok(frame) => {
                if frames_tx.send(frame).await.is_err() {
                    debug!(id = %response.id, "Output closed, response discarded");
                }
            }
            Err(err) => error!(error = %err, id = %response.id, "Failed to serialize response"),
        }
    });
}

/// Wait for in-flight requests; returns how many were abandoned.
async fn drain(in_flight: &mut JoinSet<()>) -> usize {
    if in_flight.is_empty() {
        return 0;
    }
    debug!(pending = in_flight.len(), "Waiting for in-flight requests");

    let finished = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(result) = in_flight.join_next().await {
            log_task_result(result);
        }
    })
    .await;

    if finished.is_ok() {
        return 0;
    }
    let abandoned = in_flight.len();
    warn!(abandoned, "In-flight requests did not finish in time, aborting");
    in_flight.abort_all();
    abandoned
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!(error = %err, "Dispatch task panicked");
        }
    }
}

async fn write_frames<W>(mut writer: W, mut frames: mpsc::Receiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut frame) = frames.recv().await {
        frame.push('\n');
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
