//! Dedicated writer task for outbound frames.
//!
//! The session queues frames synchronously; the connection driver hands
//! them to this task through an mpsc channel. The task batches whatever is
//! ready and writes header line, payload and trailer of every frame in one
//! vectored write.
//!
//! ```text
//! Session ─► drain_outbound ─► WriterHandle ─► mpsc ─► Writer Task ─► stream
//! ```
//!
//! A pending-frame counter gives backpressure: once `max_pending_frames`
//! frames are queued and unwritten, `send` waits for the task to catch up,
//! failing with [`BeepError::BackpressureTimeout`] if it doesn't in time.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{BeepError, Result};
use crate::protocol::{Frame, TRAILER, TRAILER_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written: encoded header line plus payload.
///
/// The trailer is constant and added at write time.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Encoded header line, CRLF included.
    pub header: Vec<u8>,
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.header.len() + self.payload.len() + TRAILER_SIZE
    }
}

impl From<Frame> for OutboundFrame {
    fn from(frame: Frame) -> Self {
        Self {
            header: frame.header.encode(),
            payload: frame.payload,
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    /// Frames accepted but not yet written.
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits while backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.reserve().await?.send(frame);
        Ok(())
    }

    /// Wait for room for one frame.
    ///
    /// Cancel-safe: dropping the future before it completes queues
    /// nothing, so it can race other work in `select!`.
    pub async fn reserve(&self) -> Result<WriterPermit<'_>> {
        if self.is_backpressure_active() {
            self.wait_for_backpressure().await?;
        }
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| BeepError::ConnectionClosed)?;
        Ok(WriterPermit {
            permit,
            pending: &self.pending,
        })
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if !self.is_backpressure_active() {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(BeepError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }
}

/// Room for one frame in the writer queue, from [`WriterHandle::reserve`].
pub struct WriterPermit<'a> {
    permit: mpsc::Permit<'a, OutboundFrame>,
    pending: &'a AtomicUsize,
}

impl WriterPermit<'_> {
    /// Queue `frame`.
    pub fn send(self, frame: OutboundFrame) {
        // Count before sending so the writer never decrements below zero.
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.permit.send(frame);
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends, shutting the stream's write side down, once every handle
/// has been dropped and the queue is empty.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;
        trace!(frames = batch_size, "batch written");

        pending.fetch_sub(batch_size, Ordering::Release);
    }

    debug!("writer queue closed, shutting down stream");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(BeepError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for everything after the first `skip_bytes`.
///
/// Each frame contributes up to three slices: header line, payload (when
/// non-empty) and trailer.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.payload[..], TRAILER] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
