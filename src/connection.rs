//! Connection driver binding a [`Session`] to a byte stream.
//!
//! The driver owns the session inside one task:
//! 1. Split the stream and spawn the writer task
//! 2. Queue the greeting
//! 3. Read into a [`FrameBuffer`] and dispatch each frame
//! 4. Run commands sent through a [`ConnectionHandle`]
//! 5. Feed queued frames to the writer as it has room
//!
//! Frames the session queues are moved to a local outbound queue, which
//! feeds the writer while reading goes on, so two peers writing to each
//! other at once never wait on one another. Reading pauses only while that
//! queue holds `max_queued_frames`; if the writer then stays blocked past
//! its backpressure timeout, the connection fails.
//!
//! # Example
//!
//! ```no_run
//! use beepwire::connection::{Connection, ConnectionConfig};
//! use beepwire::transport::connect;
//! use beepwire::{Role, Session};
//!
//! # async fn run() -> beepwire::Result<()> {
//! let stream = connect("127.0.0.1:10288").await?;
//! let session = Session::builder(Role::Initiator).build()?;
//! let connection = Connection::spawn(session, stream, ConnectionConfig::default());
//!
//! let peer_profiles = connection
//!     .handle()
//!     .execute(|session| session.peer_profiles().map(<[String]>::to_vec))
//!     .await?;
//! # let _ = peer_profiles;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{BeepError, Result};
use crate::message::Message;
use crate::profile::{CloseRequest, StartRequest};
use crate::protocol::{FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::session::Session;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default capacity of the command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Default number of outbound frames held before reading pauses.
pub const DEFAULT_MAX_QUEUED_FRAMES: usize = 16 * 1024;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Writer task configuration.
    pub writer: WriterConfig,
    /// Bytes requested per read.
    pub read_buffer_size: usize,
    /// Largest inbound frame payload accepted.
    pub max_payload_size: u32,
    /// Commands that may wait before `execute` blocks.
    pub command_capacity: usize,
    /// Outbound frames held for the writer before reading pauses.
    pub max_queued_frames: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            max_queued_frames: DEFAULT_MAX_QUEUED_FRAMES,
        }
    }
}

type Command = Box<dyn FnOnce(&mut Session) + Send>;

/// Handle for driving a session owned by a running connection.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Command>,
}

impl ConnectionHandle {
    /// Run `f` against the session inside the connection task.
    ///
    /// Frames `f` queues go to the writer as it makes room for them.
    pub async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command: Command = Box::new(move |session| {
            let _ = reply_tx.send(f(session));
        });

        self.tx
            .send(command)
            .await
            .map_err(|_| BeepError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| BeepError::ConnectionClosed)
    }

    /// Ask the peer to open a channel. See [`Session::start`].
    pub async fn start(&self, request: StartRequest) -> Result<u32> {
        self.execute(move |session| session.start(request)).await?
    }

    /// Ask the peer to close a channel. See [`Session::close`].
    pub async fn close(&self, request: CloseRequest) -> Result<()> {
        self.execute(move |session| session.close(request)).await?
    }

    /// Send a MSG on `channel`. See [`Session::send_msg`].
    pub async fn send_msg(&self, channel: u32, message: Message) -> Result<u32> {
        self.execute(move |session| session.send_msg(channel, message))
            .await?
    }
}

/// A session running over a stream.
pub struct Connection {
    handle: ConnectionHandle,
    task: JoinHandle<Result<Session>>,
}

impl Connection {
    /// Spawn the connection task.
    ///
    /// The task ends when the session closes or the peer closes the stream,
    /// returning the session, or when a read, write or protocol error
    /// occurs, after terminating the session.
    pub fn spawn<S>(session: Session, stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(writer, config.writer.clone());
        let (tx, commands) = mpsc::channel(config.command_capacity);

        let task = tokio::spawn(run(session, reader, writer, writer_task, commands, config));

        Self {
            handle: ConnectionHandle { tx },
            task,
        }
    }

    /// Get a handle for driving the session.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Wait for the connection to end.
    pub async fn wait(self) -> Result<Session> {
        let Self { handle, task } = self;
        drop(handle);
        task.await
            .map_err(|e| BeepError::Io(std::io::Error::other(e)))?
    }
}

async fn run<R>(
    mut session: Session,
    mut reader: R,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    mut commands: mpsc::Receiver<Command>,
    config: ConnectionConfig,
) -> Result<Session>
where
    R: AsyncRead + Unpin,
{
    let result = drive(&mut session, &mut reader, &writer, &mut commands, &config).await;

    // Queued frames get the backpressure timeout to drain after a clean end.
    drop(writer);
    let grace = match result {
        Ok(()) => config.writer.backpressure_timeout,
        Err(_) => Duration::ZERO,
    };
    finish_writer(writer_task, grace).await;

    match result {
        Ok(()) => Ok(session),
        Err(e) => {
            if e.is_fatal() {
                error!(error = %e, "fatal protocol error, terminating session");
            } else {
                warn!(error = %e, "connection failed, terminating session");
            }
            session.terminate();
            Err(e)
        }
    }
}

async fn finish_writer(mut writer_task: JoinHandle<Result<()>>, grace: Duration) {
    match tokio::time::timeout(grace, &mut writer_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "writer task failed"),
        Ok(Err(e)) => warn!(error = %e, "writer task panicked"),
        Err(_) => {
            debug!("writer task still busy, aborting");
            writer_task.abort();
        }
    }
}

async fn drive<R>(
    session: &mut Session,
    reader: &mut R,
    writer: &WriterHandle,
    commands: &mut mpsc::Receiver<Command>,
    config: &ConnectionConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_max_payload(config.max_payload_size);
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut outbound = VecDeque::new();
    let max_queued = config.max_queued_frames.max(1);
    let mut commands_open = true;

    queue_outbound(session, &mut outbound);

    while !session.is_closed() {
        tokio::select! {
            permit = writer.reserve(), if !outbound.is_empty() => {
                let permit = permit?;
                if let Some(frame) = outbound.pop_front() {
                    permit.send(frame);
                }
            }
            read = reader.read(&mut buf), if outbound.len() < max_queued => {
                let n = read?;
                if n == 0 {
                    if !frames.is_empty() {
                        warn!(buffered = frames.len(), "stream closed inside a frame");
                    }
                    debug!("peer closed the stream");
                    break;
                }

                for frame in frames.push(&buf[..n])? {
                    if let Err(e) = session.handle_frame(frame) {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        warn!(error = %e, "frame dropped");
                    }
                    queue_outbound(session, &mut outbound);
                    if session.is_closed() {
                        break;
                    }
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    command(session);
                    queue_outbound(session, &mut outbound);
                }
                None => commands_open = false,
            },
        }
    }

    debug!(queued = outbound.len(), "session finished, draining outbound frames");
    for frame in outbound {
        writer.send(frame).await?;
    }
    Ok(())
}

fn queue_outbound(session: &mut Session, outbound: &mut VecDeque<OutboundFrame>) {
    outbound.extend(session.drain_outbound().into_iter().map(OutboundFrame::from));
}
