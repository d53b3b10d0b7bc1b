//! # beepwire
//!
//! Multiplexed channel sessions over a single ordered byte stream.
//!
//! A session carries any number of independent channels. Each channel runs
//! one profile, an application sub-protocol, and exchanges messages as
//! MSG requests answered by RPY, ERR, or a run of ANS frames ended by NUL.
//! Channel 0 runs the management profile, which greets the peer and
//! negotiates starting and closing every other channel.
//!
//! ## Layers
//!
//! - [`protocol`]: frame header codec and the stream [`FrameBuffer`](protocol::FrameBuffer)
//! - [`channel`]: sequence checking, numbering, reassembly, segmentation
//! - [`profile`]: the [`Profile`] trait and the management documents
//! - [`session`]: the channel table, driven synchronously
//! - [`connection`]: binds a session to a stream with a reader loop and writer task
//!
//! ## Example
//!
//! ```no_run
//! use beepwire::connection::{Connection, ConnectionConfig};
//! use beepwire::profile::{ChannelContext, Profile};
//! use beepwire::transport::Listener;
//! use beepwire::{Message, Result, Role, Session};
//!
//! struct Echo;
//!
//! impl Profile for Echo {
//!     fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
//!         ctx.send_rpy(msgno, message);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let listener = Listener::bind("127.0.0.1:10288").await?;
//!     loop {
//!         let (stream, _peer) = listener.accept().await?;
//!         let session = Session::builder(Role::Listener)
//!             .profile("http://example.com/echo", || Echo)
//!             .build()?;
//!         Connection::spawn(session, stream, ConnectionConfig::default());
//!     }
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod profile;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use connection::{Connection, ConnectionConfig, ConnectionHandle};
pub use error::{BeepError, Result};
pub use message::Message;
pub use profile::{ChannelContext, CloseRequest, Profile, StartRequest};
pub use session::{Role, Session, SessionBuilder, SessionListener};
