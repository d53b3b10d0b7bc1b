//! Transport module - TCP listener and connector.
//!
//! Any `AsyncRead + AsyncWrite` stream can carry a session; TCP is the one
//! provided here.

mod tcp;

pub use tcp::{connect, Listener};
