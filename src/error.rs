//! Error types for beepwire.

use thiserror::Error;

/// Main error type for all session operations.
///
/// Negative replies from the peer are never reported through this type: they
/// are delivered to the error continuation of the request they answer.
#[derive(Debug, Error)]
pub enum BeepError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (management documents).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (malformed header, bad trailer, oversize frame, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound frame did not start at the expected sequence number.
    #[error("Out of sync on channel {channel}: expected seqno {expected}, got {actual}")]
    SequenceMismatch {
        /// Channel the frame arrived on.
        channel: u32,
        /// Sequence number the channel expected.
        expected: u64,
        /// Sequence number the frame claimed.
        actual: u64,
    },

    /// Frame addressed to a channel that is not open.
    #[error("Frame received for unknown channel {0}")]
    UnknownChannel(u32),

    /// Local send addressed to a channel this session does not have open.
    #[error("Channel {0} is not open")]
    ChannelNotOpen(u32),

    /// Local request the session cannot send, such as a start naming no profile.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Profile URI not registered with the session.
    #[error("Profile not registered: {0}")]
    UnknownProfile(String),

    /// Operation attempted after the session was closed or torn down.
    #[error("Session closed")]
    SessionClosed,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write buffer full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl BeepError {
    /// Whether local and peer state can no longer be trusted.
    ///
    /// Fatal errors must end the session; they are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BeepError::Protocol(_)
                | BeepError::SequenceMismatch { .. }
                | BeepError::UnknownChannel(_)
        )
    }
}

/// Result type alias using BeepError.
pub type Result<T> = std::result::Result<T, BeepError>;
