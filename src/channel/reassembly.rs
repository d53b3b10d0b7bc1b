//! Reassembly of multi-frame messages.
//!
//! Frames of one message share a key: MSG frames are keyed by msgno alone,
//! replies by msgno plus the answer number for ANS. Replies to different
//! messages, and different answers to one message, may interleave on the
//! same channel, so each key accumulates independently.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::error::{BeepError, Result};
use crate::protocol::{Command, Frame};

/// A complete message assembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    /// Command shared by every frame of the message.
    pub command: Command,
    /// Message number.
    pub msgno: u32,
    /// Answer number (ANS only).
    pub ansno: Option<u32>,
    /// Sequence number of the terminal frame.
    pub seqno: u64,
    /// Concatenated payload.
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PartialKey {
    request: bool,
    msgno: u32,
    ansno: Option<u32>,
}

impl PartialKey {
    fn of(frame: &Frame) -> Self {
        Self {
            request: frame.command() == Command::Msg,
            msgno: frame.msgno(),
            ansno: frame.ansno(),
        }
    }
}

#[derive(Debug)]
struct Partial {
    command: Command,
    buf: BytesMut,
}

/// Accumulates continuation frames until a message completes.
#[derive(Debug, Default)]
pub struct Reassembler {
    partials: HashMap<PartialKey, Partial>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame.
    ///
    /// Returns the message once its final frame arrives. A reply frame whose
    /// command differs from the frames already collected under its key is a
    /// protocol error.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Assembled>> {
        let key = PartialKey::of(&frame);

        let Some(mut partial) = self.partials.remove(&key) else {
            if frame.more() {
                let mut buf = BytesMut::with_capacity(frame.payload_len() * 2);
                buf.extend_from_slice(frame.payload());
                self.partials.insert(
                    key,
                    Partial {
                        command: frame.command(),
                        buf,
                    },
                );
                return Ok(None);
            }
            // Single-frame message: hand the payload through without copying.
            return Ok(Some(Assembled {
                command: frame.command(),
                msgno: frame.msgno(),
                ansno: frame.ansno(),
                seqno: frame.seqno(),
                payload: frame.payload,
            }));
        };

        if partial.command != frame.command() {
            return Err(BeepError::Protocol(format!(
                "{} frame continues {} message {} on channel {}",
                frame.command(),
                partial.command,
                frame.msgno(),
                frame.channel()
            )));
        }

        partial.buf.extend_from_slice(frame.payload());

        if frame.more() {
            self.partials.insert(key, partial);
            return Ok(None);
        }

        Ok(Some(Assembled {
            command: partial.command,
            msgno: frame.msgno(),
            ansno: frame.ansno(),
            seqno: frame.seqno(),
            payload: partial.buf.freeze(),
        }))
    }

    /// Number of messages still waiting for their final frame.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(command: Command, msgno: u32, more: bool, ansno: Option<u32>, body: &'static [u8]) -> Frame {
        Frame::new(command, 1, msgno, more, 0, ansno, Bytes::from_static(body))
    }

    #[test]
    fn test_single_frame_passes_through() {
        let mut reassembler = Reassembler::new();
        let assembled = reassembler
            .push(frame(Command::Msg, 0, false, None, b"whole"))
            .unwrap()
            .unwrap();

        assert_eq!(assembled.command, Command::Msg);
        assert_eq!(&assembled.payload[..], b"whole");
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_continuations_concatenate() {
        let mut reassembler = Reassembler::new();
        assert!(reassembler
            .push(frame(Command::Rpy, 4, true, None, b"foo "))
            .unwrap()
            .is_none());
        assert_eq!(reassembler.pending(), 1);

        let assembled = reassembler
            .push(frame(Command::Rpy, 4, false, None, b"bar"))
            .unwrap()
            .unwrap();
        assert_eq!(&assembled.payload[..], b"foo bar");
        assert_eq!(assembled.msgno, 4);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_answers_interleave() {
        let mut reassembler = Reassembler::new();
        reassembler
            .push(frame(Command::Ans, 2, true, Some(0), b"a0-"))
            .unwrap();
        reassembler
            .push(frame(Command::Ans, 2, true, Some(1), b"a1-"))
            .unwrap();

        let first = reassembler
            .push(frame(Command::Ans, 2, false, Some(1), b"end"))
            .unwrap()
            .unwrap();
        assert_eq!(first.ansno, Some(1));
        assert_eq!(&first.payload[..], b"a1-end");

        let second = reassembler
            .push(frame(Command::Ans, 2, false, Some(0), b"end"))
            .unwrap()
            .unwrap();
        assert_eq!(second.ansno, Some(0));
        assert_eq!(&second.payload[..], b"a0-end");
    }

    #[test]
    fn test_request_and_reply_with_same_msgno_are_separate() {
        let mut reassembler = Reassembler::new();
        reassembler
            .push(frame(Command::Msg, 0, true, None, b"req"))
            .unwrap();

        let reply = reassembler
            .push(frame(Command::Rpy, 0, false, None, b"rpy"))
            .unwrap()
            .unwrap();
        assert_eq!(&reply.payload[..], b"rpy");
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn test_command_change_is_protocol_error() {
        let mut reassembler = Reassembler::new();
        reassembler
            .push(frame(Command::Rpy, 3, true, None, b"half"))
            .unwrap();

        let err = reassembler
            .push(frame(Command::Err, 3, false, None, b"other"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ERR frame continues RPY"));
    }
}
