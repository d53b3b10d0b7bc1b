//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use beepwire::protocol::{Command, Frame};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Command::Msg, 1, 0, false, 0, None, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.channel(), 1);
//! assert_eq!(frame.payload(), b"hello");
//! assert_eq!(frame.header.size, 5);
//! ```

use bytes::Bytes;

use super::wire_format::{Command, Header, TRAILER};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, deriving the header's size from the payload.
    pub fn new(
        command: Command,
        channel: u32,
        msgno: u32,
        more: bool,
        seqno: u64,
        ansno: Option<u32>,
        payload: Bytes,
    ) -> Self {
        let header = Header::new(
            command,
            channel,
            msgno,
            more,
            seqno,
            payload.len() as u32,
            ansno,
        );
        Self { header, payload }
    }

    /// Create a frame from a decoded header and its payload.
    pub fn from_parts(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the command.
    #[inline]
    pub fn command(&self) -> Command {
        self.header.command
    }

    /// Get the channel number.
    #[inline]
    pub fn channel(&self) -> u32 {
        self.header.channel
    }

    /// Get the message number.
    #[inline]
    pub fn msgno(&self) -> u32 {
        self.header.msgno
    }

    /// Check if more frames of this message follow.
    #[inline]
    pub fn more(&self) -> bool {
        self.header.more
    }

    /// Get the sequence number.
    #[inline]
    pub fn seqno(&self) -> u64 {
        self.header.seqno
    }

    /// Get the answer number (ANS frames only).
    #[inline]
    pub fn ansno(&self) -> Option<u32> {
        self.header.ansno
    }

    /// Encode the whole frame (header line, payload, trailer) into one buffer.
    ///
    /// The writer task avoids this copy by writing the three parts vectored.
    pub fn encode(&self) -> Vec<u8> {
        let header = self.header.encode();
        let mut buf = Vec::with_capacity(header.len() + self.payload.len() + TRAILER.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(TRAILER);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(
            Command::Ans,
            3,
            7,
            true,
            120,
            Some(2),
            Bytes::from_static(b"hello"),
        );

        assert_eq!(frame.command(), Command::Ans);
        assert_eq!(frame.channel(), 3);
        assert_eq!(frame.msgno(), 7);
        assert!(frame.more());
        assert_eq!(frame.seqno(), 120);
        assert_eq!(frame.ansno(), Some(2));
        assert_eq!(frame.payload_len(), 5);
        assert_eq!(frame.header.size, 5);
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::new(Command::Nul, 1, 0, false, 16, None, Bytes::new());
        assert_eq!(frame.header.size, 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(
            Command::Rpy,
            0,
            0,
            false,
            8,
            None,
            Bytes::from_static(b"nil"),
        );
        assert_eq!(frame.encode(), b"RPY 0 0 . 8 3\r\nnilEND\r\n");
    }

    #[test]
    fn test_encode_parses_back() {
        use super::super::FrameBuffer;

        let frame = Frame::new(
            Command::Msg,
            5,
            9,
            true,
            4096,
            None,
            Bytes::from_static(b"0123456789"),
        );

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame.encode()).unwrap();

        assert_eq!(frames, vec![frame]);
    }
}
