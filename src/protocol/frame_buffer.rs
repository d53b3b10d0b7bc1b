//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need a complete CRLF-terminated header line
//! - `WaitingForPayload`: Header parsed, need payload plus `END\r\n` trailer
//!
//! This is the only place where raw stream bytes become frames; everything
//! above it sees whole frames in arrival order.
//!
//! # Example
//!
//! ```
//! use beepwire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in chunks from the socket
//! assert!(buffer.push(b"MSG 1 0 . 0 5\r\nhel").unwrap().is_empty());
//! let frames = buffer.push(b"loEND\r\n").unwrap();
//!
//! assert_eq!(frames[0].payload(), b"hello");
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, MAX_HEADER_LINE, TRAILER, TRAILER_SIZE};
use super::Frame;
use crate::error::{BeepError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header line.
    WaitingForHeader,
    /// Header parsed, waiting for payload and trailer bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Uses a state machine to handle partial reads efficiently.
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 16MB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns a vector of complete frames (may be empty if still waiting for
    /// data). Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a malformed header line, an oversize
    /// payload, or a missing trailer. The stream cannot be resynchronized
    /// after any of these.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();

        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let window = self.buffer.len().min(MAX_HEADER_LINE);
                let Some(line_end) = find_crlf(&self.buffer[..window]) else {
                    if self.buffer.len() >= MAX_HEADER_LINE {
                        return Err(BeepError::Protocol(format!(
                            "Header line exceeds {} bytes",
                            MAX_HEADER_LINE
                        )));
                    }
                    return Ok(None);
                };

                let header = Header::decode(&self.buffer[..line_end])?;
                header.validate(self.max_payload_size)?;

                // Consume header line and CRLF
                let _ = self.buffer.split_to(line_end + 2);

                self.state = State::WaitingForPayload { header };

                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let size = header.size as usize;

                if self.buffer.len() < size + TRAILER_SIZE {
                    return Ok(None);
                }

                if &self.buffer[size..size + TRAILER_SIZE] != TRAILER {
                    return Err(BeepError::Protocol(format!(
                        "Missing END trailer after {} payload bytes on channel {}",
                        size, header.channel
                    )));
                }

                let header = *header;
                let payload = self.buffer.split_to(size).freeze();
                let _ = self.buffer.split_to(TRAILER_SIZE);

                self.state = State::WaitingForHeader;

                Ok(Some(Frame::from_parts(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use bytes::Bytes;

    /// Helper to create a valid frame as bytes.
    fn make_frame_bytes(command: Command, channel: u32, msgno: u32, payload: &[u8]) -> Vec<u8> {
        let ansno = (command == Command::Ans).then_some(0);
        Frame::new(
            command,
            channel,
            msgno,
            false,
            0,
            ansno,
            Bytes::copy_from_slice(payload),
        )
        .encode()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(Command::Msg, 1, 42, b"hello");

        let frames = buffer.push(&frame_bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].channel(), 1);
        assert_eq!(frames[0].msgno(), 42);
        assert_eq!(&frames[0].payload[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = Vec::new();
        combined.extend_from_slice(&make_frame_bytes(Command::Msg, 1, 1, b"first"));
        combined.extend_from_slice(&make_frame_bytes(Command::Rpy, 2, 2, b"second"));
        combined.extend_from_slice(&make_frame_bytes(Command::Ans, 3, 3, b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].command(), Command::Msg);
        assert_eq!(frames[1].command(), Command::Rpy);
        assert_eq!(frames[2].command(), Command::Ans);
        assert_eq!(frames[2].ansno(), Some(0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(Command::Msg, 1, 42, b"test");

        let frames = buffer.push(&frame_bytes[..5]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&frame_bytes[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msgno(), 42);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_header_split_inside_crlf() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(Command::Msg, 1, 0, b"x");
        let cr = frame_bytes.iter().position(|&b| b == b'\r').unwrap();

        assert!(buffer.push(&frame_bytes[..=cr]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&frame_bytes[cr + 1..]).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let payload = b"this is a longer payload that will be fragmented";
        let frame_bytes = make_frame_bytes(Command::Msg, 1, 42, payload);
        let header_len = frame_bytes.iter().position(|&b| b == b'\n').unwrap() + 1;

        let partial_len = header_len + 10;
        let frames = buffer.push(&frame_bytes[..partial_len]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let frames = buffer.push(&frame_bytes[partial_len..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], payload);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_waits_for_trailer() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(Command::Rpy, 0, 0, b"ok");

        let frames = buffer.push(&frame_bytes[..frame_bytes.len() - 2]).unwrap();
        assert!(frames.is_empty());

        let frames = buffer.push(&frame_bytes[frame_bytes.len() - 2..]).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"NUL 1 3 . 16 0\r\nEND\r\n").unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), Command::Nul);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_bad_trailer_rejected() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(b"MSG 1 0 . 0 2\r\nhiEDN\r\n");

        assert!(result.unwrap_err().to_string().contains("Missing END trailer"));
    }

    #[test]
    fn test_max_payload_validation() {
        let mut buffer = FrameBuffer::with_max_payload(100);
        let result = buffer.push(b"MSG 1 0 . 0 1000\r\n");

        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unterminated_header_rejected() {
        let mut buffer = FrameBuffer::new();
        let garbage = vec![b'A'; MAX_HEADER_LINE];

        let result = buffer.push(&garbage);
        assert!(result.unwrap_err().to_string().contains("Header line exceeds"));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(Command::Msg, 1, 42, b"hi");

        let mut all_frames = Vec::new();
        for byte in &frame_bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(&all_frames[0].payload[..], b"hi");
    }

    #[test]
    fn test_payload_may_contain_crlf_and_trailer_text() {
        let mut buffer = FrameBuffer::new();
        let payload = b"line\r\nEND\r\nmore";
        let frames = buffer
            .push(&make_frame_bytes(Command::Msg, 1, 0, payload))
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], payload);
    }
}
