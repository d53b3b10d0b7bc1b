//! Wire format encoding and decoding.
//!
//! Every frame is a header line, the payload, and a fixed trailer:
//! ```text
//! MSG 1 7 . 1024 52\r\n      <- command channel msgno more seqno size
//! <52 payload bytes>
//! END\r\n
//!
//! ANS 1 7 * 1076 12 3\r\n    <- ANS frames append the answer number
//! ```
//!
//! `more` is `*` when further frames of the same message follow and `.` on the
//! final frame. Numbers are unsigned decimal without sign or padding.

use std::fmt;

use crate::error::{BeepError, Result};

/// Trailer terminating every frame.
pub const TRAILER: &[u8] = b"END\r\n";

/// Trailer size in bytes.
pub const TRAILER_SIZE: usize = 5;

/// Longest accepted header line, CRLF included.
pub const MAX_HEADER_LINE: usize = 128;

/// Default maximum payload size of a single inbound frame (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Default per-frame payload limit used when segmenting outbound messages.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

/// Largest channel, message, or answer number.
pub const MAX_NUMBER: u32 = 2_147_483_647;

/// Sequence numbers wrap modulo 2^32.
pub const SEQNO_MODULUS: u64 = 1 << 32;

/// Continuation marker: more frames of this message follow.
pub const MORE: u8 = b'*';

/// Completion marker: this frame ends the message.
pub const COMPLETE: u8 = b'.';

/// Frame command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Request.
    Msg,
    /// Positive final reply.
    Rpy,
    /// Negative final reply.
    Err,
    /// One answer of a multi-answer reply.
    Ans,
    /// Terminator of a multi-answer reply.
    Nul,
}

impl Command {
    /// The three-letter token used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Msg => "MSG",
            Command::Rpy => "RPY",
            Command::Err => "ERR",
            Command::Ans => "ANS",
            Command::Nul => "NUL",
        }
    }

    /// Parse a wire token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "MSG" => Some(Command::Msg),
            "RPY" => Some(Command::Rpy),
            "ERR" => Some(Command::Err),
            "ANS" => Some(Command::Ans),
            "NUL" => Some(Command::Nul),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame command.
    pub command: Command,
    /// Channel number.
    pub channel: u32,
    /// Message number.
    pub msgno: u32,
    /// Continuation flag: more frames of this message follow.
    pub more: bool,
    /// Byte offset of this payload within the channel's stream.
    pub seqno: u64,
    /// Payload length in bytes.
    pub size: u32,
    /// Answer number (ANS only).
    pub ansno: Option<u32>,
}

impl Header {
    /// Create a new header.
    pub fn new(
        command: Command,
        channel: u32,
        msgno: u32,
        more: bool,
        seqno: u64,
        size: u32,
        ansno: Option<u32>,
    ) -> Self {
        Self {
            command,
            channel,
            msgno,
            more,
            seqno,
            size,
            ansno,
        }
    }

    /// Encode the header line, CRLF included.
    ///
    /// # Example
    ///
    /// ```
    /// use beepwire::protocol::{Command, Header};
    ///
    /// let header = Header::new(Command::Ans, 1, 7, false, 120, 5, Some(2));
    /// assert_eq!(header.encode(), b"ANS 1 7 . 120 5 2\r\n");
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let more = (if self.more { MORE } else { COMPLETE }) as char;
        let mut line = format!(
            "{} {} {} {} {} {}",
            self.command, self.channel, self.msgno, more, self.seqno, self.size
        );
        if let Some(ansno) = self.ansno {
            line.push(' ');
            line.push_str(&ansno.to_string());
        }
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Decode a header line (without its CRLF).
    ///
    /// # Example
    ///
    /// ```
    /// use beepwire::protocol::{Command, Header};
    ///
    /// let header = Header::decode(b"MSG 0 1 * 52 120").unwrap();
    /// assert_eq!(header.command, Command::Msg);
    /// assert_eq!(header.msgno, 1);
    /// assert!(header.more);
    /// assert_eq!(header.size, 120);
    /// ```
    pub fn decode(line: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(line)
            .map_err(|_| BeepError::Protocol("Header line is not ASCII".to_string()))?;
        let tokens: Vec<&str> = text.split(' ').collect();

        if tokens.len() != 6 && tokens.len() != 7 {
            return Err(malformed(text, "wrong number of fields"));
        }

        let command = Command::parse(tokens[0])
            .ok_or_else(|| malformed(text, "unknown command"))?;
        let channel = parse_number(tokens[1], text)?;
        let msgno = parse_number(tokens[2], text)?;
        let more = match tokens[3].as_bytes() {
            [MORE] => true,
            [COMPLETE] => false,
            _ => return Err(malformed(text, "bad continuation marker")),
        };
        let seqno = parse_number(tokens[4], text)?;
        let size = parse_number(tokens[5], text)?;
        let ansno = match tokens.get(6) {
            Some(token) => Some(parse_number(token, text)?),
            None => None,
        };

        Ok(Self {
            command,
            channel,
            msgno,
            more,
            seqno,
            size,
            ansno,
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Channel, message and answer numbers are in range
    /// - Sequence number is below 2^32
    /// - Answer number is present exactly on ANS frames
    /// - NUL frames are complete and empty
    /// - Payload length doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.channel > MAX_NUMBER || self.msgno > MAX_NUMBER {
            return Err(BeepError::Protocol(format!(
                "Channel {} / msgno {} out of range",
                self.channel, self.msgno
            )));
        }

        if self.seqno >= SEQNO_MODULUS {
            return Err(BeepError::Protocol(format!(
                "Sequence number {} out of range",
                self.seqno
            )));
        }

        match (self.command, self.ansno) {
            (Command::Ans, None) => {
                return Err(BeepError::Protocol(
                    "ANS frame without answer number".to_string(),
                ))
            }
            (Command::Ans, Some(ansno)) if ansno > MAX_NUMBER => {
                return Err(BeepError::Protocol(format!(
                    "Answer number {} out of range",
                    ansno
                )))
            }
            (Command::Ans, Some(_)) => {}
            (command, Some(_)) => {
                return Err(BeepError::Protocol(format!(
                    "{} frame must not carry an answer number",
                    command
                )))
            }
            (_, None) => {}
        }

        if self.command == Command::Nul && (self.more || self.size != 0) {
            return Err(BeepError::Protocol(
                "NUL frame must be complete and empty".to_string(),
            ));
        }

        if self.size > max_payload_size {
            return Err(BeepError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.size, max_payload_size
            )));
        }

        Ok(())
    }
}

fn malformed(line: &str, reason: &str) -> BeepError {
    BeepError::Protocol(format!("Malformed header {:?}: {}", line, reason))
}

fn parse_number<T: std::str::FromStr>(token: &str, line: &str) -> Result<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(line, "expected unsigned number"));
    }
    token
        .parse()
        .map_err(|_| malformed(line, "number too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_msg_header() {
        let header = Header::new(Command::Msg, 0, 1, false, 52, 120, None);
        assert_eq!(header.encode(), b"MSG 0 1 . 52 120\r\n");
    }

    #[test]
    fn test_encode_continuation() {
        let header = Header::new(Command::Rpy, 3, 0, true, 0, 4096, None);
        assert_eq!(header.encode(), b"RPY 3 0 * 0 4096\r\n");
    }

    #[test]
    fn test_decode_ans_header() {
        let header = Header::decode(b"ANS 1 7 . 120 5 2").unwrap();
        assert_eq!(header.command, Command::Ans);
        assert_eq!(header.channel, 1);
        assert_eq!(header.msgno, 7);
        assert!(!header.more);
        assert_eq!(header.seqno, 120);
        assert_eq!(header.size, 5);
        assert_eq!(header.ansno, Some(2));
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let result = Header::decode(b"SEQ 0 1 . 0 0");
        assert!(result.unwrap_err().to_string().contains("unknown command"));
    }

    #[test]
    fn test_decode_rejects_signed_numbers() {
        assert!(Header::decode(b"MSG +1 0 . 0 0").is_err());
        assert!(Header::decode(b"MSG -1 0 . 0 0").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_marker() {
        let result = Header::decode(b"MSG 0 0 x 0 0");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("bad continuation marker"));
    }

    #[test]
    fn test_decode_rejects_field_count() {
        assert!(Header::decode(b"MSG 0 0 .").is_err());
        assert!(Header::decode(b"ANS 0 0 . 0 0 1 9").is_err());
        assert!(Header::decode(b"MSG  0 0 . 0 0").is_err());
    }

    #[test]
    fn test_validate_ansno_placement() {
        let missing = Header::new(Command::Ans, 1, 0, false, 0, 0, None);
        assert!(missing.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let stray = Header::new(Command::Rpy, 1, 0, false, 0, 0, Some(1));
        assert!(stray.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let ok = Header::new(Command::Ans, 1, 0, false, 0, 0, Some(1));
        assert!(ok.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_validate_nul_must_be_empty() {
        let header = Header::new(Command::Nul, 1, 0, false, 0, 3, None);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let header = Header::new(Command::Nul, 1, 0, false, 0, 0, None);
        assert!(header.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let channel = Header::new(Command::Msg, MAX_NUMBER + 1, 0, false, 0, 0, None);
        assert!(channel.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let seqno = Header::new(Command::Msg, 0, 0, false, SEQNO_MODULUS, 0, None);
        assert!(seqno.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_err());

        let max = Header::new(Command::Msg, MAX_NUMBER, MAX_NUMBER, false, SEQNO_MODULUS - 1, 0, None);
        assert!(max.validate(DEFAULT_MAX_PAYLOAD_SIZE).is_ok());
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(Command::Msg, 0, 0, false, 0, 1_000_000, None);
        let result = header.validate(100);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }
}
