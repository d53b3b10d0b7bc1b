//! Content-typed messages carried by one or more frames.
//!
//! A message payload is an optional block of entity headers, an empty line,
//! and the body:
//!
//! ```text
//! Content-Type: application/beep+json\n
//! \n
//! {"ok":null}
//! ```
//!
//! The default content type is never written, so a plain message is just the
//! empty line followed by the body.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// Content type assumed when a payload carries no `Content-Type` header.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type of management documents on channel 0.
pub const BEEP_JSON: &str = "application/beep+json";

/// Content type of MsgPack-encoded application bodies.
pub const MSGPACK: &str = "application/msgpack";

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// A logical message: content type plus opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content_type: String,
    body: Bytes,
}

impl Message {
    /// Create a message with the default content type.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            body: body.into(),
        }
    }

    /// Create a message with an explicit content type.
    pub fn with_content_type(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Create a message whose body is `value` encoded as MsgPack.
    pub fn msgpack<T: Serialize>(value: &T) -> Result<Self> {
        let body = MsgPackCodec::encode(value)?;
        Ok(Self::with_content_type(MSGPACK, body))
    }

    /// Decode a MsgPack body.
    pub fn decode_msgpack<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.body)
    }

    /// The content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Serialize to a frame payload.
    ///
    /// # Example
    ///
    /// ```
    /// use beepwire::Message;
    ///
    /// assert_eq!(&Message::new("foo bar").to_payload()[..], b"\nfoo bar");
    /// ```
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.body.len() + 64);
        if self.content_type != DEFAULT_CONTENT_TYPE {
            buf.put_slice(CONTENT_TYPE_HEADER.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(self.content_type.as_bytes());
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Parse a reassembled payload.
    ///
    /// Payloads without a recognizable header block are taken whole as the
    /// body, so raw peers interoperate.
    pub fn from_payload(payload: Bytes) -> Self {
        if payload.starts_with(b"\r\n") {
            return Self::new(payload.slice(2..));
        }
        if payload.starts_with(b"\n") {
            return Self::new(payload.slice(1..));
        }

        let Some((block_end, body_start)) = find_empty_line(&payload) else {
            return Self::new(payload);
        };

        let Some(content_type) = parse_entity_headers(&payload[..block_end]) else {
            return Self::new(payload);
        };

        Self {
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: payload.slice(body_start..),
        }
    }
}

/// Locate the empty line ending the header block.
///
/// Returns (end of header block, start of body).
fn find_empty_line(payload: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, &b) in payload.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &payload[line_start..i];
        if line.is_empty() || line == b"\r" {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}

/// Parse `Name: value` lines; `None` when the block is not a header block.
fn parse_entity_headers(block: &[u8]) -> Option<Option<String>> {
    let text = std::str::from_utf8(block).ok()?;
    let mut content_type = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':')?;
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return None;
        }
        if name.eq_ignore_ascii_case(CONTENT_TYPE_HEADER) {
            content_type = Some(value.trim().to_string());
        }
    }

    Some(content_type)
}

impl From<&'static str> for Message {
    fn from(body: &'static str) -> Self {
        Message::new(body)
    }
}
