//! Management documents exchanged on channel 0.
//!
//! Documents are externally tagged JSON objects carried in messages of type
//! `application/beep+json`:
//!
//! ```text
//! {"greeting":{"profiles":[{"uri":"http://example.com/echo"}]}}
//! {"start":{"number":1,"profiles":[{"uri":"http://example.com/echo"}]}}
//! {"profile":{"uri":"http://example.com/echo"}}
//! {"close":{"number":1,"code":200}}
//! "ok"
//! {"error":{"code":550,"text":"no acceptable profile"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::message::{Message, BEEP_JSON};

/// Reply codes used in `error` documents and `close` requests.
pub mod reply_code {
    /// Success.
    pub const SUCCESS: u16 = 200;
    /// Service not available.
    pub const SERVICE_NOT_AVAILABLE: u16 = 421;
    /// General syntax error, such as a malformed document.
    pub const SYNTAX_ERROR: u16 = 500;
    /// Syntax error in parameters, or an unexpected document.
    pub const PARAMETER_ERROR: u16 = 501;
    /// Requested action not taken, such as an unsupported profile.
    pub const ACTION_NOT_TAKEN: u16 = 550;
    /// Parameter invalid, such as an unavailable channel number.
    pub const PARAMETER_INVALID: u16 = 553;
    /// Transaction failed.
    pub const TRANSACTION_FAILED: u16 = 554;
}

/// A profile named by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    /// Profile URI.
    pub uri: String,
}

impl ProfileRef {
    /// Wrap a URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// A channel-management document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Document {
    /// Sent by each peer as RPY 0 when the session opens.
    Greeting {
        /// Profiles the sender can serve.
        #[serde(default)]
        profiles: Vec<ProfileRef>,
    },
    /// Request to open channel `number` with one of `profiles`.
    Start {
        /// Requested channel number.
        number: u32,
        /// Candidate profiles in order of preference.
        profiles: Vec<ProfileRef>,
    },
    /// Request to close channel `number`.
    Close {
        /// Channel to close; 0 closes the session.
        number: u32,
        /// Reason code.
        code: u16,
    },
    /// Positive reply to `start`, naming the selected profile.
    Profile(ProfileRef),
    /// Positive reply to `close`.
    Ok,
    /// Negative reply.
    Error {
        /// Reply code.
        code: u16,
        /// Human-readable explanation.
        #[serde(default)]
        text: String,
    },
}

impl Document {
    /// Build an `error` document.
    pub fn error(code: u16, text: impl Into<String>) -> Self {
        Document::Error {
            code,
            text: text.into(),
        }
    }

    /// Element name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Document::Greeting { .. } => "greeting",
            Document::Start { .. } => "start",
            Document::Close { .. } => "close",
            Document::Profile(_) => "profile",
            Document::Ok => "ok",
            Document::Error { .. } => "error",
        }
    }

    /// Serialize into an `application/beep+json` message.
    pub fn to_message(&self) -> Result<Message> {
        let body = JsonCodec::encode(self)?;
        Ok(Message::with_content_type(BEEP_JSON, body))
    }

    /// Parse a message body.
    ///
    /// The content type is not checked, so peers that omit the entity header
    /// still interoperate.
    pub fn from_message(message: &Message) -> Result<Self> {
        JsonCodec::decode(message.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(document: &Document) -> String {
        String::from_utf8(JsonCodec::encode(document).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_greeting() {
        let greeting = Document::Greeting { profiles: vec![] };
        assert_eq!(json(&greeting), r#"{"greeting":{"profiles":[]}}"#);
    }

    #[test]
    fn test_greeting_lists_profiles() {
        let greeting = Document::Greeting {
            profiles: vec![ProfileRef::new("test")],
        };
        assert_eq!(
            json(&greeting),
            r#"{"greeting":{"profiles":[{"uri":"test"}]}}"#
        );
    }

    #[test]
    fn test_ok_is_bare_string() {
        assert_eq!(json(&Document::Ok), r#""ok""#);
    }

    #[test]
    fn test_parse_start() {
        let document: Document = JsonCodec::decode(
            br#"{"start":{"number":3,"profiles":[{"uri":"a"},{"uri":"b"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            document,
            Document::Start {
                number: 3,
                profiles: vec![ProfileRef::new("a"), ProfileRef::new("b")],
            }
        );
    }

    #[test]
    fn test_parse_error_without_text() {
        let document: Document = JsonCodec::decode(br#"{"error":{"code":550}}"#).unwrap();
        assert_eq!(document, Document::error(550, ""));
    }

    #[test]
    fn test_message_carries_content_type() {
        let message = Document::Close { number: 1, code: 200 }.to_message().unwrap();
        assert_eq!(message.content_type(), BEEP_JSON);

        let parsed = Message::from_payload(message.to_payload());
        assert_eq!(
            Document::from_message(&parsed).unwrap(),
            Document::Close { number: 1, code: 200 }
        );
    }

    #[test]
    fn test_unknown_document_is_rejected() {
        let message = Message::new(r#"{"bogus":{}}"#);
        assert!(Document::from_message(&message).is_err());
    }
}
