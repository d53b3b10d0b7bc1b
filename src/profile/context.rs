//! Channel context for profiles.
//!
//! Provides the send operations of the channel a profile is bound to:
//! - `send_msg` - start an exchange, returns the message number
//! - `send_rpy` / `send_err` - final reply to a peer MSG
//! - `send_ans` / `send_nul` - one-to-many replies and their terminator
//! - `send_error` - ERR carrying an `error` document
//!
//! # Example
//!
//! ```
//! use beepwire::profile::{ChannelContext, Profile};
//! use beepwire::{Message, Result};
//!
//! struct Echo;
//!
//! impl Profile for Echo {
//!     fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
//!         ctx.send_rpy(msgno, message);
//!         Ok(())
//!     }
//! }
//! ```

use crate::channel::ChannelState;
use crate::error::Result;
use crate::message::Message;
use crate::session::Outbox;

use super::Document;

/// Handle on one channel, passed to every profile callback.
///
/// Frames produced through the context are queued on the session and
/// written out once the callback returns.
pub struct ChannelContext<'a> {
    channel: &'a mut ChannelState,
    outbox: &'a mut Outbox,
}

impl<'a> ChannelContext<'a> {
    pub(crate) fn new(channel: &'a mut ChannelState, outbox: &'a mut Outbox) -> Self {
        Self { channel, outbox }
    }

    /// Channel number.
    #[inline]
    pub fn number(&self) -> u32 {
        self.channel.number()
    }

    /// Numbering and sequencing state of the channel.
    pub fn state(&self) -> &ChannelState {
        self.channel
    }

    /// Send a MSG, returning its message number.
    pub fn send_msg(&mut self, message: Message) -> u32 {
        self.channel.send_msg(&message, self.outbox)
    }

    /// Reply positively to the peer's MSG `msgno`.
    pub fn send_rpy(&mut self, msgno: u32, message: Message) {
        self.channel.send_rpy(msgno, &message, self.outbox);
    }

    /// Reply negatively to the peer's MSG `msgno`.
    pub fn send_err(&mut self, msgno: u32, message: Message) {
        self.channel.send_err(msgno, &message, self.outbox);
    }

    /// Send one answer to the peer's MSG `msgno`, returning its answer number.
    pub fn send_ans(&mut self, msgno: u32, message: Message) -> u32 {
        self.channel.send_ans(msgno, &message, self.outbox)
    }

    /// End the answers to the peer's MSG `msgno`.
    pub fn send_nul(&mut self, msgno: u32) {
        self.channel.send_nul(msgno, self.outbox);
    }

    /// Reply with ERR carrying an `error` document.
    pub fn send_error(&mut self, msgno: u32, code: u16, text: &str) -> Result<()> {
        let message = Document::error(code, text).to_message()?;
        self.send_err(msgno, message);
        Ok(())
    }
}
