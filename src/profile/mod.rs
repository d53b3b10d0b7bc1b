//! Profiles - the per-channel message handlers.
//!
//! Provides:
//! - [`Profile`] - callbacks for each kind of completed message
//! - [`ChannelContext`] - send operations on the profile's channel
//! - [`ProfileRegistry`] - maps profile URIs to factories
//! - [`Document`] - management documents spoken on channel 0
//!
//! Channel 0 always runs the built-in management profile; every other
//! channel runs an instance created from the registry when it starts.

mod context;
mod document;
mod management;
mod registry;

pub use context::ChannelContext;
pub use document::{reply_code, Document, ProfileRef};
pub use management::{CloseRequest, Control, StartRequest};
pub use registry::{ProfileFactory, ProfileRegistry};

pub(crate) use management::ManagementProfile;

use tracing::debug;

use crate::channel::{Assembled, ChannelState};
use crate::error::{BeepError, Result};
use crate::message::Message;
use crate::protocol::Command;
use crate::session::{SessionCore, SessionParts};

/// Message handler bound to one channel.
///
/// Only `handle_msg` is required; the reply callbacks default to logging
/// and discarding what arrives. Returning a fatal error from a callback
/// ends the session.
pub trait Profile: Send {
    /// Called once when the channel opens, before any message is delivered.
    fn connect(&mut self, ctx: &mut ChannelContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Called once when the channel is removed from the session.
    fn disconnect(&mut self, channel: u32) {
        let _ = channel;
    }

    /// A complete MSG from the peer.
    fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()>;

    /// A positive reply to one of our MSGs.
    fn handle_rpy(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
        debug!(channel = ctx.number(), msgno, size = message.body().len(), "RPY ignored");
        Ok(())
    }

    /// A negative reply to one of our MSGs.
    fn handle_err(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
        debug!(channel = ctx.number(), msgno, size = message.body().len(), "ERR ignored");
        Ok(())
    }

    /// One answer to one of our MSGs.
    fn handle_ans(
        &mut self,
        ctx: &mut ChannelContext<'_>,
        msgno: u32,
        ansno: u32,
        message: Message,
    ) -> Result<()> {
        debug!(
            channel = ctx.number(),
            msgno,
            ansno,
            size = message.body().len(),
            "ANS ignored"
        );
        Ok(())
    }

    /// The end of the answers to one of our MSGs.
    fn handle_nul(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32) -> Result<()> {
        debug!(channel = ctx.number(), msgno, "NUL ignored");
        Ok(())
    }
}

/// What a channel dispatches completed messages to.
pub(crate) enum Handler {
    /// Channel 0.
    Management(ManagementProfile),
    /// Any other channel.
    Profile(Box<dyn Profile>),
}

impl Handler {
    pub(crate) fn connect(&mut self, channel: &mut ChannelState, core: &mut SessionCore) -> Result<()> {
        match self {
            Handler::Management(management) => management.connect(channel, core),
            Handler::Profile(profile) => {
                profile.connect(&mut ChannelContext::new(channel, &mut core.outbox))
            }
        }
    }

    pub(crate) fn disconnect(&mut self, number: u32) {
        match self {
            Handler::Management(management) => management.disconnect(),
            Handler::Profile(profile) => profile.disconnect(number),
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        channel: &mut ChannelState,
        parts: SessionParts<'_>,
        assembled: Assembled,
    ) -> Result<()> {
        let Assembled {
            command,
            msgno,
            ansno,
            payload,
            ..
        } = assembled;
        let message = Message::from_payload(payload);

        let profile = match self {
            Handler::Management(management) => {
                return management.handle(channel, parts, command, msgno, message);
            }
            Handler::Profile(profile) => profile,
        };

        let mut ctx = ChannelContext::new(channel, &mut parts.core.outbox);
        match command {
            Command::Msg => profile.handle_msg(&mut ctx, msgno, message),
            Command::Rpy => profile.handle_rpy(&mut ctx, msgno, message),
            Command::Err => profile.handle_err(&mut ctx, msgno, message),
            Command::Ans => {
                let ansno = ansno.ok_or_else(|| {
                    BeepError::Protocol(format!("ANS {msgno} without answer number"))
                })?;
                profile.handle_ans(&mut ctx, msgno, ansno, message)
            }
            Command::Nul => profile.handle_nul(&mut ctx, msgno),
        }
    }
}
