//! Sessions: the channel table, channel 0, and the outbound frame queue.
//!
//! A [`Session`] is a synchronous state machine. Inbound frames go in
//! through [`Session::handle_frame`]; every frame produced in response, or
//! by the application's own sends, is queued and taken out with
//! [`Session::drain_outbound`]. The connection driver in
//! [`crate::connection`] binds both ends to a byte stream.
//!
//! # Example
//!
//! ```
//! use beepwire::profile::{ChannelContext, Profile};
//! use beepwire::{Message, Result, Role, Session};
//!
//! struct Echo;
//!
//! impl Profile for Echo {
//!     fn handle_msg(&mut self, ctx: &mut ChannelContext<'_>, msgno: u32, message: Message) -> Result<()> {
//!         ctx.send_rpy(msgno, message);
//!         Ok(())
//!     }
//! }
//!
//! let mut session = Session::builder(Role::Listener)
//!     .profile("http://example.com/echo", || Echo)
//!     .build()?;
//!
//! // The greeting is queued as soon as the session exists.
//! let greeting = session.drain_outbound();
//! assert_eq!(greeting.len(), 1);
//! assert_eq!(greeting[0].channel(), 0);
//! # Ok::<(), beepwire::BeepError>(())
//! ```

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info};

use crate::channel::{Channel, ChannelState, Counter};
use crate::error::{BeepError, Result};
use crate::message::Message;
use crate::profile::{
    ChannelContext, CloseRequest, Control, Handler, ManagementProfile, Profile, ProfileRegistry,
    StartRequest,
};
use crate::protocol::{Frame, DEFAULT_MAX_FRAME_SIZE, MAX_NUMBER};

/// Which end of the connection a session is.
///
/// The role fixes the parity of the channel numbers the session proposes,
/// so two peers starting channels at the same time never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the connection; proposes odd channel numbers.
    Initiator,
    /// Accepted the connection; proposes even channel numbers.
    Listener,
}

impl Role {
    fn channel_numbers(self) -> Counter {
        match self {
            Role::Initiator => Counter::new(1, MAX_NUMBER, 2),
            Role::Listener => Counter::new(2, MAX_NUMBER, 2),
        }
    }
}

/// Application hooks on session-level events.
pub trait SessionListener: Send {
    /// The peer's greeting arrived, advertising `profiles`.
    ///
    /// `control` can start channels right away.
    fn greeting_received(&mut self, control: &mut Control<'_>, profiles: &[String]) -> Result<()> {
        let _ = (control, profiles);
        Ok(())
    }
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

/// Frames queued for the transport, in send order.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    frames: VecDeque<Frame>,
}

impl Outbox {
    /// The sink every channel emits through.
    pub(crate) fn send_data_frame(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub(crate) fn drain(&mut self) -> Vec<Frame> {
        self.frames.drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Session state shared by every channel.
pub(crate) struct SessionCore {
    pub(crate) outbox: Outbox,
    pub(crate) channel_numbers: Counter,
    pub(crate) registry: ProfileRegistry,
    pub(crate) max_frame_size: usize,
    pub(crate) peer_profiles: Option<Vec<String>>,
    pub(crate) closed: bool,
}

/// What a channel can reach while it handles a frame.
///
/// The dispatching channel itself is out of `channels` for the duration.
pub(crate) struct SessionParts<'a> {
    pub(crate) core: &'a mut SessionCore,
    pub(crate) channels: &'a mut BTreeMap<u32, Channel>,
    pub(crate) listener: &'a mut dyn SessionListener,
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    role: Role,
    registry: ProfileRegistry,
    listener: Box<dyn SessionListener>,
    max_frame_size: usize,
}

impl SessionBuilder {
    /// Create a builder for a session playing `role`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            registry: ProfileRegistry::new(),
            listener: Box::new(NoopListener),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Register a profile the session can run, advertised in the greeting.
    pub fn profile<F, P>(mut self, uri: &str, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Profile + 'static,
    {
        self.registry.register(uri, factory);
        self
    }

    /// Set the session listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: SessionListener + 'static,
    {
        self.listener = Box::new(listener);
        self
    }

    /// Set the largest payload put in one outbound frame.
    ///
    /// Longer messages are split into continuation frames.
    /// Default: 4096
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Build the session and queue its greeting.
    pub fn build(self) -> Result<Session> {
        Session::new(self)
    }
}

/// A multiplexed session over one ordered byte stream.
pub struct Session {
    role: Role,
    channels: BTreeMap<u32, Channel>,
    core: SessionCore,
    listener: Box<dyn SessionListener>,
}

impl Session {
    /// Create a session builder.
    pub fn builder(role: Role) -> SessionBuilder {
        SessionBuilder::new(role)
    }

    fn new(builder: SessionBuilder) -> Result<Self> {
        let SessionBuilder {
            role,
            registry,
            listener,
            max_frame_size,
        } = builder;

        let mut core = SessionCore {
            outbox: Outbox::default(),
            channel_numbers: role.channel_numbers(),
            registry,
            max_frame_size,
            peer_profiles: None,
            closed: false,
        };

        let mut management = Channel::new(
            0,
            Handler::Management(ManagementProfile::new()),
            max_frame_size,
        );
        management.connect(&mut core)?;

        let mut channels = BTreeMap::new();
        channels.insert(0, management);

        debug!(role = ?role, "session created");
        Ok(Self {
            role,
            channels,
            core,
            listener,
        })
    }

    /// Role this session plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Dispatch one inbound frame to its channel.
    ///
    /// Errors for which [`BeepError::is_fatal`] holds mean the session can
    /// no longer be trusted and must be terminated.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        if self.core.closed {
            return Err(BeepError::SessionClosed);
        }
        frame.header.validate(u32::MAX)?;

        let number = frame.channel();
        let mut channel = self
            .channels
            .remove(&number)
            .ok_or(BeepError::UnknownChannel(number))?;

        let parts = SessionParts {
            core: &mut self.core,
            channels: &mut self.channels,
            listener: self.listener.as_mut(),
        };
        let result = channel.handle_data_frame(frame, parts);
        self.channels.insert(number, channel);
        result
    }

    /// Take every frame queued for the transport.
    pub fn drain_outbound(&mut self) -> Vec<Frame> {
        self.core.outbox.drain()
    }

    /// Whether frames are waiting for the transport.
    pub fn has_outbound(&self) -> bool {
        !self.core.outbox.is_empty()
    }

    /// Ask the peer to open a channel. See [`Control::start`].
    pub fn start(&mut self, request: StartRequest) -> Result<u32> {
        self.control(|control| control.start(request))
    }

    /// Ask the peer to close a channel. See [`Control::close`].
    pub fn close(&mut self, request: CloseRequest) -> Result<()> {
        self.control(|control| control.close(request))
    }

    /// Send a MSG on `channel`, returning its message number.
    pub fn send_msg(&mut self, channel: u32, message: Message) -> Result<u32> {
        self.on_channel(channel, |ctx| ctx.send_msg(message))
    }

    /// Reply positively to the peer's MSG `msgno` on `channel`.
    pub fn send_rpy(&mut self, channel: u32, msgno: u32, message: Message) -> Result<()> {
        self.on_channel(channel, |ctx| ctx.send_rpy(msgno, message))
    }

    /// Reply negatively to the peer's MSG `msgno` on `channel`.
    pub fn send_err(&mut self, channel: u32, msgno: u32, message: Message) -> Result<()> {
        self.on_channel(channel, |ctx| ctx.send_err(msgno, message))
    }

    /// Send one answer to the peer's MSG `msgno`, returning its answer number.
    pub fn send_ans(&mut self, channel: u32, msgno: u32, message: Message) -> Result<u32> {
        self.on_channel(channel, |ctx| ctx.send_ans(msgno, message))
    }

    /// End the answers to the peer's MSG `msgno`.
    pub fn send_nul(&mut self, channel: u32, msgno: u32) -> Result<()> {
        self.on_channel(channel, |ctx| ctx.send_nul(msgno))
    }

    /// Reply with ERR carrying an `error` document.
    pub fn send_error(&mut self, channel: u32, msgno: u32, code: u16, text: &str) -> Result<()> {
        self.on_channel(channel, |ctx| ctx.send_error(msgno, code, text))?
    }

    /// Numbering and sequencing state of an open channel.
    pub fn channel(&self, number: u32) -> Option<&ChannelState> {
        self.channels.get(&number).map(Channel::state)
    }

    /// Numbers of all open channels, including 0.
    pub fn channel_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.keys().copied()
    }

    /// Profiles the peer advertised, once its greeting has arrived.
    pub fn peer_profiles(&self) -> Option<&[String]> {
        self.core.peer_profiles.as_deref()
    }

    /// Whether the session was closed or terminated.
    pub fn is_closed(&self) -> bool {
        self.core.closed
    }

    /// Tear the session down without negotiation.
    ///
    /// Every channel is disconnected, pending management requests fail
    /// with code 421, and queued frames are dropped.
    pub fn terminate(&mut self) {
        let channels = std::mem::take(&mut self.channels);
        // Data channels first, channel 0 last.
        for (_, mut channel) in channels.into_iter().rev() {
            channel.disconnect();
        }
        self.core.outbox.clear();
        self.core.closed = true;
        info!("session terminated");
    }

    fn on_channel<R>(
        &mut self,
        number: u32,
        f: impl FnOnce(&mut ChannelContext<'_>) -> R,
    ) -> Result<R> {
        if self.core.closed {
            return Err(BeepError::SessionClosed);
        }
        let channel = self
            .channels
            .get_mut(&number)
            .ok_or(BeepError::ChannelNotOpen(number))?;
        let mut ctx = ChannelContext::new(channel.state_mut(), &mut self.core.outbox);
        Ok(f(&mut ctx))
    }

    fn control<R>(&mut self, f: impl FnOnce(&mut Control<'_>) -> Result<R>) -> Result<R> {
        let mut channel = self.channels.remove(&0).ok_or(BeepError::SessionClosed)?;
        let result = match channel.management_mut() {
            Some((state, management)) => f(&mut Control::new(
                management,
                state,
                &mut self.core,
                &mut self.channels,
            )),
            None => Err(BeepError::Protocol(
                "channel 0 is not bound to the management profile".to_string(),
            )),
        };
        self.channels.insert(0, channel);
        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("profiles", &self.core.registry)
            .field("closed", &self.core.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::profile::Document;
    use crate::protocol::Command;

    struct Sink;

    impl Profile for Sink {
        fn handle_msg(&mut self, _ctx: &mut ChannelContext<'_>, _msgno: u32, _message: Message) -> Result<()> {
            Ok(())
        }
    }

    fn document(frame: &Frame) -> Document {
        Document::from_message(&Message::from_payload(frame.payload.clone())).unwrap()
    }

    #[test]
    fn test_greeting_is_queued_on_build() {
        let mut session = Session::builder(Role::Listener)
            .profile("test", || Sink)
            .build()
            .unwrap();

        let frames = session.drain_outbound();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), Command::Rpy);
        assert_eq!((frames[0].channel(), frames[0].msgno(), frames[0].seqno()), (0, 0, 0));
        assert_eq!(
            document(&frames[0]),
            Document::Greeting {
                profiles: vec![crate::profile::ProfileRef::new("test")]
            }
        );
        assert!(!session.has_outbound());
    }

    #[test]
    fn test_unknown_channel_is_fatal() {
        let mut session = Session::builder(Role::Initiator).build().unwrap();
        let frame = Frame::new(Command::Msg, 7, 0, false, 0, None, Bytes::from_static(b"\nhi"));

        let err = session.handle_frame(frame).unwrap_err();
        assert!(matches!(err, BeepError::UnknownChannel(7)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_start_uses_role_parity() {
        let mut initiator = Session::builder(Role::Initiator)
            .profile("test", || Sink)
            .build()
            .unwrap();
        let mut listener = Session::builder(Role::Listener)
            .profile("test", || Sink)
            .build()
            .unwrap();

        assert_eq!(initiator.start(StartRequest::new(["test"])).unwrap(), 1);
        assert_eq!(initiator.start(StartRequest::new(["test"])).unwrap(), 3);
        assert_eq!(listener.start(StartRequest::new(["test"])).unwrap(), 2);
    }

    #[test]
    fn test_start_request_document() {
        let mut session = Session::builder(Role::Initiator)
            .profile("test", || Sink)
            .build()
            .unwrap();
        session.drain_outbound();

        let number = session.start(StartRequest::new(["test"])).unwrap();
        let frames = session.drain_outbound();

        assert_eq!(frames[0].command(), Command::Msg);
        assert_eq!(frames[0].msgno(), 0);
        assert_eq!(
            document(&frames[0]),
            Document::Start {
                number,
                profiles: vec![crate::profile::ProfileRef::new("test")]
            }
        );
        assert!(session.channel(0).unwrap().is_outstanding(0));
    }

    #[test]
    fn test_start_unregistered_profile() {
        let mut session = Session::builder(Role::Initiator).build().unwrap();
        let err = session.start(StartRequest::new(["missing"])).unwrap_err();
        assert!(matches!(err, BeepError::UnknownProfile(uri) if uri == "missing"));
    }

    #[test]
    fn test_start_without_profiles_is_rejected() {
        let mut session = Session::builder(Role::Initiator)
            .profile("test", || Sink)
            .build()
            .unwrap();
        session.drain_outbound();

        let err = session.start(StartRequest::new(Vec::<String>::new())).unwrap_err();
        assert!(matches!(err, BeepError::InvalidRequest(_)));
        assert!(!err.is_fatal());
        assert!(!session.has_outbound());
        assert_eq!(session.channel(0).unwrap().outstanding().count(), 0);
    }

    #[test]
    fn test_close_of_unopened_channel_fails_locally() {
        let mut session = Session::builder(Role::Initiator).build().unwrap();
        session.drain_outbound();

        let failure = Arc::new(Mutex::new(None));
        let seen = failure.clone();
        session
            .close(CloseRequest::new(5).on_error(move |code, text| {
                *seen.lock().unwrap() = Some((code, text.to_string()));
            }))
            .unwrap();

        assert_eq!(
            failure.lock().unwrap().clone(),
            Some((550, "channel 5 is not open".to_string()))
        );
        assert!(!session.has_outbound());
    }

    #[test]
    fn test_send_on_unopened_channel() {
        let mut session = Session::builder(Role::Initiator).build().unwrap();
        let err = session.send_msg(9, Message::new("x")).unwrap_err();
        assert!(matches!(err, BeepError::ChannelNotOpen(9)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_terminate_fails_pending_requests() {
        let mut session = Session::builder(Role::Initiator)
            .profile("test", || Sink)
            .build()
            .unwrap();

        let failure = Arc::new(Mutex::new(None));
        let seen = failure.clone();
        session
            .start(StartRequest::new(["test"]).on_error(move |code, _| {
                *seen.lock().unwrap() = Some(code);
            }))
            .unwrap();

        session.terminate();

        assert!(session.is_closed());
        assert_eq!(*failure.lock().unwrap(), Some(421));
        assert_eq!(session.channel_numbers().count(), 0);
        assert!(!session.has_outbound());
        assert!(matches!(
            session.start(StartRequest::new(["test"])),
            Err(BeepError::SessionClosed)
        ));
    }
}
