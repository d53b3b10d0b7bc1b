//! The management profile bound to channel 0.
//!
//! Channel 0 carries the greeting and the start/close exchanges that open
//! and close every other channel. Local requests are recorded by message
//! number until the peer replies; the reply then runs the request's success
//! or error continuation.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelState};
use crate::error::{BeepError, Result};
use crate::message::Message;
use crate::protocol::{Command, MAX_NUMBER};
use crate::session::{SessionCore, SessionListener, SessionParts};

use super::document::reply_code::{
    ACTION_NOT_TAKEN, PARAMETER_ERROR, PARAMETER_INVALID, SERVICE_NOT_AVAILABLE, SUCCESS,
    SYNTAX_ERROR, TRANSACTION_FAILED,
};
use super::{Document, Handler, ProfileRef};

type StartSuccess = Box<dyn FnOnce(u32, &str) + Send>;
type CloseSuccess = Box<dyn FnOnce() + Send>;
type ErrorContinuation = Box<dyn FnOnce(u16, &str) + Send>;

/// Request to open a channel with one of several profiles.
///
/// # Example
///
/// ```
/// use beepwire::profile::StartRequest;
///
/// let request = StartRequest::new(["http://example.com/echo"])
///     .on_success(|channel, uri| println!("channel {channel} runs {uri}"))
///     .on_error(|code, text| eprintln!("refused: {code} {text}"));
/// # let _ = request;
/// ```
pub struct StartRequest {
    profiles: Vec<String>,
    on_success: Option<StartSuccess>,
    on_error: Option<ErrorContinuation>,
}

impl StartRequest {
    /// Request any of `profiles`, most preferred first.
    pub fn new<I, S>(profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            profiles: profiles.into_iter().map(Into::into).collect(),
            on_success: None,
            on_error: None,
        }
    }

    /// Called with the channel number and selected profile once the channel is open.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce(u32, &str) + Send + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called with the reply code and text if the start fails.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(u16, &str) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Request to close a channel, or the whole session with channel 0.
pub struct CloseRequest {
    number: u32,
    code: u16,
    on_success: Option<CloseSuccess>,
    on_error: Option<ErrorContinuation>,
}

impl CloseRequest {
    /// Close `number` with reply code 200.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            code: SUCCESS,
            on_success: None,
            on_error: None,
        }
    }

    /// Override the reason code sent with the request.
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    /// Called once the peer has agreed and the channel is gone.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called with the reply code and text if the close fails.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(u16, &str) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// A management request awaiting the peer's reply.
enum PendingRequest {
    Start {
        number: u32,
        candidates: Vec<String>,
        on_success: Option<StartSuccess>,
        on_error: Option<ErrorContinuation>,
    },
    Close {
        number: u32,
        on_success: Option<CloseSuccess>,
        on_error: Option<ErrorContinuation>,
    },
}

impl PendingRequest {
    fn fail(self, code: u16, text: &str) {
        let on_error = match self {
            PendingRequest::Start { on_error, .. } | PendingRequest::Close { on_error, .. } => on_error,
        };
        fail(on_error, code, text);
    }
}

fn fail(on_error: Option<ErrorContinuation>, code: u16, text: &str) {
    match on_error {
        Some(on_error) => on_error(code, text),
        None => warn!(code, text, "management request failed"),
    }
}

/// State of the management profile.
#[derive(Default)]
pub(crate) struct ManagementProfile {
    pending: HashMap<u32, PendingRequest>,
    greeted: bool,
}

impl ManagementProfile {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Send the greeting, advertising every registered profile.
    pub(crate) fn connect(&mut self, channel: &mut ChannelState, core: &mut SessionCore) -> Result<()> {
        let profiles = core.registry.uris().map(ProfileRef::new).collect();
        let greeting = Document::Greeting { profiles }.to_message()?;
        channel.send_rpy(0, &greeting, &mut core.outbox);
        debug!(profiles = core.registry.len(), "greeting queued");
        Ok(())
    }

    /// Fail every request still waiting for a reply.
    pub(crate) fn disconnect(&mut self) {
        self.fail_pending("session terminated");
    }

    fn fail_pending(&mut self, text: &str) {
        for (_, pending) in self.pending.drain() {
            pending.fail(SERVICE_NOT_AVAILABLE, text);
        }
    }

    /// Whether a start of our own for channel `number` awaits its reply.
    fn start_pending(&self, number: u32) -> bool {
        self.pending.values().any(|pending| {
            matches!(pending, PendingRequest::Start { number: n, .. } if *n == number)
        })
    }

    pub(crate) fn handle(
        &mut self,
        channel: &mut ChannelState,
        parts: SessionParts<'_>,
        command: Command,
        msgno: u32,
        message: Message,
    ) -> Result<()> {
        let SessionParts {
            core,
            channels,
            listener,
        } = parts;
        let greeting = msgno == 0 && !self.greeted;
        let mut control = Control::new(self, channel, core, channels);

        match command {
            Command::Rpy if greeting => control.receive_greeting(message, listener),
            Command::Err if greeting => control.greeting_refused(message),
            Command::Msg => control.handle_request(msgno, message),
            Command::Rpy => control.handle_reply(msgno, message),
            Command::Err => control.handle_error_reply(msgno, message),
            Command::Ans | Command::Nul => {
                warn!(command = %command, msgno, "unexpected one-to-many reply on channel 0");
                Ok(())
            }
        }
    }
}

/// Channel management view of a session.
///
/// Handed to [`SessionListener::greeting_received`], and used by the
/// session for its own `start` and `close`.
pub struct Control<'a> {
    management: &'a mut ManagementProfile,
    channel: &'a mut ChannelState,
    core: &'a mut SessionCore,
    channels: &'a mut BTreeMap<u32, Channel>,
}

impl<'a> Control<'a> {
    pub(crate) fn new(
        management: &'a mut ManagementProfile,
        channel: &'a mut ChannelState,
        core: &'a mut SessionCore,
        channels: &'a mut BTreeMap<u32, Channel>,
    ) -> Self {
        Self {
            management,
            channel,
            core,
            channels,
        }
    }

    /// Profiles the peer advertised, once its greeting has arrived.
    pub fn peer_profiles(&self) -> Option<&[String]> {
        self.core.peer_profiles.as_deref()
    }

    /// Whether data channel `number` is open.
    pub fn is_open(&self, number: u32) -> bool {
        self.channels.contains_key(&number)
    }

    /// Ask the peer to open a channel.
    ///
    /// Returns the channel number requested. At least one candidate is
    /// required and every candidate must be registered locally; the channel
    /// exists only once `on_success` runs.
    pub fn start(&mut self, request: StartRequest) -> Result<u32> {
        if self.core.closed {
            return Err(BeepError::SessionClosed);
        }
        if request.profiles.is_empty() {
            return Err(BeepError::InvalidRequest(
                "start names no profile".to_string(),
            ));
        }
        if let Some(uri) = request
            .profiles
            .iter()
            .find(|uri| !self.core.registry.contains(uri))
        {
            return Err(BeepError::UnknownProfile(uri.clone()));
        }

        let number = self.next_channel_number();
        let document = Document::Start {
            number,
            profiles: request.profiles.iter().map(ProfileRef::new).collect(),
        };
        let msgno = self
            .channel
            .send_msg(&document.to_message()?, &mut self.core.outbox);

        info!(channel = number, msgno, profiles = ?request.profiles, "channel start requested");
        self.management.pending.insert(
            msgno,
            PendingRequest::Start {
                number,
                candidates: request.profiles,
                on_success: request.on_success,
                on_error: request.on_error,
            },
        );
        Ok(number)
    }

    /// Ask the peer to close a channel; channel 0 closes the session.
    ///
    /// Closing a channel that is not open fails the request through its
    /// error continuation without contacting the peer.
    pub fn close(&mut self, request: CloseRequest) -> Result<()> {
        if self.core.closed {
            return Err(BeepError::SessionClosed);
        }

        let CloseRequest {
            number,
            code,
            on_success,
            on_error,
        } = request;

        if number != 0 && !self.channels.contains_key(&number) {
            fail(on_error, ACTION_NOT_TAKEN, &format!("channel {number} is not open"));
            return Ok(());
        }

        let document = Document::Close { number, code };
        let msgno = self
            .channel
            .send_msg(&document.to_message()?, &mut self.core.outbox);

        info!(channel = number, msgno, code, "channel close requested");
        self.management.pending.insert(
            msgno,
            PendingRequest::Close {
                number,
                on_success,
                on_error,
            },
        );
        Ok(())
    }

    /// Next channel number of our parity not already in use.
    fn next_channel_number(&mut self) -> u32 {
        loop {
            let number = self.core.channel_numbers.next_value();
            if !self.channels.contains_key(&number) && !self.management.start_pending(number) {
                return number;
            }
        }
    }

    fn receive_greeting(&mut self, message: Message, listener: &mut dyn SessionListener) -> Result<()> {
        self.management.greeted = true;

        let profiles: Vec<String> = match Document::from_message(&message) {
            Ok(Document::Greeting { profiles }) => profiles.into_iter().map(|p| p.uri).collect(),
            Ok(other) => {
                return Err(BeepError::Protocol(format!(
                    "expected greeting, got {}",
                    other.name()
                )))
            }
            Err(e) => return Err(BeepError::Protocol(format!("malformed greeting: {e}"))),
        };

        info!(profiles = ?profiles, "greeting received");
        self.core.peer_profiles = Some(profiles.clone());
        listener.greeting_received(self, &profiles)
    }

    fn greeting_refused(&mut self, message: Message) -> Result<()> {
        self.management.greeted = true;
        let (code, text) = error_of(&message);
        warn!(code, text = %text, "peer refused the session");
        self.core.closed = true;
        Ok(())
    }

    fn handle_request(&mut self, msgno: u32, message: Message) -> Result<()> {
        let document = match Document::from_message(&message) {
            Ok(document) => document,
            Err(e) => {
                warn!(msgno, error = %e, "malformed management request");
                return self.refuse(msgno, SYNTAX_ERROR, "malformed management document");
            }
        };

        match document {
            Document::Start { number, profiles } => self.accept_start(msgno, number, profiles),
            Document::Close { number, code } => self.accept_close(msgno, number, code),
            other => {
                let text = format!("unexpected {} request", other.name());
                self.refuse(msgno, PARAMETER_ERROR, &text)
            }
        }
    }

    fn accept_start(&mut self, msgno: u32, number: u32, profiles: Vec<ProfileRef>) -> Result<()> {
        if number == 0
            || number > MAX_NUMBER
            || self.channels.contains_key(&number)
            || self.management.start_pending(number)
        {
            let text = format!("channel {number} is not available");
            return self.refuse(msgno, PARAMETER_INVALID, &text);
        }
        if profiles.is_empty() {
            return self.refuse(msgno, PARAMETER_ERROR, "start names no profile");
        }

        let Some(uri) = profiles
            .into_iter()
            .map(|profile| profile.uri)
            .find(|uri| self.core.registry.contains(uri))
        else {
            return self.refuse(msgno, ACTION_NOT_TAKEN, "no requested profile is supported");
        };

        let reply = Document::Profile(ProfileRef::new(uri.as_str())).to_message()?;
        self.channel.send_rpy(msgno, &reply, &mut self.core.outbox);
        self.open_channel(number, &uri)?;

        info!(channel = number, profile = %uri, "channel started by peer");
        Ok(())
    }

    fn accept_close(&mut self, msgno: u32, number: u32, code: u16) -> Result<()> {
        if number == 0 {
            if !self.channels.is_empty() {
                return self.refuse(msgno, ACTION_NOT_TAKEN, "channels are still open");
            }
            self.reply_ok(msgno)?;
            self.core.closed = true;
            self.management.fail_pending("session closed");
            info!(code, "session closed by peer");
            return Ok(());
        }

        match self.channels.remove(&number) {
            Some(mut channel) => {
                channel.disconnect();
                self.reply_ok(msgno)?;
                info!(channel = number, code, "channel closed by peer");
                Ok(())
            }
            None => {
                let text = format!("channel {number} is not open");
                self.refuse(msgno, ACTION_NOT_TAKEN, &text)
            }
        }
    }

    fn handle_reply(&mut self, msgno: u32, message: Message) -> Result<()> {
        let Some(pending) = self.management.pending.remove(&msgno) else {
            warn!(msgno, "RPY to unknown management request");
            return Ok(());
        };
        let document = Document::from_message(&message);

        match pending {
            PendingRequest::Start {
                number,
                candidates,
                on_success,
                on_error,
            } => {
                let uri = match document {
                    Ok(Document::Profile(ProfileRef { uri })) => uri,
                    Ok(other) => {
                        let text = format!("unexpected {} reply to start", other.name());
                        fail(on_error, PARAMETER_ERROR, &text);
                        return Ok(());
                    }
                    Err(e) => {
                        fail(on_error, SYNTAX_ERROR, &format!("malformed reply to start: {e}"));
                        return Ok(());
                    }
                };

                if !candidates.contains(&uri) {
                    let text = format!("peer selected unrequested profile {uri}");
                    fail(on_error, ACTION_NOT_TAKEN, &text);
                    return Ok(());
                }
                if self.channels.contains_key(&number) {
                    let text = format!("channel {number} is already open");
                    fail(on_error, PARAMETER_INVALID, &text);
                    return Ok(());
                }

                self.open_channel(number, &uri)?;
                info!(channel = number, profile = %uri, "channel started");
                if let Some(on_success) = on_success {
                    on_success(number, &uri);
                }
            }
            PendingRequest::Close {
                number, on_success, ..
            } => {
                if !matches!(document, Ok(Document::Ok)) {
                    debug!(msgno, "close acknowledged without an ok document");
                }
                if number == 0 {
                    self.core.closed = true;
                    self.management.fail_pending("session closed");
                    info!("session closed");
                } else if let Some(mut channel) = self.channels.remove(&number) {
                    channel.disconnect();
                    info!(channel = number, "channel closed");
                }
                if let Some(on_success) = on_success {
                    on_success();
                }
            }
        }
        Ok(())
    }

    fn handle_error_reply(&mut self, msgno: u32, message: Message) -> Result<()> {
        let (code, text) = error_of(&message);
        match self.management.pending.remove(&msgno) {
            Some(pending) => {
                debug!(msgno, code, "management request refused");
                pending.fail(code, &text);
            }
            None => warn!(msgno, code, text = %text, "ERR to unknown management request"),
        }
        Ok(())
    }

    fn open_channel(&mut self, number: u32, uri: &str) -> Result<()> {
        let profile = self
            .core
            .registry
            .create(uri)
            .ok_or_else(|| BeepError::UnknownProfile(uri.to_string()))?;
        let mut channel = Channel::new(number, Handler::Profile(profile), self.core.max_frame_size);
        channel.connect(self.core)?;
        self.channels.insert(number, channel);
        Ok(())
    }

    fn reply_ok(&mut self, msgno: u32) -> Result<()> {
        let reply = Document::Ok.to_message()?;
        self.channel.send_rpy(msgno, &reply, &mut self.core.outbox);
        Ok(())
    }

    fn refuse(&mut self, msgno: u32, code: u16, text: &str) -> Result<()> {
        debug!(msgno, code, text, "refusing management request");
        let reply = Document::error(code, text).to_message()?;
        self.channel.send_err(msgno, &reply, &mut self.core.outbox);
        Ok(())
    }
}

/// Code and text of a negative reply, tolerating bodies that are not an
/// `error` document.
fn error_of(message: &Message) -> (u16, String) {
    match Document::from_message(message) {
        Ok(Document::Error { code, text }) => (code, text),
        _ => (
            TRANSACTION_FAILED,
            message.as_str().unwrap_or_default().to_string(),
        ),
    }
}
