//! Channels: sequence tracking, message numbering, segmentation, and
//! dispatch of completed messages to the bound profile.
//!
//! Every channel keeps two byte positions, one per direction. Inbound frames
//! must start exactly where the previous frame on the channel ended;
//! outbound frames are stamped from the local position. Message numbers the
//! channel sent stay outstanding until a final reply (RPY, ERR or NUL)
//! arrives. Message numbers the peer sent stay answerable until the local
//! side replies.

mod counter;
mod reassembly;

pub use counter::{Counter, SequenceNumber};
pub use reassembly::{Assembled, Reassembler};

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{BeepError, Result};
use crate::message::Message;
use crate::profile::{Handler, ManagementProfile};
use crate::protocol::{Command, Frame};
use crate::session::{Outbox, SessionCore, SessionParts};

/// Answer numbers issued for one inbound MSG.
#[derive(Debug)]
struct Answers {
    numbers: Counter,
    issued: BTreeSet<u32>,
}

impl Answers {
    fn new() -> Self {
        Self {
            numbers: Counter::message_numbers(),
            issued: BTreeSet::new(),
        }
    }
}

/// Numbering and sequencing state of one channel.
#[derive(Debug)]
pub struct ChannelState {
    number: u32,
    send_seqno: SequenceNumber,
    recv_seqno: SequenceNumber,
    msgnos: Counter,
    /// MSGs we sent that have no final reply yet.
    outstanding: BTreeSet<u32>,
    /// MSGs the peer sent that we have not finished replying to.
    answerable: BTreeSet<u32>,
    /// ANS numbers we issued, per peer msgno.
    sent_answers: HashMap<u32, Answers>,
    /// ANS numbers the peer issued, per local msgno.
    received_answers: HashMap<u32, BTreeSet<u32>>,
    reassembler: Reassembler,
    max_frame_size: usize,
    /// Channel 0 only: the peer's greeting (RPY 0) is still due.
    expect_greeting: bool,
}

impl ChannelState {
    pub(crate) fn new(number: u32, max_frame_size: usize) -> Self {
        Self {
            number,
            send_seqno: SequenceNumber::default(),
            recv_seqno: SequenceNumber::default(),
            msgnos: Counter::message_numbers(),
            outstanding: BTreeSet::new(),
            answerable: BTreeSet::new(),
            sent_answers: HashMap::new(),
            received_answers: HashMap::new(),
            reassembler: Reassembler::new(),
            max_frame_size: max_frame_size.max(1),
            expect_greeting: number == 0,
        }
    }

    /// Channel number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Sequence number the next outbound frame will carry.
    pub fn next_send_seqno(&self) -> u64 {
        self.send_seqno.value()
    }

    /// Sequence number the next inbound frame must carry.
    pub fn next_recv_seqno(&self) -> u64 {
        self.recv_seqno.value()
    }

    /// Largest payload put in a single outbound frame.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Whether a MSG we sent is still waiting for its final reply.
    pub fn is_outstanding(&self, msgno: u32) -> bool {
        self.outstanding.contains(&msgno)
    }

    /// Message numbers of MSGs we sent that await a final reply.
    pub fn outstanding(&self) -> impl Iterator<Item = u32> + '_ {
        self.outstanding.iter().copied()
    }

    /// Whether a MSG from the peer is still waiting for our reply.
    pub fn is_answerable(&self, msgno: u32) -> bool {
        self.answerable.contains(&msgno)
    }

    /// Answer numbers we issued for the peer's MSG `msgno`.
    pub fn sent_answers(&self, msgno: u32) -> Vec<u32> {
        self.sent_answers
            .get(&msgno)
            .map(|answers| answers.issued.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Answer numbers the peer issued for our MSG `msgno`.
    pub fn received_answers(&self, msgno: u32) -> Vec<u32> {
        self.received_answers
            .get(&msgno)
            .map(|issued| issued.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Send a MSG, returning the message number it was given.
    pub(crate) fn send_msg(&mut self, message: &Message, out: &mut Outbox) -> u32 {
        let msgno = self.msgnos.next_value();
        self.outstanding.insert(msgno);
        self.emit(out, Command::Msg, msgno, None, message.to_payload());
        msgno
    }

    pub(crate) fn send_rpy(&mut self, msgno: u32, message: &Message, out: &mut Outbox) {
        self.answerable.remove(&msgno);
        self.emit(out, Command::Rpy, msgno, None, message.to_payload());
    }

    pub(crate) fn send_err(&mut self, msgno: u32, message: &Message, out: &mut Outbox) {
        self.answerable.remove(&msgno);
        self.emit(out, Command::Err, msgno, None, message.to_payload());
    }

    /// Send one ANS to the peer's MSG `msgno`, returning its answer number.
    pub(crate) fn send_ans(&mut self, msgno: u32, message: &Message, out: &mut Outbox) -> u32 {
        let answers = self.sent_answers.entry(msgno).or_insert_with(Answers::new);
        let ansno = answers.numbers.next_value();
        answers.issued.insert(ansno);
        self.emit(out, Command::Ans, msgno, Some(ansno), message.to_payload());
        ansno
    }

    /// Terminate a one-to-many exchange.
    pub(crate) fn send_nul(&mut self, msgno: u32, out: &mut Outbox) {
        self.sent_answers.remove(&msgno);
        self.answerable.remove(&msgno);
        self.emit(out, Command::Nul, msgno, None, Bytes::new());
    }

    /// Split `payload` into frames of at most `max_frame_size` bytes.
    ///
    /// An empty payload still produces one frame.
    fn emit(
        &mut self,
        out: &mut Outbox,
        command: Command,
        msgno: u32,
        ansno: Option<u32>,
        payload: Bytes,
    ) {
        let mut remaining = payload;
        loop {
            let chunk = if remaining.len() > self.max_frame_size {
                remaining.split_to(self.max_frame_size)
            } else {
                std::mem::take(&mut remaining)
            };
            let more = !remaining.is_empty();
            let frame = Frame::new(
                command,
                self.number,
                msgno,
                more,
                self.send_seqno.value(),
                ansno,
                chunk,
            );
            self.send_seqno.advance(frame.payload_len());
            trace!(
                channel = self.number,
                command = %command,
                msgno,
                seqno = frame.seqno(),
                size = frame.payload_len(),
                "frame queued"
            );
            out.send_data_frame(frame);
            if !more {
                break;
            }
        }
    }

    /// Account for one inbound frame.
    ///
    /// Returns the message it completes, if any. Sequence gaps, a reused
    /// MSG number and a command change inside a continuation are fatal.
    pub(crate) fn receive(&mut self, frame: Frame) -> Result<Option<Assembled>> {
        let expected = self.recv_seqno.value();
        if frame.seqno() != expected {
            return Err(BeepError::SequenceMismatch {
                channel: self.number,
                expected,
                actual: frame.seqno(),
            });
        }
        self.recv_seqno.advance(frame.payload_len());

        let Some(assembled) = self.reassembler.push(frame)? else {
            return Ok(None);
        };

        let msgno = assembled.msgno;
        match assembled.command {
            Command::Msg => {
                if !self.answerable.insert(msgno) {
                    return Err(BeepError::Protocol(format!(
                        "MSG {} on channel {} reused before it was answered",
                        msgno, self.number
                    )));
                }
            }
            Command::Rpy | Command::Err if self.expect_greeting && msgno == 0 => {
                self.expect_greeting = false;
            }
            Command::Rpy | Command::Err => {
                if !self.outstanding.remove(&msgno) {
                    debug!(channel = self.number, msgno, "reply to no outstanding MSG");
                }
            }
            Command::Ans => {
                if let Some(ansno) = assembled.ansno {
                    self.received_answers.entry(msgno).or_default().insert(ansno);
                }
            }
            Command::Nul => {
                self.outstanding.remove(&msgno);
                self.received_answers.remove(&msgno);
            }
        }

        Ok(Some(assembled))
    }
}

/// An open channel: its state plus the profile bound to it.
pub(crate) struct Channel {
    state: ChannelState,
    handler: Handler,
}

impl Channel {
    pub(crate) fn new(number: u32, handler: Handler, max_frame_size: usize) -> Self {
        Self {
            state: ChannelState::new(number, max_frame_size),
            handler,
        }
    }

    pub(crate) fn state(&self) -> &ChannelState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    /// Run the profile's connect hook.
    pub(crate) fn connect(&mut self, core: &mut SessionCore) -> Result<()> {
        self.handler.connect(&mut self.state, core)
    }

    /// Run the profile's disconnect hook.
    pub(crate) fn disconnect(&mut self) {
        let partial = self.state.reassembler.pending();
        if partial > 0 {
            debug!(channel = self.state.number, partial, "dropping partial messages");
        }
        self.handler.disconnect(self.state.number);
    }

    /// Sequence-check, reassemble and dispatch one inbound frame.
    pub(crate) fn handle_data_frame(&mut self, frame: Frame, parts: SessionParts<'_>) -> Result<()> {
        let Some(assembled) = self.state.receive(frame)? else {
            return Ok(());
        };
        self.handler.dispatch(&mut self.state, parts, assembled)
    }

    /// Channel 0's state and management profile.
    pub(crate) fn management_mut(&mut self) -> Option<(&mut ChannelState, &mut ManagementProfile)> {
        match &mut self.handler {
            Handler::Management(management) => Some((&mut self.state, management)),
            Handler::Profile(_) => None,
        }
    }
}
