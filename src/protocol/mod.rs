//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the framing layer of a session:
//! - Header line encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    Command, Header, COMPLETE, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_MAX_PAYLOAD_SIZE, MAX_HEADER_LINE, MAX_NUMBER, MORE, SEQNO_MODULUS, TRAILER,
    TRAILER_SIZE,
};
