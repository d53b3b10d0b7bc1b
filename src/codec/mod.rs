//! Codec module - serialization of message bodies.
//!
//! - [`JsonCodec`] - management documents on channel 0
//! - [`MsgPackCodec`] - typed application bodies on data channels
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is fixed at compile time by the call site.

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
