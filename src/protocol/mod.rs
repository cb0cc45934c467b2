//! Protocol module - wire format and message envelope.
//!
//! This module implements the data model shared by the hub and its peers:
//! - 4-byte Big Endian length prefix
//! - Protobuf `Message` envelope with a `oneof` payload
//! - [`PayloadKind`] classification with an explicit unrecognized case

mod message;
mod wire_format;

pub use message::message::Payload;
pub use message::{format_chain_id, Message, PayloadKind, TransactionRequest, XtRequest};
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, ABSOLUTE_MAX_MESSAGE_SIZE,
    DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE,
};
