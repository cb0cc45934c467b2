//! Wire format constants and length-prefix helpers.
//!
//! Every frame on the wire is:
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ Length       │ Payload                     │
//! │ 4 bytes      │ `Length` bytes              │
//! │ uint32 BE    │ protobuf `Message` envelope │
//! └──────────────┴─────────────────────────────┘
//! ```

/// Length prefix size in bytes (fixed, exactly 4).
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum message size (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Largest payload length the prefix can express.
pub const ABSOLUTE_MAX_MESSAGE_SIZE: usize = u32::MAX as usize;

/// Encode a payload length as a Big Endian prefix.
///
/// # Example
///
/// ```
/// use shared_publisher::protocol::encode_length_prefix;
///
/// assert_eq!(encode_length_prefix(258), [0, 0, 1, 2]);
/// ```
#[inline]
pub fn encode_length_prefix(len: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    len.to_be_bytes()
}

/// Decode a Big Endian length prefix.
///
/// # Example
///
/// ```
/// use shared_publisher::protocol::decode_length_prefix;
///
/// assert_eq!(decode_length_prefix(&[0, 0, 0x08, 0]), 2048);
/// ```
#[inline]
pub fn decode_length_prefix(buf: &[u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(*buf)
}
