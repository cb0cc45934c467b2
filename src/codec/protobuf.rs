//! Protobuf codec using `prost`.
//!
//! Field numbers in [`crate::protocol`] are the wire contract with peers
//! written in other languages; unknown fields are skipped on decode.

use bytes::BufMut;

use crate::error::Result;

/// Protobuf codec for envelope payloads.
pub struct ProtoCodec;

impl ProtoCodec {
    /// Append the protobuf encoding of `value` to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Encode`](crate::error::PublisherError::Encode) if `buf`
    /// cannot grow to hold the encoding.
    #[inline]
    pub fn encode_into<T: prost::Message, B: BufMut>(value: &T, buf: &mut B) -> Result<()> {
        value.encode(buf)?;
        Ok(())
    }

    /// Decode protobuf bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::PublisherError::MalformedPayload)
    /// if the bytes are not a valid encoding of `T`.
    #[inline]
    pub fn decode<T: prost::Message + Default>(bytes: &[u8]) -> Result<T> {
        Ok(T::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublisherError;
    use crate::protocol::{Message, TransactionRequest};

    #[test]
    fn test_encode_decode_message() {
        let original = Message::xt_request(
            "rollup-a",
            vec![
                TransactionRequest::new(vec![0x01], vec![vec![1, 2, 3]]),
                TransactionRequest::new(vec![0x02], vec![vec![4], vec![5, 6]]),
            ],
        );

        let mut encoded = Vec::new();
        ProtoCodec::encode_into(&original, &mut encoded).unwrap();
        let decoded: Message = ProtoCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encode_into_fixed_buffer_too_small() {
        let msg = Message::xt_request("rollup-a", vec![TransactionRequest::new(vec![0x01], vec![])]);
        let mut storage = [0u8; 2];
        let mut buf = &mut storage[..];
        let err = ProtoCodec::encode_into(&msg, &mut buf).unwrap_err();
        assert!(matches!(err, PublisherError::Encode(_)));
    }

    #[test]
    fn test_empty_bytes_decode_to_default() {
        let decoded: Message = ProtoCodec::decode(&[]).unwrap();
        assert_eq!(decoded.sender_id, "");
        assert!(decoded.payload.is_none());
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        // Length-delimited field claiming 100 bytes with only 1 present.
        let invalid = [0x0a, 0x64, 0x00];
        let result: Result<Message> = ProtoCodec::decode(&invalid);
        assert!(matches!(result, Err(PublisherError::MalformedPayload(_))));
    }

    #[test]
    fn test_invalid_utf8_sender_is_malformed() {
        let invalid = [0x0a, 0x02, 0xff, 0xfe];
        let result: Result<Message> = ProtoCodec::decode(&invalid);
        assert!(matches!(result, Err(PublisherError::MalformedPayload(_))));
    }
}
