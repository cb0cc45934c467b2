//! Length-prefixed frame codec.
//!
//! The size limit is symmetric: [`FrameCodec::encode`] refuses to produce a
//! frame whose payload exceeds it, and [`FrameCodec::decode`] refuses a
//! declared length above it *before* reading or allocating the payload.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::ProtoCodec;
use crate::error::{PublisherError, Result};
use crate::protocol::{decode_length_prefix, Message, LENGTH_PREFIX_SIZE};

/// Encodes and decodes single messages as `[u32 BE length][payload]` frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_message_size: usize,
}

impl FrameCodec {
    /// Create a codec enforcing `max_message_size` on payload length.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Configured maximum payload size.
    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encode a message into one contiguous frame.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooLarge` if the serialized payload exceeds the limit.
    pub fn encode(&self, message: &Message) -> Result<Bytes> {
        let size = prost::Message::encoded_len(message);
        self.check_size(size)?;

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + size);
        buf.put_u32(size as u32);
        ProtoCodec::encode_into(message, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Read exactly one frame from `reader` and decode its envelope.
    ///
    /// # Errors
    ///
    /// - `StreamClosed` on EOF, including EOF in the middle of a frame
    /// - `MessageTooLarge` if the declared length exceeds the limit; no
    ///   payload bytes are consumed in that case
    /// - `MalformedPayload` if the payload is not a valid envelope
    /// - `Io` for any other transport failure
    pub async fn decode<R>(&self, reader: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        reader.read_exact(&mut prefix).await.map_err(map_read_error)?;

        let length = decode_length_prefix(&prefix) as usize;
        self.check_size(length)?;

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await.map_err(map_read_error)?;

        ProtoCodec::decode(&payload)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(PublisherError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

fn map_read_error(e: std::io::Error) -> PublisherError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        PublisherError::StreamClosed
    } else {
        PublisherError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_length_prefix, TransactionRequest};
    use tokio::io::{duplex, AsyncWriteExt};

    fn sample(sender: &str) -> Message {
        Message::xt_request(
            sender,
            vec![TransactionRequest::new(vec![0x01], vec![vec![0xAA, 0xBB]])],
        )
    }

    #[tokio::test]
    async fn test_encode_decode_roundtrip() {
        let codec = FrameCodec::new(1024);
        let msg = sample("seq-a");

        let frame = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&mut &frame[..]).await.unwrap();

        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_frame_layout() {
        let codec = FrameCodec::new(1024);
        let msg = sample("seq-a");

        let frame = codec.encode(&msg).unwrap();
        let payload_len = prost::Message::encoded_len(&msg);

        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + payload_len);
        assert_eq!(&frame[..4], &encode_length_prefix(payload_len as u32));
    }

    #[test]
    fn test_encode_exactly_at_limit() {
        let msg = sample("seq-a");
        let size = prost::Message::encoded_len(&msg);

        assert!(FrameCodec::new(size).encode(&msg).is_ok());

        let err = FrameCodec::new(size - 1).encode(&msg).unwrap_err();
        assert!(matches!(err, PublisherError::MessageTooLarge { size: s, max } if s == size && max == size - 1));
    }

    #[tokio::test]
    async fn test_decode_rejects_oversized_prefix_without_reading_payload() {
        let codec = FrameCodec::new(1024);
        let mut bytes = encode_length_prefix(2048).to_vec();
        bytes.extend_from_slice(b"payload bytes that must stay unread");

        let mut reader = &bytes[..];
        let err = codec.decode(&mut reader).await.unwrap_err();

        assert!(matches!(err, PublisherError::MessageTooLarge { size: 2048, max: 1024 }));
        assert_eq!(reader, b"payload bytes that must stay unread");
    }

    #[tokio::test]
    async fn test_decode_eof_before_prefix() {
        let codec = FrameCodec::new(1024);
        let err = codec.decode(&mut &[][..]).await.unwrap_err();
        assert!(matches!(err, PublisherError::StreamClosed));
    }

    #[tokio::test]
    async fn test_decode_eof_mid_payload() {
        let codec = FrameCodec::new(1024);
        let frame = codec.encode(&sample("seq-a")).unwrap();
        let truncated = &frame[..frame.len() - 1];

        let err = codec.decode(&mut &truncated[..]).await.unwrap_err();
        assert!(matches!(err, PublisherError::StreamClosed));
    }

    #[tokio::test]
    async fn test_decode_malformed_payload() {
        let codec = FrameCodec::new(1024);
        let mut bytes = encode_length_prefix(3).to_vec();
        bytes.extend_from_slice(&[0x0a, 0x64, 0x00]);

        let err = codec.decode(&mut &bytes[..]).await.unwrap_err();
        assert!(matches!(err, PublisherError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_decode_sequential_frames_from_stream() {
        let codec = FrameCodec::new(1024);
        let (mut client, mut server) = duplex(4096);

        for i in 0..3 {
            let frame = codec.encode(&sample(&format!("seq-{i}"))).unwrap();
            client.write_all(&frame).await.unwrap();
        }
        drop(client);

        for i in 0..3 {
            let msg = codec.decode(&mut server).await.unwrap();
            assert_eq!(msg.sender_id, format!("seq-{i}"));
        }
        assert!(matches!(
            codec.decode(&mut server).await,
            Err(PublisherError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn test_empty_envelope_frame() {
        let codec = FrameCodec::new(16);
        let msg = Message::default();

        let frame = codec.encode(&msg).unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 0]);

        let decoded = codec.decode(&mut &frame[..]).await.unwrap();
        assert_eq!(decoded, msg);
    }
}
