//! Property-based tests for the frame codec.
//!
//! - Any message within the limit survives encode/decode unchanged
//! - One byte over the limit fails on both sides; exactly at the limit succeeds
//! - Arbitrary bytes after a valid prefix never panic the decoder

use shared_publisher::codec::FrameCodec;
use shared_publisher::protocol::{
    encode_length_prefix, Message, TransactionRequest, LENGTH_PREFIX_SIZE,
};
use shared_publisher::PublisherError;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

// Strategy for generating transaction requests
fn tx_strategy() -> impl Strategy<Value = TransactionRequest> {
    (
        prop::collection::vec(any::<u8>(), 0..8),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..4),
    )
        .prop_map(|(chain, txs)| TransactionRequest::new(chain, txs))
}

// Strategy for generating envelopes, with and without a payload
fn message_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![
        ("[a-z0-9-]{0,24}", prop::collection::vec(tx_strategy(), 0..6))
            .prop_map(|(sender, txs)| Message::xt_request(sender, txs)),
        "[a-z0-9-]{0,24}".prop_map(|sender| Message {
            sender_id: sender,
            payload: None,
        }),
    ]
}

#[test]
fn prop_roundtrip_within_limit() {
    let rt = runtime();
    proptest!(|(msg in message_strategy())| {
        let codec = FrameCodec::new(64 * 1024);
        let frame = codec.encode(&msg).unwrap();
        let decoded = rt.block_on(codec.decode(&mut &frame[..])).unwrap();
        prop_assert_eq!(decoded, msg);
    });
}

#[test]
fn prop_size_limit_is_symmetric() {
    let rt = runtime();
    proptest!(|(msg in message_strategy())| {
        let size = prost::Message::encoded_len(&msg);
        prop_assume!(size > 0);

        // Exactly at the limit
        let at_limit = FrameCodec::new(size);
        let frame = at_limit.encode(&msg).unwrap();
        prop_assert_eq!(rt.block_on(at_limit.decode(&mut &frame[..])).unwrap(), msg.clone());

        // One byte under what the frame needs
        let tight = FrameCodec::new(size - 1);
        let encode_err = tight.encode(&msg).unwrap_err();
        let is_too_large = matches!(encode_err, PublisherError::MessageTooLarge { .. });
        prop_assert!(is_too_large);

        let decode_err = rt.block_on(tight.decode(&mut &frame[..])).unwrap_err();
        let is_too_large = matches!(decode_err, PublisherError::MessageTooLarge { .. });
        prop_assert!(is_too_large);
    });
}

#[test]
fn prop_arbitrary_payload_never_panics() {
    let rt = runtime();
    proptest!(|(payload in prop::collection::vec(any::<u8>(), 0..256))| {
        let codec = FrameCodec::new(1024);
        let mut bytes = encode_length_prefix(payload.len() as u32).to_vec();
        bytes.extend_from_slice(&payload);

        match rt.block_on(codec.decode(&mut &bytes[..])) {
            Ok(_) | Err(PublisherError::MalformedPayload(_)) => {}
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    });
}

#[test]
fn prop_frame_length_matches_prefix() {
    proptest!(|(msg in message_strategy())| {
        let frame = FrameCodec::new(64 * 1024).encode(&msg).unwrap();
        let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        prop_assert_eq!(declared + LENGTH_PREFIX_SIZE, frame.len());
    });
}
