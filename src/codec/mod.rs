//! Codec module - envelope serialization and frame encoding.
//!
//! This module provides two layers:
//!
//! - [`ProtoCodec`] - Protobuf payload bytes <-> envelope, using `prost`
//! - [`FrameCodec`] - Length-prefixed frames with a symmetric size limit
//!
//! # Design
//!
//! `ProtoCodec` is a marker struct with static methods. `FrameCodec` carries the
//! configured maximum message size and is `Copy`, so every connection can hold
//! its own handle without sharing state.
//!
//! # Example
//!
//! ```
//! use shared_publisher::codec::FrameCodec;
//! use shared_publisher::protocol::{Message, TransactionRequest};
//!
//! # tokio_test_block_on(async {
//! let codec = FrameCodec::new(1024);
//! let msg = Message::xt_request("seq-a", vec![TransactionRequest::new(vec![0x01], vec![vec![0xAA]])]);
//!
//! let frame = codec.encode(&msg).unwrap();
//! let decoded = codec.decode(&mut &frame[..]).await.unwrap();
//! assert_eq!(decoded, msg);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod framed;
mod protobuf;

pub use framed::FrameCodec;
pub use protobuf::ProtoCodec;
