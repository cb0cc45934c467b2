//! # shared-publisher
//!
//! Relay hub for cross-chain transaction batches.
//!
//! Sequencers connect over TCP and exchange length-prefixed protobuf
//! envelopes. Every transaction batch a peer submits is counted per chain
//! and forwarded to every other connected peer, never back to the sender.
//!
//! ## Architecture
//!
//! - **[`server`]**: accept loop, connection registry, per-peer read loops,
//!   broadcast and directed send
//! - **[`publisher`]**: message classification, chain statistics and the
//!   exclude-sender broadcast policy
//! - **[`codec`]** / **[`protocol`]**: `[u32 BE length][protobuf Message]` frames
//! - **[`http`]** / **[`metrics`]**: read-only introspection and Prometheus
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use shared_publisher::publisher::Publisher;
//! use shared_publisher::server::{Server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> shared_publisher::Result<()> {
//!     let server = Arc::new(Server::new(ServerConfig::default()));
//!     let publisher = Arc::new(Publisher::new(server, Duration::from_secs(30)));
//!
//!     let cancel = CancellationToken::new();
//!     publisher.start(cancel.clone()).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     cancel.cancel();
//!     publisher.stop(Duration::from_secs(30)).await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod protocol;
pub mod publisher;
pub mod server;
pub mod telemetry;
pub mod writer;

pub use error::{PublisherError, Result};
pub use publisher::{Publisher, PublisherStats};
pub use server::{BroadcastReport, Server, ServerConfig};
