//! Handler module - inbound message dispatch.
//!
//! The server invokes exactly one [`MessageHandler`] per decoded frame, with
//! the id of the connection the frame arrived on. A handler error is logged
//! and counted by the caller; it never closes the connection.
//!
//! # Example
//!
//! ```
//! use shared_publisher::handler::{FnHandler, MessageHandler};
//! use shared_publisher::connection::ConnectionId;
//! use shared_publisher::protocol::Message;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = FnHandler::new(|from: ConnectionId, msg: Message| async move {
//!     println!("{from}: {}", msg.type_label());
//!     Ok(())
//! });
//!
//! handler.handle(&ConnectionId::new(), &Message::default()).await.unwrap();
//! # }
//! ```

mod handler_fn;

use std::future::Future;
use std::pin::Pin;

use crate::connection::ConnectionId;
use crate::error::Result;
use crate::protocol::Message;

pub use handler_fn::FnHandler;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receives every message decoded by the server.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message received on connection `from`.
    fn handle<'a>(&'a self, from: &'a ConnectionId, message: &'a Message) -> BoxFuture<'a, Result<()>>;
}
