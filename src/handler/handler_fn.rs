//! Closure adapter for [`MessageHandler`].

use std::future::Future;
use std::marker::PhantomData;

use super::{BoxFuture, MessageHandler};
use crate::connection::ConnectionId;
use crate::error::Result;
use crate::protocol::Message;

/// Wraps an async closure taking owned arguments as a [`MessageHandler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(ConnectionId, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(ConnectionId, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Create a new closure handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(ConnectionId, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle<'a>(&'a self, from: &'a ConnectionId, message: &'a Message) -> BoxFuture<'a, Result<()>> {
        Box::pin((self.handler)(*from, message.clone()))
    }
}
