//! Serialized per-connection writer.
//!
//! Every frame sent to a peer goes through that peer's [`SerializedWriter`].
//! The writer owns the socket's write half behind an async mutex, so a
//! directed `send` and any number of concurrent broadcasts targeting the same
//! connection never interleave frame bytes.
//!
//! # Architecture
//!
//! ```text
//! send(id, msg) ───────┐
//! broadcast task A ────┼─► SerializedWriter ─► [lock] encode+write+flush [unlock] ─► socket
//! broadcast task B ────┘
//! ```
//!
//! Failures are returned to the caller as-is and never retried. A failed
//! write may have left a partial frame on the socket, so the writer drops its
//! write half and every later write fails with `ConnectionClosed`.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::codec::FrameCodec;
use crate::connection::ConnectionId;
use crate::error::{PublisherError, Result};
use crate::protocol::Message;

/// Type-erased write half.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Exclusive-write wrapper around one connection's write half.
pub struct SerializedWriter {
    conn_id: ConnectionId,
    codec: FrameCodec,
    write_timeout: Option<Duration>,
    inner: Mutex<Option<BoxedWriter>>,
}

impl SerializedWriter {
    /// Wrap `writer`. A zero `write_timeout` disables the timeout.
    pub fn new<W>(conn_id: ConnectionId, writer: W, codec: FrameCodec, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            conn_id,
            codec,
            write_timeout: (!write_timeout.is_zero()).then_some(write_timeout),
            inner: Mutex::new(Some(Box::new(writer))),
        }
    }

    #[inline]
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Encode and transmit one message.
    ///
    /// Returns the number of bytes put on the wire.
    pub async fn write(&self, message: &Message) -> Result<usize> {
        let frame = self.codec.encode(message)?;
        self.write_frame(&frame).await
    }

    /// Transmit an already encoded frame.
    ///
    /// Used by broadcast so the message is encoded once for all recipients.
    pub async fn write_frame(&self, frame: &Bytes) -> Result<usize> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(PublisherError::ConnectionClosed)?;

        let io = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };

        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, io)
                .await
                .map_err(|_| PublisherError::WriteTimeout)
                .and_then(|r| r.map_err(PublisherError::from)),
            None => io.await.map_err(PublisherError::from),
        };

        if let Err(e) = result {
            // Frame boundary is lost; nothing more may go out on this stream.
            guard.take();
            tracing::debug!(conn_id = %self.conn_id, error = %e, "Writer poisoned");
            return Err(e);
        }

        Ok(frame.len())
    }

    /// Shut down the write half.
    ///
    /// Waits for an in-flight write to finish first. Idempotent; returns
    /// `true` only for the call that actually closed the writer.
    pub async fn close(&self) -> bool {
        let Some(mut writer) = self.inner.lock().await.take() else {
            return false;
        };
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(conn_id = %self.conn_id, error = %e, "Writer shutdown error");
        }
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl std::fmt::Debug for SerializedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedWriter")
            .field("conn_id", &self.conn_id)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
