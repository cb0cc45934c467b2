//! Per-peer connection identity and lifecycle state.
//!
//! A [`Connection`] is created by the accept path for every admitted socket.
//! The socket itself is split: the read half belongs to the connection's read
//! loop and the write half to its [`SerializedWriter`](crate::writer::SerializedWriter).
//! `Connection` holds what both sides share: the id, timestamps, and the close
//! signal that ends the read loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Server-assigned unique connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Point-in-time view of a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Chain affinity; peers do not announce one yet, so this stays `None`.
    pub chain_id: Option<String>,
}

/// Shared state of one accepted peer session.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    opened: Instant,
    last_seen: Mutex<DateTime<Utc>>,
    closed: AtomicBool,
    close_signal: CancellationToken,
}

impl Connection {
    /// Create a connection record for a freshly accepted socket.
    pub fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            id,
            remote_addr,
            connected_at: now,
            opened: Instant::now(),
            last_seen: Mutex::new(now),
            closed: AtomicBool::new(false),
            close_signal: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Time since the socket was accepted.
    pub fn age(&self) -> Duration {
        self.opened.elapsed()
    }

    /// Snapshot of this connection's info.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote_addr: self.remote_addr,
            connected_at: self.connected_at,
            last_seen: *self.last_seen.lock(),
            chain_id: None,
        }
    }

    /// Record activity. Called by the read loop after each decoded frame.
    pub fn update_last_seen(&self) {
        *self.last_seen.lock() = Utc::now();
    }

    /// Close the connection.
    ///
    /// Idempotent and safe to call concurrently; returns `true` only for the
    /// call that actually performed the close.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.close_signal.cancel();
        true
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Future that resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close_signal.cancelled()
    }
}
