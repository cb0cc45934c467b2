//! TCP hub: accept loop, connection registry, read loops and fan-out.
//!
//! # Lifecycle
//!
//! `Stopped -> Running -> Stopped`, driven by [`Server::start`] and
//! [`Server::stop`]. Both transitions are a compare-and-exchange on one flag,
//! so a second `start` fails with `AlreadyRunning` and a second `stop` with
//! `NotRunning` without side effects.
//!
//! # Tasks
//!
//! ```text
//! accept loop ──► admit ──► registry.insert ──► spawn read loop (one per peer)
//!                                                  │
//!                         decode ─► handler(conn_id, message)
//!                                                  │
//!                         exit ─► registry.remove ─► close writer + socket
//! ```
//!
//! Every task (accept loop, read loops, broadcast writes) is spawned on one
//! [`TaskTracker`], which `stop` waits on under a caller-supplied deadline.
//! The registry is a [`DashMap`]; entries are cloned out before any await so
//! no shard lock is ever held across I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use crate::codec::FrameCodec;
use crate::connection::{Connection, ConnectionId, ConnectionInfo};
use crate::error::{PublisherError, Result};
use crate::handler::MessageHandler;
use crate::metrics;
use crate::protocol::{Message, DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE};
use crate::writer::SerializedWriter;

/// Back-off after a failed `accept`, so a persistent error (e.g. fd
/// exhaustion) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Runtime server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Idle limit between frames; zero disables.
    pub read_timeout: Duration,
    /// Limit on one frame transmission; zero disables.
    pub write_timeout: Duration,
    pub max_message_size: usize,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_connections: 100,
        }
    }
}

/// Outcome of a broadcast in which every recipient write succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Recipients selected at fan-out time.
    pub attempted: usize,
    /// Recipients the frame was fully written to.
    pub delivered: usize,
}

/// Registry entry.
#[derive(Clone)]
struct Peer {
    conn: Arc<Connection>,
    writer: Arc<SerializedWriter>,
}

impl Peer {
    /// Write one encoded frame. A failed write leaves the stream without a
    /// frame boundary, so the connection is closed and its read loop tears
    /// the peer down.
    async fn deliver(&self, frame: &Bytes) -> Result<usize> {
        let result = self.writer.write_frame(frame).await;
        if result.is_err() {
            self.conn.close();
        }
        result
    }
}

/// Why a read loop ended.
enum Exit {
    Closed,
    Failed(PublisherError),
}

/// The relay hub.
pub struct Server {
    config: ServerConfig,
    codec: FrameCodec,
    peers: DashMap<ConnectionId, Peer>,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    running: AtomicBool,
    tracker: TaskTracker,
    /// Cancels the accept loop of the current run.
    run_token: Mutex<CancellationToken>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            codec: FrameCodec::new(config.max_message_size),
            config,
            peers: DashMap::new(),
            handler: RwLock::new(None),
            running: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            run_token: Mutex::new(CancellationToken::new()),
            local_addr: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Install the handler invoked for every decoded message.
    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Remove and return the installed handler.
    pub fn take_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.handler.write().take()
    }

    /// Bind the listener and start accepting.
    ///
    /// The accept loop stops when `cancel` fires or on [`stop`](Self::stop).
    /// Returns the bound address, which differs from the configured one
    /// when the configured port is 0.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if the server is running
    /// - `Bind` if the address cannot be bound; the server stays stopped
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<SocketAddr> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PublisherError::AlreadyRunning);
        }

        let bound = async {
            let listener = TcpListener::bind(self.config.listen_addr).await?;
            let local = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local))
        }
        .await;

        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.running.store(false, Ordering::Release);
                return Err(PublisherError::Bind {
                    addr: self.config.listen_addr,
                    source,
                });
            }
        };

        let run = cancel.child_token();
        *self.run_token.lock() = run.clone();
        *self.local_addr.lock() = Some(local_addr);
        self.tracker.reopen();

        info!(
            addr = %local_addr,
            max_connections = self.config.max_connections,
            "Server started"
        );

        self.tracker
            .spawn(Arc::clone(self).accept_loop(listener, run));

        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait for all tasks.
    ///
    /// # Errors
    ///
    /// - `NotRunning` if the server is stopped
    /// - `ShutdownTimeout` if tasks are still running at `deadline`; they
    ///   are left to finish in the background
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PublisherError::NotRunning);
        }

        info!("Stopping server");

        self.run_token.lock().cancel();

        let peers: Vec<Arc<Connection>> =
            self.peers.iter().map(|e| Arc::clone(&e.value().conn)).collect();
        for conn in peers {
            conn.close();
        }

        self.tracker.close();
        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => {
                *self.local_addr.lock() = None;
                info!("Server stopped gracefully");
                Ok(())
            }
            Err(_) => {
                warn!(remaining = self.tracker.len(), "Server stop timeout");
                Err(PublisherError::ShutdownTimeout)
            }
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bound listener address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot of every registered connection, oldest first.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> =
            self.peers.iter().map(|e| e.value().conn.info()).collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }

    /// Number of tasks currently tracked (accept loop, read loops, writes).
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    /// Send `message` to one connection.
    ///
    /// # Errors
    ///
    /// `UnknownConnection` if `id` is not registered; otherwise whatever the
    /// connection's writer reports.
    pub async fn send(&self, id: &ConnectionId, message: &Message) -> Result<()> {
        let peer = self
            .peers
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(PublisherError::UnknownConnection(*id))?;

        let frame = self.codec.encode(message)?;
        let sent = peer.deliver(&frame).await?;
        metrics::record_message_sent(message.type_label(), sent);
        Ok(())
    }

    /// Send `message` to every registered connection except `exclude`.
    ///
    /// The message is encoded once and written to each recipient by its own
    /// task. The call waits for all of them and reports the aggregate; every
    /// per-recipient failure is also logged and counted.
    ///
    /// # Errors
    ///
    /// - `MessageTooLarge` if the message exceeds the size limit; nothing is sent
    /// - `Broadcast` if at least one recipient write failed
    /// - `Cancelled` if `cancel` fires first; in-flight writes finish in the
    ///   background and are never cut off mid-frame
    pub async fn broadcast(
        &self,
        message: &Message,
        exclude: &ConnectionId,
        cancel: &CancellationToken,
    ) -> Result<BroadcastReport> {
        let frame = self.codec.encode(message)?;
        let msg_type = message.type_label();

        let targets: Vec<(ConnectionId, Peer)> = self
            .peers
            .iter()
            .filter(|e| e.key() != exclude)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();

        let attempted = targets.len();
        if attempted == 0 {
            return Ok(BroadcastReport {
                attempted: 0,
                delivered: 0,
            });
        }

        let writes: Vec<_> = targets
            .into_iter()
            .map(|(conn_id, peer)| {
                let frame = frame.clone();
                self.tracker.spawn(async move {
                    let result = peer.deliver(&frame).await;
                    match &result {
                        Ok(sent) => metrics::record_message_sent(msg_type, *sent),
                        Err(e) => {
                            error!(conn_id = %conn_id, error = %e, "Broadcast write error");
                            metrics::record_error(e.kind(), "broadcast");
                        }
                    }
                    result.map(|_| ())
                })
            })
            .collect();

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PublisherError::Cancelled),
            results = futures::future::join_all(writes) => results,
        };

        let mut failed = 0;
        let mut first_error = None;
        for result in results {
            let err = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join) => join.to_string(),
            };
            failed += 1;
            first_error.get_or_insert(err);
        }

        debug!(attempted, failed, "Broadcast complete");

        match first_error {
            None => Ok(BroadcastReport {
                attempted,
                delivered: attempted,
            }),
            Some(first_error) => Err(PublisherError::Broadcast {
                failed,
                attempted,
                first_error,
            }),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(e) => {
                    warn!(error = %e, "Accept error");
                    metrics::record_error("io", "accept");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        debug!("Accept loop stopped");
    }

    /// Register an accepted socket and spawn its read loop.
    ///
    /// Only the accept loop inserts into the registry, so the limit check
    /// and the insert cannot race with another admission.
    fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let current = self.peers.len();
        if current >= self.config.max_connections {
            let err = PublisherError::ConnectionLimitExceeded {
                current,
                max: self.config.max_connections,
            };
            warn!(remote_addr = %addr, current, max = self.config.max_connections, "{err}");
            metrics::record_connection_rejected();
            metrics::record_error(err.kind(), "accept");
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!(remote_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let id = ConnectionId::new();
        let conn = Arc::new(Connection::new(id, addr));
        let (reader, write_half) = stream.into_split();
        let writer = Arc::new(SerializedWriter::new(
            id,
            write_half,
            self.codec,
            self.config.write_timeout,
        ));

        self.peers.insert(
            id,
            Peer {
                conn: Arc::clone(&conn),
                writer: Arc::clone(&writer),
            },
        );
        metrics::record_connection_accepted();

        // A stop() that snapshotted the registry before this insert would
        // miss the connection.
        if !self.is_running() {
            conn.close();
        }

        let span = tracing::info_span!("connection", conn_id = %id, remote_addr = %conn.remote_addr());
        self.tracker.spawn(
            Arc::clone(self)
                .read_loop(conn, writer, reader)
                .instrument(span),
        );
    }

    async fn read_loop<R>(
        self: Arc<Self>,
        conn: Arc<Connection>,
        writer: Arc<SerializedWriter>,
        mut reader: R,
    ) where
        R: AsyncRead + Unpin,
    {
        info!("New connection");
        let id = conn.id();

        let exit = loop {
            let decoded = tokio::select! {
                biased;
                _ = conn.closed() => break Exit::Closed,
                decoded = self.read_frame(&mut reader) => decoded,
            };

            let message = match decoded {
                Ok(message) => message,
                Err(e) => break Exit::Failed(e),
            };

            conn.update_last_seen();
            metrics::record_message_received(
                message.type_label(),
                LENGTH_PREFIX_SIZE + prost::Message::encoded_len(&message),
            );

            let handler = self.handler.read().clone();
            if let Some(handler) = handler {
                if let Err(e) = handler.handle(&id, &message).await {
                    error!(error = %e, msg_type = message.type_label(), "Handler error");
                    metrics::record_error(e.kind(), "handle_message");
                }
            }
        };

        match exit {
            Exit::Closed => debug!("Connection closed locally"),
            Exit::Failed(e) if e.is_disconnect() => debug!(reason = e.kind(), "Client disconnected"),
            Exit::Failed(e) => {
                warn!(error = %e, "Read error");
                metrics::record_error(e.kind(), "read");
            }
        }

        self.peers.remove(&id);
        conn.close();
        writer.close().await;
        metrics::record_connection_closed(conn.age().as_secs_f64());

        info!("Connection closed");
    }

    async fn read_frame<R>(&self, reader: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin,
    {
        if self.config.read_timeout.is_zero() {
            return self.codec.decode(reader).await;
        }
        tokio::time::timeout(self.config.read_timeout, self.codec.decode(reader))
            .await
            .map_err(|_| PublisherError::ReadTimeout)?
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("connections", &self.peers.len())
            .finish_non_exhaustive()
    }
}
