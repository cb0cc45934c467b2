//! Dispatcher: classifies inbound messages and fans batches out.
//!
//! The [`Publisher`] installs itself as the server's message handler. A
//! transaction batch is counted per chain and rebroadcast to every other
//! connected peer; anything else is rejected with `UnknownMessageType`
//! (the server logs it and keeps the connection open).
//!
//! A reporter task logs a [`PublisherStats`] snapshot on a fixed interval
//! and refreshes the connection and uptime gauges.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::connection::ConnectionId;
use crate::error::{PublisherError, Result};
use crate::handler::{BoxFuture, MessageHandler};
use crate::metrics;
use crate::protocol::{Message, PayloadKind, XtRequest};
use crate::server::Server;

/// Point-in-time dispatcher statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherStats {
    pub uptime_seconds: f64,
    pub active_connections: usize,
    pub messages_processed: u64,
    pub broadcasts_sent: u64,
    /// Chain labels seen so far, sorted.
    pub unique_chains: Vec<String>,
    pub chains_count: usize,
}

/// Orchestrates the server and the broadcast policy.
pub struct Publisher {
    server: Arc<Server>,
    stats_interval: Duration,
    /// Transaction requests per chain label.
    chains: RwLock<BTreeMap<String, u64>>,
    messages_processed: AtomicU64,
    broadcasts_sent: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    /// Cancels in-flight broadcasts and the reporter of the current run.
    run_token: Mutex<CancellationToken>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub fn new(server: Arc<Server>, stats_interval: Duration) -> Self {
        Self {
            server,
            stats_interval,
            chains: RwLock::new(BTreeMap::new()),
            messages_processed: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            started_at: Mutex::new(None),
            run_token: Mutex::new(CancellationToken::new()),
            reporter: Mutex::new(None),
        }
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Register as the server's handler, start the server and the reporter.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if the server is running; the installed handler
    ///   is left untouched
    /// - `Bind` if the listener cannot be bound; the handler is detached
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<SocketAddr> {
        if self.server.is_running() {
            return Err(PublisherError::AlreadyRunning);
        }
        info!("Starting publisher");

        self.server.set_handler(Arc::clone(self) as Arc<dyn MessageHandler>);
        let addr = match self.server.start(cancel.clone()).await {
            Ok(addr) => addr,
            // Lost a race with another start; that run owns the handler.
            Err(PublisherError::AlreadyRunning) => return Err(PublisherError::AlreadyRunning),
            Err(e) => {
                self.server.take_handler();
                return Err(e);
            }
        };

        let run = cancel.child_token();
        *self.run_token.lock() = run.clone();
        *self.started_at.lock() = Some(Instant::now());
        *self.reporter.lock() = Some(tokio::spawn(Arc::clone(self).report_loop(run)));

        info!(
            version = env!("CARGO_PKG_VERSION"),
            address = %addr,
            "Publisher started successfully"
        );
        Ok(addr)
    }

    /// Stop the reporter and the server, then detach from the server.
    ///
    /// # Errors
    ///
    /// Whatever [`Server::stop`] returns.
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        info!("Stopping publisher");

        self.run_token.lock().cancel();
        let reporter = self.reporter.lock().take();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        let result = self.server.stop(deadline).await;
        self.server.take_handler();

        info!(
            messages_processed = self.messages_processed.load(Ordering::Relaxed),
            broadcasts_sent = self.broadcasts_sent.load(Ordering::Relaxed),
            "Publisher stopped"
        );
        result
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> PublisherStats {
        let unique_chains: Vec<String> = self.chains.read().keys().cloned().collect();
        let started_at = *self.started_at.lock();
        let uptime_seconds = started_at.map_or(0.0, |t| t.elapsed().as_secs_f64());

        PublisherStats {
            uptime_seconds,
            active_connections: self.server.connection_count(),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            chains_count: unique_chains.len(),
            unique_chains,
        }
    }

    /// Transaction requests seen for `chain` (a `0x` label).
    pub fn chain_transactions(&self, chain: &str) -> u64 {
        self.chains.read().get(chain).copied().unwrap_or(0)
    }

    async fn dispatch(&self, from: &ConnectionId, message: &Message) -> Result<()> {
        let start = Instant::now();
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        let result = match message.kind() {
            PayloadKind::XtRequest(req) => self.handle_xt_request(from, message, req).await,
            PayloadKind::Unrecognized => Err(PublisherError::UnknownMessageType),
        };

        metrics::record_processing_duration(message.type_label(), start.elapsed().as_secs_f64());
        result
    }

    async fn handle_xt_request(
        &self,
        from: &ConnectionId,
        message: &Message,
        req: &XtRequest,
    ) -> Result<()> {
        info!(
            from = %from,
            sender_id = %message.sender_id,
            tx_count = req.transactions.len(),
            "Received xT request"
        );
        metrics::record_batch(req.transactions.len());

        {
            let mut chains = self.chains.write();
            for tx in &req.transactions {
                let label = tx.chain_label();
                let count = chains.entry(label.clone()).or_insert(0);
                metrics::record_chain_transaction(&label, *count == 0);
                *count += 1;
            }
        }

        for (index, tx) in req.transactions.iter().enumerate() {
            debug!(
                index,
                chain_id = %tx.chain_label(),
                tx_data_count = tx.transaction.len(),
                "Transaction details"
            );
        }

        let recipients = self.server.connection_count().saturating_sub(1);
        if recipients == 0 {
            info!(from = %from, "No other connections to broadcast to");
            return Ok(());
        }

        metrics::record_broadcast_recipients(recipients);
        let started = Instant::now();
        let cancel = self.run_token.lock().clone();

        match self.server.broadcast(message, from, &cancel).await {
            Ok(report) => {
                self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
                metrics::record_broadcast(started.elapsed().as_secs_f64());
                info!(
                    from = %from,
                    recipients = report.delivered,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Successfully broadcast xT request"
                );
                Ok(())
            }
            Err(e) => {
                error!(from = %from, error = %e, "Failed to broadcast xT request");
                metrics::record_error(e.kind(), "xt_request");
                Err(e)
            }
        }
    }

    async fn report_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.stats_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let stats = self.stats();
            info!(
                active_connections = stats.active_connections,
                messages_processed = stats.messages_processed,
                broadcasts_sent = stats.broadcasts_sent,
                unique_chains = stats.chains_count,
                uptime_secs = stats.uptime_seconds as u64,
                "Publisher statistics"
            );
            metrics::set_active_connections(stats.active_connections);
            metrics::set_uptime(stats.uptime_seconds);
        }
    }
}

impl MessageHandler for Publisher {
    fn handle<'a>(&'a self, from: &'a ConnectionId, message: &'a Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.dispatch(from, message))
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("server", &self.server)
            .field("stats_interval", &self.stats_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PeerClient;
    use crate::protocol::TransactionRequest;
    use crate::server::ServerConfig;
    use tokio::net::TcpStream;

    fn local_config() -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            read_timeout: Duration::ZERO,
            ..ServerConfig::default()
        }
    }

    fn publisher_with(config: ServerConfig) -> Arc<Publisher> {
        Arc::new(Publisher::new(
            Arc::new(Server::new(config)),
            Duration::from_millis(20),
        ))
    }

    fn publisher() -> Arc<Publisher> {
        publisher_with(local_config())
    }

    async fn wait_for_connections(publisher: &Publisher, n: usize) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while publisher.server().connection_count() != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn batch(chains: &[&[u8]]) -> Message {
        Message::xt_request(
            "seq-a",
            chains
                .iter()
                .map(|c| TransactionRequest::new(c.to_vec(), vec![b"tx".to_vec()]))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_chain_tracking_is_idempotent() {
        let publisher = publisher();
        let from = ConnectionId::new();

        publisher.handle(&from, &batch(&[&[0x01], &[0x02]])).await.unwrap();
        publisher.handle(&from, &batch(&[&[0x01]])).await.unwrap();

        let stats = publisher.stats();
        assert_eq!(stats.unique_chains, vec!["0x01", "0x02"]);
        assert_eq!(stats.chains_count, 2);
        assert_eq!(stats.messages_processed, 2);
        assert_eq!(publisher.chain_transactions("0x01"), 2);
        assert_eq!(publisher.chain_transactions("0x02"), 1);
        assert_eq!(publisher.chain_transactions("0x03"), 0);
    }

    #[tokio::test]
    async fn test_no_peers_skips_broadcast() {
        let publisher = publisher();
        publisher
            .handle(&ConnectionId::new(), &batch(&[&[0x01]]))
            .await
            .unwrap();
        assert_eq!(publisher.stats().broadcasts_sent, 0);
    }

    #[tokio::test]
    async fn test_unknown_payload_is_error_but_counted() {
        let publisher = publisher();
        let msg = Message {
            sender_id: "seq-a".into(),
            payload: None,
        };

        let err = publisher.handle(&ConnectionId::new(), &msg).await.unwrap_err();
        assert!(matches!(err, PublisherError::UnknownMessageType));
        assert_eq!(publisher.stats().messages_processed, 1);
        assert_eq!(publisher.stats().chains_count, 0);
    }

    #[tokio::test]
    async fn test_stats_before_start() {
        let stats = publisher().stats();
        assert_eq!(stats.uptime_seconds, 0.0);
        assert_eq!(stats.active_connections, 0);
        assert!(stats.unique_chains.is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_detaches_handler() {
        let publisher = publisher();
        let cancel = CancellationToken::new();

        publisher.start(cancel.clone()).await.unwrap();
        assert!(publisher.server().is_running());

        // Let the reporter tick at least once.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(publisher.stats().uptime_seconds > 0.0);

        publisher.stop(Duration::from_secs(1)).await.unwrap();
        assert!(!publisher.server().is_running());
        assert!(publisher.server().take_handler().is_none());
        assert_eq!(Arc::strong_count(&publisher), 1);

        assert!(matches!(
            publisher.stop(Duration::from_secs(1)).await,
            Err(PublisherError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_second_start_keeps_dispatching() {
        let publisher = publisher();
        let addr = publisher.start(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            publisher.start(CancellationToken::new()).await,
            Err(PublisherError::AlreadyRunning)
        ));

        let a = PeerClient::connect(addr, 64 * 1024).await.unwrap();
        let mut b = PeerClient::connect(addr, 64 * 1024).await.unwrap();
        wait_for_connections(&publisher, 2).await;

        let msg = batch(&[&[0x07]]);
        a.send(&msg).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, msg);

        let stats = publisher.stats();
        assert_eq!(stats.messages_processed, 1);
        assert_eq!(stats.broadcasts_sent, 1);

        publisher.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_returned_and_not_counted() {
        let publisher = publisher_with(ServerConfig {
            write_timeout: Duration::from_millis(200),
            max_message_size: 64 << 20,
            ..local_config()
        });
        let addr = publisher.start(CancellationToken::new()).await.unwrap();

        // Neither peer reads, so a frame larger than the socket buffers stalls.
        let _sender = TcpStream::connect(addr).await.unwrap();
        let _stalled = TcpStream::connect(addr).await.unwrap();
        wait_for_connections(&publisher, 2).await;
        let from = publisher.server().connections()[0].id;

        let msg = Message::xt_request(
            "seq-a",
            vec![TransactionRequest::new(vec![0x09], vec![vec![0x5A; 32 << 20]])],
        );
        let err = publisher.handle(&from, &msg).await.unwrap_err();
        assert!(matches!(
            err,
            PublisherError::Broadcast {
                failed: 1,
                attempted: 1,
                ..
            }
        ));

        let stats = publisher.stats();
        assert_eq!(stats.messages_processed, 1);
        assert_eq!(stats.broadcasts_sent, 0);
        assert_eq!(publisher.chain_transactions("0x09"), 1);

        publisher.stop(Duration::from_secs(2)).await.unwrap();
    }

    #[test]
    fn test_stats_serialize_shape() {
        let stats = PublisherStats {
            uptime_seconds: 1.5,
            active_connections: 2,
            messages_processed: 3,
            broadcasts_sent: 1,
            unique_chains: vec!["0x01".into()],
            chains_count: 1,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["chains_count"], 1);
        assert_eq!(json["unique_chains"][0], "0x01");
    }
}
