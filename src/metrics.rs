//! # Publisher Metrics
//!
//! Prometheus metrics for monitoring the hub. The core never reads these
//! back; they are a side channel for scraping.
//!
//! ## Metrics Exported
//!
//! - `publisher_connections_total{type}` - accepted, rejected and closed connections
//! - `publisher_connections_active` - registered connections
//! - `publisher_connection_duration_seconds` - session length on close
//! - `publisher_messages_received_total{type}` / `publisher_messages_sent_total{type}`
//! - `publisher_message_size_bytes{type,direction}` - frame sizes, `in` or `out`
//! - `publisher_message_processing_duration_seconds{type}` - handler latency
//! - `publisher_transactions_processed_total{chain_id}` - per-chain transaction requests
//! - `publisher_transaction_batch_size` - requests per batch
//! - `publisher_broadcasts_total`, `publisher_broadcast_recipients`, `publisher_broadcast_duration_seconds`
//! - `publisher_errors_total{type,operation}`
//! - `publisher_uptime_seconds`
//! - `publisher_cross_chain_transactions_total` - batches received
//! - `publisher_unique_chains{chain_id}` - set to 1 for each chain seen

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_histogram_vec,
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, Gauge, GaugeVec,
    Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Connections by lifecycle event
    pub static ref CONNECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "publisher_connections_total",
        "Total number of connections",
        &["type"]
    )
    .expect("Failed to create CONNECTIONS_TOTAL metric");

    /// Currently registered connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "publisher_connections_active",
        "Number of active connections"
    )
    .expect("Failed to create CONNECTIONS_ACTIVE metric");

    /// Session length, 1s to ~17min
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        "publisher_connection_duration_seconds",
        "Connection duration in seconds",
        vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0]
    )
    .expect("Failed to create CONNECTION_DURATION metric");

    pub static ref MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        "publisher_messages_received_total",
        "Total number of messages received",
        &["type"]
    )
    .expect("Failed to create MESSAGES_RECEIVED metric");

    pub static ref MESSAGES_SENT: IntCounterVec = register_int_counter_vec!(
        "publisher_messages_sent_total",
        "Total number of messages sent",
        &["type"]
    )
    .expect("Failed to create MESSAGES_SENT metric");

    /// Frame size, 100B to 100MB
    pub static ref MESSAGE_SIZE: HistogramVec = register_histogram_vec!(
        "publisher_message_size_bytes",
        "Message size in bytes",
        &["type", "direction"],
        vec![1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8]
    )
    .expect("Failed to create MESSAGE_SIZE metric");

    /// Handler latency, 1ms to ~1s
    pub static ref MESSAGE_PROCESSING_DURATION: HistogramVec = register_histogram_vec!(
        "publisher_message_processing_duration_seconds",
        "Message processing duration",
        &["type"],
        vec![0.001, 0.002, 0.004, 0.008, 0.016, 0.032, 0.064, 0.128, 0.256, 0.512]
    )
    .expect("Failed to create MESSAGE_PROCESSING_DURATION metric");

    pub static ref TRANSACTIONS_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "publisher_transactions_processed_total",
        "Total number of transactions processed",
        &["chain_id"]
    )
    .expect("Failed to create TRANSACTIONS_PROCESSED metric");

    pub static ref TRANSACTION_BATCH_SIZE: Histogram = register_histogram!(
        "publisher_transaction_batch_size",
        "Number of transactions in a batch",
        (0..20).map(|i| 1.0 + 5.0 * i as f64).collect::<Vec<_>>()
    )
    .expect("Failed to create TRANSACTION_BATCH_SIZE metric");

    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        "publisher_broadcasts_total",
        "Total number of broadcast operations"
    )
    .expect("Failed to create BROADCASTS_TOTAL metric");

    pub static ref BROADCAST_RECIPIENTS: Histogram = register_histogram!(
        "publisher_broadcast_recipients",
        "Number of recipients per broadcast",
        (0..20).map(|i| 5.0 * i as f64).collect::<Vec<_>>()
    )
    .expect("Failed to create BROADCAST_RECIPIENTS metric");

    pub static ref BROADCAST_DURATION: Histogram = register_histogram!(
        "publisher_broadcast_duration_seconds",
        "Broadcast operation duration",
        vec![0.001, 0.002, 0.004, 0.008, 0.016, 0.032, 0.064, 0.128, 0.256, 0.512]
    )
    .expect("Failed to create BROADCAST_DURATION metric");

    /// Errors labeled by error kind and the operation that hit them
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "publisher_errors_total",
        "Total number of errors",
        &["type", "operation"]
    )
    .expect("Failed to create ERRORS_TOTAL metric");

    pub static ref UPTIME: Gauge = register_gauge!(
        "publisher_uptime_seconds",
        "Uptime in seconds"
    )
    .expect("Failed to create UPTIME metric");

    pub static ref CROSS_CHAIN_TRANSACTIONS: IntCounter = register_int_counter!(
        "publisher_cross_chain_transactions_total",
        "Total number of cross-chain transactions"
    )
    .expect("Failed to create CROSS_CHAIN_TRANSACTIONS metric");

    pub static ref UNIQUE_CHAINS: GaugeVec = register_gauge_vec!(
        "publisher_unique_chains",
        "Number of unique chains seen",
        &["chain_id"]
    )
    .expect("Failed to create UNIQUE_CHAINS metric");
}

/// Record an admitted connection
pub fn record_connection_accepted() {
    CONNECTIONS_TOTAL.with_label_values(&["accepted"]).inc();
    CONNECTIONS_ACTIVE.inc();
}

/// Record a connection refused by the connection limit
pub fn record_connection_rejected() {
    CONNECTIONS_TOTAL.with_label_values(&["rejected"]).inc();
}

/// Record a connection teardown and its lifetime
pub fn record_connection_closed(duration_secs: f64) {
    CONNECTIONS_TOTAL.with_label_values(&["closed"]).inc();
    CONNECTIONS_ACTIVE.dec();
    CONNECTION_DURATION.observe(duration_secs);
}

/// Overwrite the active connection gauge with an observed registry size
pub fn set_active_connections(count: usize) {
    CONNECTIONS_ACTIVE.set(count as i64);
}

/// Record a decoded inbound frame
pub fn record_message_received(msg_type: &str, size_bytes: usize) {
    MESSAGES_RECEIVED.with_label_values(&[msg_type]).inc();
    MESSAGE_SIZE
        .with_label_values(&[msg_type, "in"])
        .observe(size_bytes as f64);
}

/// Record a frame written to a peer
pub fn record_message_sent(msg_type: &str, size_bytes: usize) {
    MESSAGES_SENT.with_label_values(&[msg_type]).inc();
    MESSAGE_SIZE
        .with_label_values(&[msg_type, "out"])
        .observe(size_bytes as f64);
}

pub fn record_processing_duration(msg_type: &str, seconds: f64) {
    MESSAGE_PROCESSING_DURATION
        .with_label_values(&[msg_type])
        .observe(seconds);
}

/// Record a received transaction batch
pub fn record_batch(tx_count: usize) {
    CROSS_CHAIN_TRANSACTIONS.inc();
    TRANSACTION_BATCH_SIZE.observe(tx_count as f64);
}

/// Record one transaction request for `chain_id`; `first_seen` marks a new chain
pub fn record_chain_transaction(chain_id: &str, first_seen: bool) {
    if first_seen {
        UNIQUE_CHAINS.with_label_values(&[chain_id]).set(1.0);
    }
    TRANSACTIONS_PROCESSED.with_label_values(&[chain_id]).inc();
}

pub fn record_broadcast_recipients(count: usize) {
    BROADCAST_RECIPIENTS.observe(count as f64);
}

/// Record a completed broadcast
pub fn record_broadcast(seconds: f64) {
    BROADCASTS_TOTAL.inc();
    BROADCAST_DURATION.observe(seconds);
}

/// Record an error with its kind label and operation
pub fn record_error(kind: &str, operation: &str) {
    ERRORS_TOTAL.with_label_values(&[kind, operation]).inc();
}

pub fn set_uptime(seconds: f64) {
    UPTIME.set(seconds);
}

/// Render every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Content type of [`gather`]'s output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
