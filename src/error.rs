//! Error types for shared-publisher.

use std::net::SocketAddr;

use thiserror::Error;

use crate::connection::ConnectionId;

/// Main error type for all publisher operations.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame payload exceeds the configured maximum message size.
    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Payload bytes could not be parsed into a message envelope.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] prost::DecodeError),

    /// Message could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    /// Peer closed the stream (EOF), possibly in the middle of a frame.
    #[error("stream closed")]
    StreamClosed,

    /// No frame arrived within the read timeout.
    #[error("read timeout")]
    ReadTimeout,

    /// A frame could not be transmitted within the write timeout.
    #[error("write timeout")]
    WriteTimeout,

    /// The connection was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// `start()` called on a running server.
    #[error("server already running")]
    AlreadyRunning,

    /// `stop()` called on a stopped server.
    #[error("server not running")]
    NotRunning,

    /// Accepted socket rejected because the registry is full.
    #[error("connection limit exceeded: {current} >= {max}")]
    ConnectionLimitExceeded { current: usize, max: usize },

    /// Targeted send to a connection id that is not registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Message payload variant is not recognized.
    #[error("unknown message type")]
    UnknownMessageType,

    /// One or more recipient writes failed during a broadcast.
    #[error("broadcast failed for {failed} of {attempted} recipients: {first_error}")]
    Broadcast {
        failed: usize,
        attempted: usize,
        first_error: String,
    },

    /// The caller's cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// `stop()` deadline elapsed before all tasks finished.
    #[error("shutdown timed out")]
    ShutdownTimeout,

    /// Listening socket could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl PublisherError {
    /// Stable snake_case label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Encode(_) => "encode",
            Self::StreamClosed => "stream_closed",
            Self::ReadTimeout => "read_timeout",
            Self::WriteTimeout => "write_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::ConnectionLimitExceeded { .. } => "connection_limit",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::UnknownMessageType => "unknown_message_type",
            Self::Broadcast { .. } => "broadcast_failed",
            Self::Cancelled => "cancelled",
            Self::ShutdownTimeout => "shutdown_timeout",
            Self::Bind { .. } => "bind",
            Self::Config(_) | Self::ConfigParse(_) => "config",
        }
    }

    /// True for the ordinary ways a peer session ends.
    ///
    /// These are logged below error level by the read loop.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::StreamClosed | Self::ReadTimeout | Self::ConnectionClosed
        )
    }
}

/// Result type alias using PublisherError.
pub type Result<T> = std::result::Result<T, PublisherError>;
