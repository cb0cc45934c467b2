//! Message envelope types.
//!
//! Protobuf schema (field numbers are part of the wire contract):
//!
//! ```text
//! message Message            { string sender_id = 1; oneof payload { XTRequest xt_request = 2; } }
//! message XTRequest          { repeated TransactionRequest transactions = 1; }
//! message TransactionRequest { bytes chain_id = 1; repeated bytes transaction = 2; }
//! ```
//!
//! A payload tag this build does not know decodes to `payload: None`, which
//! [`Message::kind`] reports as [`PayloadKind::Unrecognized`].

/// Envelope carried by every frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Message {
    /// Identifier the submitting peer chose for itself.
    #[prost(string, tag = "1")]
    pub sender_id: String,
    /// Payload variant.
    #[prost(oneof = "message::Payload", tags = "2")]
    pub payload: Option<message::Payload>,
}

/// Nested types for [`Message`].
pub mod message {
    /// Known payload variants.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        /// Cross-chain transaction batch.
        #[prost(message, tag = "2")]
        XtRequest(super::XtRequest),
    }
}

/// Cross-chain transaction batch request.
#[derive(Clone, PartialEq, prost::Message)]
pub struct XtRequest {
    #[prost(message, repeated, tag = "1")]
    pub transactions: Vec<TransactionRequest>,
}

/// Transactions destined for a single chain.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionRequest {
    /// Opaque chain identifier.
    #[prost(bytes = "vec", tag = "1")]
    pub chain_id: Vec<u8>,
    /// Opaque transaction bytes.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub transaction: Vec<Vec<u8>>,
}

/// Classified view of a message payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadKind<'a> {
    /// Transaction batch to fan out.
    XtRequest(&'a XtRequest),
    /// Absent or unknown payload variant.
    Unrecognized,
}

impl Message {
    /// Build a transaction batch message.
    pub fn xt_request(sender_id: impl Into<String>, transactions: Vec<TransactionRequest>) -> Self {
        Self {
            sender_id: sender_id.into(),
            payload: Some(message::Payload::XtRequest(XtRequest { transactions })),
        }
    }

    /// Classify the payload.
    pub fn kind(&self) -> PayloadKind<'_> {
        match &self.payload {
            Some(message::Payload::XtRequest(req)) => PayloadKind::XtRequest(req),
            None => PayloadKind::Unrecognized,
        }
    }

    /// Label used for metrics and logs.
    pub fn type_label(&self) -> &'static str {
        match self.kind() {
            PayloadKind::XtRequest(_) => "xt_request",
            PayloadKind::Unrecognized => "unknown",
        }
    }
}

impl TransactionRequest {
    /// Create a transaction request for `chain_id`.
    pub fn new(chain_id: impl Into<Vec<u8>>, transaction: Vec<Vec<u8>>) -> Self {
        Self {
            chain_id: chain_id.into(),
            transaction,
        }
    }

    /// Chain identifier rendered as `0x`-prefixed lowercase hex.
    pub fn chain_label(&self) -> String {
        format_chain_id(&self.chain_id)
    }
}

/// Render a chain identifier as `0x`-prefixed lowercase hex.
///
/// # Example
///
/// ```
/// use shared_publisher::protocol::format_chain_id;
///
/// assert_eq!(format_chain_id(&[0x12, 0x34]), "0x1234");
/// assert_eq!(format_chain_id(&[]), "0x");
/// ```
pub fn format_chain_id(chain_id: &[u8]) -> String {
    format!("0x{}", hex::encode(chain_id))
}
