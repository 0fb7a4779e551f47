//! Errors that cross component boundaries.
//!
//! [`QueryError`] is the only error a `query()` caller ever sees. Framing
//! and reassembly errors live next to the codec in [`crate::chunk`].

use serde_json::Value;

use crate::chunk::ChunkError;

/// Outcome of a failed query or ping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("no peer connected")]
    NotConnected,
    #[error("query {id} ({method}) timed out after {timeout_ms}ms")]
    Timeout {
        id: String,
        method: String,
        timeout_ms: u64,
    },
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("peer reported failure: {0}")]
    Remote(Value),
    #[error("query method must not be empty")]
    InvalidMethod,
    #[error(transparent)]
    Encode(#[from] ChunkError),
}

impl QueryError {
    /// Short stable name, used by the control API.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::NotConnected => "not_connected",
            QueryError::Timeout { .. } => "timeout",
            QueryError::ConnectionClosed => "connection_closed",
            QueryError::Remote(_) => "remote",
            QueryError::InvalidMethod => "invalid_method",
            QueryError::Encode(_) => "encode",
        }
    }
}

/// Outbound write through the connection slot failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("no peer connected")]
    NotConnected,
    #[error("transport {0} closed while writing")]
    WriteFailed(u64),
}

impl From<SlotError> for QueryError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::NotConnected => QueryError::NotConnected,
            SlotError::WriteFailed(_) => QueryError::ConnectionClosed,
        }
    }
}

/// Peer-channel negotiation failures.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("malformed offer: {0}")]
    MalformedOffer(String),
    #[error("peer connection setup failed: {0}")]
    Setup(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl SignalingError {
    /// Malformed offers are the caller's fault; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SignalingError::MalformedOffer(_))
    }
}
