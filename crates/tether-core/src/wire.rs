//! Tether wire format — the JSON frames exchanged with the peer.
//!
//! These types ARE the protocol. Field names and `type` tags are shared with
//! the peer implementation and must not change without a coordinated
//! release on both sides.
//!
//! Every transport carries frames as UTF-8 JSON text messages. A frame whose
//! serialized form exceeds the chunk threshold travels as a sequence of
//! [`ChunkEnvelope`]s instead (see [`crate::chunk`]); the router only ever
//! sees whole frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Frames ────────────────────────────────────────────────────────────────────

/// One logical message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    /// Outbound request. `payload` is opaque at this layer.
    Query {
        id: String,
        method: String,
        #[serde(default)]
        payload: Value,
    },

    /// Result of a query, correlated by `id`.
    /// `data` is present on success, `error` on failure.
    Response {
        id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },

    /// Liveness probe. Answered with a `Pong` carrying the same id.
    Ping { id: String },

    Pong { id: String },

    /// WebRTC session description offered by the peer.
    SignalOffer { offer: Value },

    /// Session description answering a `SignalOffer`.
    SignalAnswer { answer: Value },

    /// Negotiation failed. Never carries application data.
    SignalError { error: String },
}

/// Discriminant of a [`Frame`], used for handler registration and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Query,
    Response,
    Ping,
    Pong,
    SignalOffer,
    SignalAnswer,
    SignalError,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Query => "query",
            FrameKind::Response => "response",
            FrameKind::Ping => "ping",
            FrameKind::Pong => "pong",
            FrameKind::SignalOffer => "signal-offer",
            FrameKind::SignalAnswer => "signal-answer",
            FrameKind::SignalError => "signal-error",
        }
    }

    /// Inverse of [`FrameKind::as_str`].
    pub fn parse(tag: &str) -> Option<FrameKind> {
        const ALL: [FrameKind; 7] = [
            FrameKind::Query,
            FrameKind::Response,
            FrameKind::Ping,
            FrameKind::Pong,
            FrameKind::SignalOffer,
            FrameKind::SignalAnswer,
            FrameKind::SignalError,
        ];
        ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Query { .. } => FrameKind::Query,
            Frame::Response { .. } => FrameKind::Response,
            Frame::Ping { .. } => FrameKind::Ping,
            Frame::Pong { .. } => FrameKind::Pong,
            Frame::SignalOffer { .. } => FrameKind::SignalOffer,
            Frame::SignalAnswer { .. } => FrameKind::SignalAnswer,
            Frame::SignalError { .. } => FrameKind::SignalError,
        }
    }

    /// Correlation id, for frame types that carry one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Frame::Query { id, .. }
            | Frame::Response { id, .. }
            | Frame::Ping { id }
            | Frame::Pong { id } => Some(id),
            _ => None,
        }
    }

    /// Successful response carrying `data`.
    pub fn success(id: impl Into<String>, data: Value) -> Self {
        Frame::Response {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying a human-readable error.
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Frame::Response {
            id: id.into(),
            success: false,
            data: None,
            error: Some(Value::String(error.into())),
        }
    }
}

// ── Chunk envelope ────────────────────────────────────────────────────────────

/// One slice of a serialized frame that exceeded the chunk threshold.
///
/// `data` is a contiguous UTF-8 slice of the serialized frame. Concatenating
/// the `data` of indices `0..total` in order yields the original JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    #[serde(rename = "chunkOf")]
    pub chunk_of: String,
    pub index: u32,
    pub total: u32,
    pub data: String,
}

/// Key that distinguishes a chunk envelope from a frame.
pub const CHUNK_MARKER: &str = "chunkOf";

/// An inbound text message after envelope detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(Frame),
    Chunk(ChunkEnvelope),
    /// An object whose `type` is not a bridge frame type. Application
    /// traffic, left for registered handlers.
    Custom { kind: String, body: Value },
}

/// Parse a raw text message into a frame, a chunk envelope or a custom
/// message.
///
/// The text is parsed once into a JSON value; the presence of `chunkOf`
/// selects the envelope shape. A known `type` with a bad shape is an error,
/// not a custom message.
pub fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if value.get(CHUNK_MARKER).is_some() {
        return Ok(Inbound::Chunk(serde_json::from_value(value)?));
    }
    match value.get("type").and_then(Value::as_str) {
        Some(tag) if FrameKind::parse(tag).is_none() => Ok(Inbound::Custom {
            kind: tag.to_string(),
            body: value,
        }),
        _ => Ok(Inbound::Frame(serde_json::from_value(value)?)),
    }
}

/// Parse a raw text message that must be a whole frame.
pub fn parse_frame(text: &str) -> Result<Frame, serde_json::Error> {
    serde_json::from_str(text)
}
