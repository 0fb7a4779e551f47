//! Chunk codec — splits oversized frames into size-bounded envelopes.
//!
//! A serialized frame at or below `chunk_size` bytes is sent as-is. Larger
//! frames are cut into ordered slices of at most `chunk_size` bytes (on UTF-8
//! character boundaries) and each slice travels inside a [`ChunkEnvelope`].
//! Inbound envelopes are validated here before anything is buffered; the
//! buffering itself lives in the reassembly store.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::wire::{ChunkEnvelope, Frame};

/// Maximum bytes of serialized frame carried by one chunk (50 KiB).
/// Leaves headroom under the frame ceiling for the envelope and escaping.
pub const CHUNK_SIZE: usize = 50 * 1024;

/// Hard per-message ceiling imposed by the peer-channel transport (64 KiB).
pub const FRAME_CEILING: usize = 64 * 1024;

/// Upper bound on `total` for one message (~50 MB reassembled).
pub const MAX_CHUNKS_PER_MESSAGE: u32 = 1000;

/// Partial chunk sets older than this are evicted.
pub const CHUNK_TIMEOUT_MS: u64 = 30_000;

/// Period of the reassembly eviction sweep.
pub const SWEEP_INTERVAL_MS: u64 = 10_000;

/// Deadline applied to a query when the caller gives none.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;

/// Cap on simultaneously open chunk sets.
pub const MAX_OPEN_CHUNK_SETS: usize = 64;

// ── Limits ────────────────────────────────────────────────────────────────────

/// Capacity limits shared by the encoder and the reassembly store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub chunk_size: usize,
    pub frame_ceiling: usize,
    pub max_chunks_per_message: u32,
    pub chunk_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub query_timeout_ms: u64,
    pub max_open_chunk_sets: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            frame_ceiling: FRAME_CEILING,
            max_chunks_per_message: MAX_CHUNKS_PER_MESSAGE,
            chunk_timeout_ms: CHUNK_TIMEOUT_MS,
            sweep_interval_ms: SWEEP_INTERVAL_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            max_open_chunk_sets: MAX_OPEN_CHUNK_SETS,
        }
    }
}

impl Limits {
    /// Reject combinations the codec cannot honour.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".into());
        }
        if self.chunk_size >= self.frame_ceiling {
            return Err(format!(
                "chunk_size ({}) must be below frame_ceiling ({})",
                self.chunk_size, self.frame_ceiling
            ));
        }
        if self.max_chunks_per_message == 0 {
            return Err("max_chunks_per_message must be greater than zero".into());
        }
        if self.chunk_timeout_ms == 0 || self.sweep_interval_ms == 0 {
            return Err("chunk timeout and sweep interval must be non-zero".into());
        }
        if self.query_timeout_ms == 0 {
            return Err("query_timeout_ms must be greater than zero".into());
        }
        if self.max_open_chunk_sets == 0 {
            return Err("max_open_chunk_sets must be greater than zero".into());
        }
        Ok(())
    }

    /// Validate an inbound envelope against the limits.
    ///
    /// Called before any buffer is allocated for its message id.
    pub fn check_envelope(&self, chunk: &ChunkEnvelope) -> Result<(), ProtocolError> {
        if chunk.total > self.max_chunks_per_message {
            return Err(ProtocolError::ChunkBombRejected {
                message_id: chunk.chunk_of.clone(),
                total: chunk.total,
                max: self.max_chunks_per_message,
            });
        }
        if chunk.total == 0 || chunk.index >= chunk.total {
            return Err(ProtocolError::IndexOutOfRange {
                message_id: chunk.chunk_of.clone(),
                index: chunk.index,
                total: chunk.total,
            });
        }
        if chunk.data.len() > self.chunk_size {
            return Err(ProtocolError::ChunkTooLarge {
                message_id: chunk.chunk_of.clone(),
                index: chunk.index,
                len: chunk.data.len(),
                max: self.chunk_size,
            });
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Outbound framing failures. Nothing has been transmitted when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("message needs {total} chunks, limit is {max}")]
    TooManyChunks { total: usize, max: u32 },
    #[error("chunk envelope is {len} bytes, transport ceiling is {ceiling}")]
    FrameCeilingExceeded { len: usize, ceiling: usize },
    #[error("failed to serialize frame: {0}")]
    Serialize(String),
}

/// Inbound envelope rejections. The offending chunk is dropped; the
/// connection is preserved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("chunk set {message_id} declares {total} chunks, limit is {max}")]
    ChunkBombRejected {
        message_id: String,
        total: u32,
        max: u32,
    },
    #[error("chunk {index} out of range for {message_id} (total {total})")]
    IndexOutOfRange {
        message_id: String,
        index: u32,
        total: u32,
    },
    #[error("chunk {index} of {message_id} is {len} bytes, limit is {max}")]
    ChunkTooLarge {
        message_id: String,
        index: u32,
        len: usize,
        max: usize,
    },
    #[error("chunk for {message_id} declares total {got}, set was opened with {expected}")]
    TotalMismatch {
        message_id: String,
        expected: u32,
        got: u32,
    },
    #[error("{open} chunk sets already open, refusing {message_id}")]
    TooManyOpenSets { message_id: String, open: usize },
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// Frames outbound messages, splitting the ones above the chunk threshold.
///
/// Message ids are unique per encoder instance.
#[derive(Debug)]
pub struct ChunkCodec {
    limits: Limits,
    next_message_id: AtomicU64,
}

impl ChunkCodec {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            next_message_id: AtomicU64::new(1),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Serialize `frame` and return the wire messages that carry it, in order.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<String>, ChunkError> {
        let text = serde_json::to_string(frame).map_err(|e| ChunkError::Serialize(e.to_string()))?;
        self.encode_text(text)
    }

    /// Split already-serialized frame text.
    ///
    /// Each slice holds at most `chunk_size` raw bytes, and its envelope,
    /// with `data` escaped, must fit under `frame_ceiling`. Quote-heavy text
    /// therefore yields shorter slices than plain ASCII.
    pub fn encode_text(&self, text: String) -> Result<Vec<String>, ChunkError> {
        if text.len() <= self.limits.chunk_size {
            return Ok(vec![text]);
        }

        let message_id = format!(
            "m{}",
            self.next_message_id.fetch_add(1, Ordering::Relaxed)
        );
        let budget = self
            .limits
            .frame_ceiling
            .saturating_sub(envelope_overhead(&message_id)?);

        let slices = split_escaped(&text, self.limits.chunk_size, budget).ok_or(
            ChunkError::FrameCeilingExceeded {
                len: text.len(),
                ceiling: self.limits.frame_ceiling,
            },
        )?;
        let total = slices.len();
        if total > self.limits.max_chunks_per_message as usize {
            return Err(ChunkError::TooManyChunks {
                total,
                max: self.limits.max_chunks_per_message,
            });
        }

        let mut out = Vec::with_capacity(total);
        for (index, data) in slices.into_iter().enumerate() {
            let envelope = ChunkEnvelope {
                chunk_of: message_id.clone(),
                index: index as u32,
                total: total as u32,
                data: data.to_string(),
            };
            let wire =
                serde_json::to_string(&envelope).map_err(|e| ChunkError::Serialize(e.to_string()))?;
            if wire.len() > self.limits.frame_ceiling {
                return Err(ChunkError::FrameCeilingExceeded {
                    len: wire.len(),
                    ceiling: self.limits.frame_ceiling,
                });
            }
            out.push(wire);
        }
        Ok(out)
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

/// Wire bytes of an envelope for `message_id` with empty `data` and the
/// widest possible index and total.
fn envelope_overhead(message_id: &str) -> Result<usize, ChunkError> {
    let empty = ChunkEnvelope {
        chunk_of: message_id.to_string(),
        index: u32::MAX,
        total: u32::MAX,
        data: String::new(),
    };
    serde_json::to_string(&empty)
        .map(|wire| wire.len())
        .map_err(|e| ChunkError::Serialize(e.to_string()))
}

/// Bytes `c` occupies inside a JSON string literal.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Cut `text` on character boundaries into slices of at most `max_raw`
/// bytes whose escaped form is at most `max_escaped` bytes. `None` when a
/// single character does not fit.
fn split_escaped(text: &str, max_raw: usize, max_escaped: usize) -> Option<Vec<&str>> {
    let mut slices = Vec::with_capacity(text.len().div_ceil(max_raw.max(1)));
    let mut start = 0;
    let mut raw = 0;
    let mut escaped = 0;
    for (at, c) in text.char_indices() {
        let (r, e) = (c.len_utf8(), escaped_len(c));
        if raw + r > max_raw || escaped + e > max_escaped {
            if raw == 0 {
                return None;
            }
            slices.push(&text[start..at]);
            start = at;
            raw = 0;
            escaped = 0;
        }
        if r > max_raw || e > max_escaped {
            return None;
        }
        raw += r;
        escaped += e;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }
    Some(slices)
}
