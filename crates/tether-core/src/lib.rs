//! tether-core — wire frames, chunk codec, configuration and error types.
//! All other Tether crates depend on this one.

pub mod chunk;
pub mod config;
pub mod error;
pub mod wire;

pub use chunk::{ChunkCodec, ChunkError, Limits, ProtocolError};
pub use error::{QueryError, SignalingError, SlotError};
pub use wire::{ChunkEnvelope, Frame, FrameKind, Inbound};
