//! tether-services — connection slot, query correlation, chunk reassembly,
//! routing and peer-channel signaling.
//!
//! Everything here is transport-agnostic except [`signaling`] and
//! [`peer_channel`], which speak WebRTC. The WebSocket listener lives in
//! tether-api and feeds the same [`connection::run_connection`] driver.

pub mod bridge;
pub mod connection;
pub mod handler;
pub mod peer_channel;
pub mod pending;
pub mod reassembly;
pub mod router;
pub mod signaling;
pub mod slot;

pub use bridge::{Bridge, BridgeStatus};
pub use connection::{run_connection, TransportEvent};
pub use handler::{Dispatched, FrameHandler, HandlerRegistry};
pub use pending::{PendingStatus, PendingTable};
pub use reassembly::{Accept, ReassemblyStore};
pub use router::Router;
pub use signaling::Signaler;
pub use slot::{Claim, ConnectionSlot, ConnectionState, SlotStatus, TransportHandle, TransportKind};
