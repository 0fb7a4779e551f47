//! Connection driver — one task per accepted transport.
//!
//! Transports push tagged events into a single channel; the driver consumes
//! them in arrival order and detaches the connection from the bridge when
//! the transport goes away.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::router::Router;
use crate::slot::TransportHandle;

/// Queue depth between a transport's reader and its driver.
pub const INBOUND_QUEUE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(String),
    Closed,
    Error(String),
}

/// Consume `events` until the transport closes, then release its slot.
pub async fn run_connection(
    router: Arc<Router>,
    handle: TransportHandle,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    tracing::debug!(connection = handle.id, kind = ?handle.kind, "connection driver started");
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message(text) => router.handle_inbound(&handle, &text).await,
            TransportEvent::Closed => break,
            TransportEvent::Error(e) => {
                tracing::warn!(connection = handle.id, error = %e, "transport error");
                break;
            }
        }
    }
    if router.bridge().detach(handle.id).await {
        tracing::info!(connection = handle.id, kind = ?handle.kind, "peer disconnected");
    } else {
        tracing::debug!(connection = handle.id, "non-holding transport closed");
    }
}
