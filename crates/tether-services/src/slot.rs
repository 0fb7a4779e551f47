//! Connection slot — holds at most one established transport.
//!
//! The first transport to claim the slot wins. Later arrivals are turned
//! away without touching the holder. Releases are scoped by connection id,
//! so a rejected transport closing can never evict the one that won.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use tether_core::SlotError;

/// Queue depth between the bridge and a transport's writer task.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Socket,
    PeerChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Negotiating,
    Established,
}

/// Write side of one accepted transport.
///
/// Cheap to clone. Sends go to the transport's writer task, which owns the
/// actual socket or data channel.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    pub id: u64,
    pub kind: TransportKind,
    outbound: mpsc::Sender<String>,
}

impl TransportHandle {
    /// Queue one text message for the writer task.
    pub async fn send(&self, text: String) -> Result<(), SlotError> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| SlotError::WriteFailed(self.id))
    }

    /// Queue a sequence of messages, stopping at the first failure.
    pub async fn send_all(&self, texts: Vec<String>) -> Result<(), SlotError> {
        for text in texts {
            self.send(text).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Accepted,
    Rejected { holder: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub state: ConnectionState,
    pub kind: Option<TransportKind>,
    pub connection_id: Option<u64>,
    pub connected_for_ms: Option<u64>,
}

struct Held {
    handle: TransportHandle,
    since: Instant,
}

pub struct ConnectionSlot {
    current: Mutex<Option<Held>>,
    next_id: AtomicU64,
    negotiations: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            negotiations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Allocate a handle for a freshly accepted transport. Ids are unique and
    /// increasing for the life of the slot.
    pub fn new_handle(&self, kind: TransportKind, outbound: mpsc::Sender<String>) -> TransportHandle {
        TransportHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            outbound,
        }
    }

    /// Atomic check-and-set. Fails if any transport holds the slot.
    pub async fn claim(&self, handle: TransportHandle) -> Claim {
        let mut current = self.current.lock().await;
        if let Some(held) = current.as_ref() {
            tracing::info!(
                holder = held.handle.id,
                rejected = handle.id,
                kind = ?handle.kind,
                "connection slot occupied, rejecting transport"
            );
            return Claim::Rejected {
                holder: held.handle.id,
            };
        }
        tracing::info!(connection = handle.id, kind = ?handle.kind, "connection established");
        *current = Some(Held {
            handle,
            since: Instant::now(),
        });
        Claim::Accepted
    }

    /// Claim on behalf of a transport negotiated over connection `from`.
    ///
    /// Succeeds when the slot is empty or still held by `from`; the old
    /// holder is displaced and its later release becomes a no-op.
    pub async fn claim_handover(&self, handle: TransportHandle, from: u64) -> Claim {
        let mut current = self.current.lock().await;
        let previous = current.as_ref().map(|h| h.handle.id);
        if let Some(holder) = previous.filter(|id| *id != from) {
            tracing::info!(
                holder,
                rejected = handle.id,
                "handover refused, slot held by another transport"
            );
            return Claim::Rejected { holder };
        }
        tracing::info!(
            from = previous,
            to = handle.id,
            kind = ?handle.kind,
            "connection handed over"
        );
        *current = Some(Held {
            handle,
            since: Instant::now(),
        });
        Claim::Accepted
    }

    /// Clear the slot if `connection_id` holds it. Returns whether it did.
    pub async fn release(&self, connection_id: u64) -> bool {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|held| held.handle.id == connection_id)
        {
            *current = None;
            tracing::info!(connection = connection_id, "connection released");
            return true;
        }
        false
    }

    pub async fn current(&self) -> Option<TransportHandle> {
        self.current.lock().await.as_ref().map(|h| h.handle.clone())
    }

    pub async fn is_established(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Write through the current holder.
    pub async fn send(&self, text: String) -> Result<(), SlotError> {
        let handle = self.current().await.ok_or(SlotError::NotConnected)?;
        handle.send(text).await
    }

    pub async fn state(&self) -> ConnectionState {
        if self.is_established().await {
            ConnectionState::Established
        } else if self.negotiations.load(Ordering::Acquire) > 0 {
            ConnectionState::Negotiating
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Mark a peer-channel negotiation as in flight until the guard drops.
    pub fn begin_negotiation(&self) -> NegotiationGuard {
        self.negotiations.fetch_add(1, Ordering::AcqRel);
        NegotiationGuard {
            counter: self.negotiations.clone(),
        }
    }

    pub async fn status(&self) -> SlotStatus {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(held) => SlotStatus {
                state: ConnectionState::Established,
                kind: Some(held.handle.kind),
                connection_id: Some(held.handle.id),
                connected_for_ms: Some(held.since.elapsed().as_millis() as u64),
            },
            None => SlotStatus {
                state: if self.negotiations.load(Ordering::Acquire) > 0 {
                    ConnectionState::Negotiating
                } else {
                    ConnectionState::Disconnected
                },
                kind: None,
                connection_id: None,
                connected_for_ms: None,
            },
        }
    }
}

impl Default for ConnectionSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NegotiationGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for NegotiationGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
