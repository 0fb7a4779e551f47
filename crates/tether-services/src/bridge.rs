//! Bridge — the query API and the state shared by every transport.
//!
//! One `Bridge` per process, built in `main` and passed to the servers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use tether_core::{ChunkCodec, ChunkError, Frame, Limits, QueryError};

use crate::pending::{Outcome, PendingStatus, PendingTable};
use crate::reassembly::ReassemblyStore;
use crate::slot::{ConnectionSlot, SlotStatus, TransportHandle};

#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub connection: SlotStatus,
    pub pending: PendingStatus,
    pub open_chunk_sets: usize,
    pub uptime_secs: u64,
    pub limits: Limits,
}

pub struct Bridge {
    pub slot: ConnectionSlot,
    pub pending: PendingTable,
    pub store: ReassemblyStore,
    pub codec: ChunkCodec,
    started_at: Instant,
}

impl Bridge {
    pub fn new(limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            slot: ConnectionSlot::new(),
            pending: PendingTable::new(),
            store: ReassemblyStore::new(limits.clone()),
            codec: ChunkCodec::new(limits),
            started_at: Instant::now(),
        })
    }

    pub fn limits(&self) -> &Limits {
        self.codec.limits()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.limits().query_timeout_ms)
    }

    /// Send `method` to the peer and wait for its response.
    ///
    /// Fails fast with `NotConnected` when no transport holds the slot; in
    /// that case nothing is registered or buffered.
    pub async fn query(
        &self,
        method: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, QueryError> {
        if method.trim().is_empty() {
            return Err(QueryError::InvalidMethod);
        }
        let handle = self.slot.current().await.ok_or(QueryError::NotConnected)?;
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());

        let id = self.pending.next_id();
        let frame = Frame::Query {
            id: id.clone(),
            method: method.to_string(),
            payload,
        };
        let wire = self.codec.encode(&frame)?;

        let rx = self.pending.register(&id, method, handle.id, timeout).await?;
        tracing::debug!(id = %id, method, messages = wire.len(), "sending query");
        if let Err(e) = handle.send_all(wire).await {
            self.pending.remove(&id).await;
            return Err(e.into());
        }

        self.wait(&id, method, rx, timeout).await
    }

    /// Round-trip a ping through the peer. Returns the measured RTT.
    pub async fn ping(&self, timeout: Option<Duration>) -> Result<Duration, QueryError> {
        let handle = self.slot.current().await.ok_or(QueryError::NotConnected)?;
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());

        let id = self.pending.next_id();
        let wire = self.codec.encode(&Frame::Ping { id: id.clone() })?;
        let rx = self.pending.register(&id, "ping", handle.id, timeout).await?;
        let started = Instant::now();
        if let Err(e) = handle.send_all(wire).await {
            self.pending.remove(&id).await;
            return Err(e.into());
        }

        self.wait(&id, "ping", rx, timeout).await?;
        Ok(started.elapsed())
    }

    async fn wait(
        &self,
        id: &str,
        method: &str,
        mut rx: oneshot::Receiver<Outcome>,
        timeout: Duration,
    ) -> Result<Value, QueryError> {
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(QueryError::ConnectionClosed)),
            Err(_) => {
                if self.pending.remove(id).await.is_some() {
                    tracing::warn!(id, method, timeout_ms = timeout.as_millis() as u64, "query timed out");
                    return Err(QueryError::Timeout {
                        id: id.to_string(),
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // Lost the race: the entry was completed just before removal.
                rx.await.unwrap_or(Err(QueryError::ConnectionClosed))
            }
        }
    }

    /// Encode `frame` and queue it on `conn`. Used for replies, which go back
    /// on the transport the request arrived on.
    pub async fn send_frame(&self, conn: &TransportHandle, frame: &Frame) -> Result<(), QueryError> {
        let wire = self.codec.encode(frame)?;
        conn.send_all(wire).await?;
        Ok(())
    }

    /// Queue a reply to a custom message. `message` is sent in wire shape,
    /// chunked like any frame when it is large.
    pub async fn send_raw(&self, conn: &TransportHandle, message: &Value) -> Result<(), QueryError> {
        let text = serde_json::to_string(message).map_err(|e| ChunkError::Serialize(e.to_string()))?;
        conn.send_all(self.codec.encode_text(text)?).await?;
        Ok(())
    }

    /// Tear down after transport `connection_id` closed.
    ///
    /// Only the slot holder's loss rejects pending queries and discards open
    /// chunk sets; a rejected or displaced transport closing changes nothing.
    pub async fn detach(&self, connection_id: u64) -> bool {
        if !self.slot.release(connection_id).await {
            return false;
        }
        self.pending
            .reject_all(connection_id, QueryError::ConnectionClosed)
            .await;
        let dropped = self.store.clear();
        if dropped > 0 {
            tracing::debug!(dropped, connection = connection_id, "discarded open chunk sets");
        }
        true
    }

    /// Evict stale chunk sets. Called by the daemon's sweep loop.
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    pub async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connection: self.slot.status().await,
            pending: self.pending.status().await,
            open_chunk_sets: self.store.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            limits: self.limits().clone(),
        }
    }
}
