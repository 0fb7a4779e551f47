//! Pending-query table — in-flight request ids and their completions.
//!
//! Every entry leaves the table exactly once: through a matching response,
//! its deadline, or bulk rejection when the connection it was sent on goes
//! away. Whoever removes the entry owns its completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use tether_core::QueryError;

pub type Outcome = Result<Value, QueryError>;

pub struct PendingEntry {
    pub method: String,
    /// Transport the query was written to.
    pub connection_id: u64,
    pub created_at: Instant,
    pub deadline: Instant,
    completion: oneshot::Sender<Outcome>,
}

impl PendingEntry {
    fn complete(self, outcome: Outcome) {
        // The waiter may already have given up.
        let _ = self.completion.send(outcome);
    }
}

struct Inner {
    entries: HashMap<String, PendingEntry>,
    /// Highest connection id whose loss has been processed. Registrations
    /// scoped to it or anything older fail immediately.
    closed_through: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingStatus {
    pub count: usize,
    pub oldest_age_ms: Option<u64>,
    pub methods: Vec<String>,
}

pub struct PendingTable {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                closed_through: 0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Next correlation id. Decimal, increasing, never reused.
    pub fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Register `id` for a query sent on `connection_id`.
    pub async fn register(
        &self,
        id: &str,
        method: &str,
        connection_id: u64,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Outcome>, QueryError> {
        let mut inner = self.inner.lock().await;
        if connection_id <= inner.closed_through {
            return Err(QueryError::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        inner.entries.insert(
            id.to_string(),
            PendingEntry {
                method: method.to_string(),
                connection_id,
                created_at: now,
                deadline: now + timeout,
                completion: tx,
            },
        );
        tracing::trace!(id, method, connection = connection_id, "query registered");
        Ok(rx)
    }

    /// Complete the entry for `id`. Returns false if nothing was waiting.
    pub async fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        let entry = self.inner.lock().await.entries.remove(id);
        match entry {
            Some(entry) => {
                tracing::debug!(
                    id,
                    method = %entry.method,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "query resolved"
                );
                entry.complete(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove without completing. Used by the waiter on its own deadline.
    pub async fn remove(&self, id: &str) -> Option<PendingEntry> {
        self.inner.lock().await.entries.remove(id)
    }

    /// Reject every entry sent on `connection_id` or an older transport.
    ///
    /// Drains and marks the connection closed under one lock, so no
    /// registration for it can slip in afterwards. Entries belonging to a
    /// newer transport are left alone; ids increase, so queries written to a
    /// socket that handed over to a peer channel are covered by the channel's
    /// loss.
    pub async fn reject_all(&self, connection_id: u64, error: QueryError) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut inner = self.inner.lock().await;
            inner.closed_through = inner.closed_through.max(connection_id);
            let ids: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.connection_id <= connection_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| inner.entries.remove(id))
                .collect()
        };
        let count = drained.len();
        for entry in drained {
            entry.complete(Err(error.clone()));
        }
        if count > 0 {
            tracing::info!(count, connection = connection_id, error = %error, "rejected pending queries");
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn status(&self) -> PendingStatus {
        let inner = self.inner.lock().await;
        let oldest = inner.entries.values().map(|e| e.created_at).min();
        let mut methods: Vec<String> = inner.entries.values().map(|e| e.method.clone()).collect();
        methods.sort();
        methods.dedup();
        PendingStatus {
            count: inner.entries.len(),
            oldest_age_ms: oldest.map(|t| t.elapsed().as_millis() as u64),
            methods,
        }
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}
