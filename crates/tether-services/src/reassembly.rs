//! Chunk reassembly — buffers partial chunk sets until they complete.
//!
//! Sets are keyed by message id. An envelope is validated against the limits
//! before any buffer exists for its id, so a hostile `total` never allocates.
//! Sets that stall are evicted by [`ReassemblyStore::sweep`].

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use tether_core::{ChunkEnvelope, Limits, ProtocolError};

/// Result of feeding one envelope to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accept {
    /// The set is complete. Carries the reconstructed frame text.
    Complete(String),
    Incomplete { received: u32, total: u32 },
    /// An index that was already stored. The first copy is kept.
    Duplicate,
}

struct ChunkSet {
    total: u32,
    received: u32,
    slots: Vec<Option<String>>,
    first_seen: Instant,
}

impl ChunkSet {
    fn new(total: u32) -> Self {
        Self {
            total,
            received: 0,
            slots: vec![None; total as usize],
            first_seen: Instant::now(),
        }
    }

    fn insert(&mut self, index: u32, data: String) -> bool {
        let slot = &mut self.slots[index as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(data);
        self.received += 1;
        true
    }

    fn is_complete(&self) -> bool {
        self.received == self.total
    }

    fn assemble(self) -> String {
        self.slots.into_iter().flatten().collect()
    }
}

pub struct ReassemblyStore {
    sets: DashMap<String, ChunkSet>,
    limits: Limits,
}

impl ReassemblyStore {
    pub fn new(limits: Limits) -> Self {
        Self {
            sets: DashMap::new(),
            limits,
        }
    }

    /// Store one envelope. Rejections leave the store unchanged.
    pub fn accept(&self, chunk: ChunkEnvelope) -> Result<Accept, ProtocolError> {
        self.limits.check_envelope(&chunk)?;

        if chunk.total == 1 {
            return Ok(Accept::Complete(chunk.data));
        }

        // Checked outside the entry lock: len() visits every shard.
        if !self.sets.contains_key(&chunk.chunk_of) {
            let open = self.sets.len();
            if open >= self.limits.max_open_chunk_sets {
                return Err(ProtocolError::TooManyOpenSets {
                    message_id: chunk.chunk_of,
                    open,
                });
            }
        }

        let ChunkEnvelope {
            chunk_of,
            index,
            total,
            data,
        } = chunk;

        match self.sets.entry(chunk_of) {
            Entry::Occupied(mut occupied) => {
                let expected = occupied.get().total;
                if expected != total {
                    return Err(ProtocolError::TotalMismatch {
                        message_id: occupied.key().clone(),
                        expected,
                        got: total,
                    });
                }
                let set = occupied.get_mut();
                if !set.insert(index, data) {
                    tracing::debug!(message_id = %occupied.key(), index, "duplicate chunk ignored");
                    return Ok(Accept::Duplicate);
                }
                if set.is_complete() {
                    let (message_id, set) = occupied.remove_entry();
                    tracing::debug!(%message_id, total, "chunk set complete");
                    return Ok(Accept::Complete(set.assemble()));
                }
                Ok(Accept::Incomplete {
                    received: set.received,
                    total,
                })
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(message_id = %vacant.key(), total, "chunk set opened");
                let mut set = ChunkSet::new(total);
                set.insert(index, data);
                vacant.insert(set);
                Ok(Accept::Incomplete { received: 1, total })
            }
        }
    }

    /// Evict sets first seen more than the chunk timeout ago.
    pub fn sweep(&self) -> usize {
        let timeout = Duration::from_millis(self.limits.chunk_timeout_ms);
        let before = self.sets.len();
        self.sets.retain(|message_id, set| {
            let keep = set.first_seen.elapsed() < timeout;
            if !keep {
                tracing::debug!(
                    %message_id,
                    received = set.received,
                    total = set.total,
                    "chunk set timed out, evicting"
                );
            }
            keep
        });
        before.saturating_sub(self.sets.len())
    }

    /// Drop every open set. Message ids are scoped to a connection.
    pub fn clear(&self) -> usize {
        let open = self.sets.len();
        self.sets.clear();
        open
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
