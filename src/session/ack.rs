//! Chunk ack tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;

/// A tracker over unacked chunks emitted to a session's client.
///
/// Acks are atomic at chunk granularity: taking a chunk yields all of its event offsets
/// exactly once, and a second take of the same chunk ID is a no-op. Chunks whose ack
/// deadline passes are pruned; their events are requeued by the consumer's own deadline
/// sweep, so a late ack after pruning is simply ignored.
pub struct AckTracker {
    config: Arc<Config>,
    chunks: Mutex<HashMap<Uuid, PendingChunk>>,
}

struct PendingChunk {
    offsets: Vec<u64>,
    deadline: Instant,
}

impl AckTracker {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, chunks: Mutex::new(HashMap::new()) }
    }

    /// Record an emitted chunk along with the offsets of its events.
    pub fn insert(&self, chunk_id: Uuid, offsets: Vec<u64>) {
        let deadline = Instant::now() + self.config.ack_timeout();
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks.insert(chunk_id, PendingChunk { offsets, deadline });
    }

    /// Take the offsets of the given chunk, if it is still tracked.
    pub fn take(&self, chunk_id: &Uuid) -> Option<Vec<u64>> {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks.remove(chunk_id).map(|chunk| chunk.offsets)
    }

    /// Prune all chunks whose ack deadline has passed, returning the number pruned.
    pub fn expire(&self) -> usize {
        let now = Instant::now();
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.retain(|_, chunk| chunk.deadline > now);
        before - chunks.len()
    }

    /// The number of currently tracked chunks.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
