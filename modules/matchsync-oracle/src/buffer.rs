use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use matchsync_common::{BufferState, OracleError, OracleResult};

use crate::traits::MatchBuffer;

/// In-process, capacity-bounded buffer.
///
/// Stands in for the remote ledger when running the oracle as a dry run, and
/// backs the scripted buffer used in tests. Writes are visible immediately.
pub struct MemoryBuffer {
    capacity: usize,
    state: RwLock<BufferState>,
}

impl MemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: RwLock::new(BufferState::new()),
        }
    }

    pub fn with_state(capacity: usize, state: BufferState) -> Self {
        Self {
            capacity,
            state: RwLock::new(state),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn snapshot(&self) -> BufferState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl MatchBuffer for MemoryBuffer {
    async fn observe(&self) -> OracleResult<BufferState> {
        Ok(self.snapshot().await)
    }

    async fn put(&self, entries: &BufferState) -> OracleResult<()> {
        let mut state = self.state.write().await;
        let new_keys = entries.keys().filter(|k| !state.contains_key(*k)).count();
        if state.len() + new_keys > self.capacity {
            return Err(OracleError::WriteFailed(format!(
                "put of {} entries ({new_keys} new) exceeds capacity {} (holding {})",
                entries.len(),
                self.capacity,
                state.len()
            )));
        }
        for (key, value) in entries {
            state.insert(key.clone(), value.clone());
        }
        debug!(put = entries.len(), size = state.len(), "MemoryBuffer put");
        Ok(())
    }

    async fn delete(&self, keys: &HashSet<String>) -> OracleResult<()> {
        let mut state = self.state.write().await;
        state.retain(|k, _| !keys.contains(k));
        debug!(deleted = keys.len(), size = state.len(), "MemoryBuffer delete");
        Ok(())
    }
}
