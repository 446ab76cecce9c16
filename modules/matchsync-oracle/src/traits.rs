// Trait seams for the oracle's two external collaborators.
//
// MatchProvider: where match data comes from (scraper, file, stub).
// MatchBuffer: the capacity-bounded key/value store the oracle keeps in sync.
//
// Both are object-safe so the controller holds them as Arc<dyn ...> and tests
// swap in StubProvider / ScriptedBuffer without touching the network.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use matchsync_common::{BufferState, Match, OracleResult};

/// How often `contains_within` re-reads the buffer while waiting.
pub const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One provider snapshot. Ownership passes to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFeed {
    /// Concluded matches, ascending by date.
    pub past: Vec<Match>,
    /// Upcoming or live matches, conventionally chronological.
    pub future: Vec<Match>,
}

impl MatchFeed {
    pub fn new(past: Vec<Match>, future: Vec<Match>) -> Self {
        Self { past, future }
    }

    pub fn len(&self) -> usize {
        self.past.len() + self.future.len()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty() && self.future.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MatchProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MatchProvider: Send + Sync {
    /// Fetch past and future matches. Errors are `OracleError::FetchFailed`.
    async fn fetch(&self) -> OracleResult<MatchFeed>;
}

// ---------------------------------------------------------------------------
// MatchBuffer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MatchBuffer: Send + Sync {
    /// Current contents. Errors are `OracleError::BufferUnavailable`.
    async fn observe(&self) -> OracleResult<BufferState>;

    /// Insert or overwrite entries. Errors are `OracleError::WriteFailed`.
    async fn put(&self, entries: &BufferState) -> OracleResult<()>;

    /// Remove keys. Absent keys are ignored. Errors are `OracleError::WriteFailed`.
    async fn delete(&self, keys: &HashSet<String>) -> OracleResult<()>;

    /// Poll `observe` until it equals `target` or `timeout` elapses.
    /// Best effort: read errors count as "not yet".
    async fn contains_within(&self, target: &BufferState, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(state) = self.observe().await {
                if &state == target {
                    return true;
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(CONVERGENCE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
