// Test doubles for the oracle.
//
// - StubProvider (MatchProvider): settable past/future, failure switch, fetch counter
// - ScriptedBuffer (MatchBuffer): MemoryBuffer plus failure switches and an op log
//
// Plus constructors for Match values used across unit and integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use matchsync_common::{BufferState, EventGroup, Match, MatchResult, OracleError, OracleResult, Team};

use crate::buffer::MemoryBuffer;
use crate::traits::{MatchBuffer, MatchFeed, MatchProvider};

// ---------------------------------------------------------------------------
// Match constructors
// ---------------------------------------------------------------------------

fn base_match(id: i64, date: DateTime<Utc>, result: MatchResult) -> Match {
    Match {
        id,
        team1: Team::new("Astralis", 6665),
        team2: Team::new("Natus Vincere", 4608),
        date,
        event: EventGroup {
            name: "IEM Fall 2021 Europe".to_string(),
            id: 6136,
            logo_url: None,
        },
        format: "bo3".to_string(),
        result,
        live: false,
    }
}

/// A match won by team 1 at `date`.
pub fn concluded_at(id: i64, date: DateTime<Utc>) -> Match {
    base_match(id, date, MatchResult::won_by("Astralis", "2-1"))
}

/// An undecided match scheduled at `date`.
pub fn upcoming_at(id: i64, date: DateTime<Utc>) -> Match {
    base_match(id, date, MatchResult::undecided())
}

/// A match with the given winner ("" = undecided), dated now.
pub fn decided(id: i64, winner: &str) -> Match {
    let result = if winner.is_empty() {
        MatchResult::undecided()
    } else {
        MatchResult::won_by(winner, "2-0")
    };
    base_match(id, Utc::now(), result)
}

// ---------------------------------------------------------------------------
// StubProvider
// ---------------------------------------------------------------------------

/// Returns whatever was last handed to `set_matches`. Fetching before any
/// matches were set is an error, as is fetching while `set_failing(true)`.
#[derive(Default)]
pub struct StubProvider {
    feed: Mutex<Option<MatchFeed>>,
    failing: AtomicBool,
    fetches: AtomicU64,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matches(past: Vec<Match>, future: Vec<Match>) -> Self {
        let stub = Self::new();
        stub.set_matches(past, future);
        stub
    }

    pub fn set_matches(&self, past: Vec<Match>, future: Vec<Match>) {
        *self.feed.lock().unwrap() = Some(MatchFeed::new(past, future));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchProvider for StubProvider {
    async fn fetch(&self) -> OracleResult<MatchFeed> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(OracleError::FetchFailed("stub provider set to fail".to_string()));
        }
        self.feed
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| OracleError::FetchFailed("stub provider has not been assigned".to_string()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedBuffer
// ---------------------------------------------------------------------------

/// A write as the buffer received it. Keys are sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferOp {
    Delete(Vec<String>),
    Put(Vec<String>),
}

/// `MemoryBuffer` with knobs for failure paths.
pub struct ScriptedBuffer {
    inner: MemoryBuffer,
    ops: Mutex<Vec<BufferOp>>,
    fail_observe: AtomicBool,
    fail_writes: AtomicBool,
    fail_puts: AtomicBool,
    discard_writes: AtomicBool,
}

impl ScriptedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self::from_memory(MemoryBuffer::new(capacity))
    }

    pub fn with_state(capacity: usize, state: BufferState) -> Self {
        Self::from_memory(MemoryBuffer::with_state(capacity, state))
    }

    fn from_memory(inner: MemoryBuffer) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            fail_observe: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            discard_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_observe(&self, fail: bool) {
        self.fail_observe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail puts only; deletes still go through.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Accept writes but never apply them, so the buffer never converges.
    pub fn set_discard_writes(&self, discard: bool) {
        self.discard_writes.store(discard, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<BufferOp> {
        self.ops.lock().unwrap().clone()
    }

    pub async fn snapshot(&self) -> BufferState {
        self.inner.snapshot().await
    }

    fn record(&self, op: BufferOp) {
        self.ops.lock().unwrap().push(op);
    }
}

fn sorted<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.cloned().collect();
    keys.sort();
    keys
}

#[async_trait]
impl MatchBuffer for ScriptedBuffer {
    async fn observe(&self) -> OracleResult<BufferState> {
        if self.fail_observe.load(Ordering::SeqCst) {
            return Err(OracleError::BufferUnavailable("scripted observe failure".to_string()));
        }
        self.inner.observe().await
    }

    async fn put(&self, entries: &BufferState) -> OracleResult<()> {
        self.record(BufferOp::Put(sorted(entries.keys())));
        if self.fail_writes.load(Ordering::SeqCst) || self.fail_puts.load(Ordering::SeqCst) {
            return Err(OracleError::WriteFailed("scripted put failure".to_string()));
        }
        if self.discard_writes.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.put(entries).await
    }

    async fn delete(&self, keys: &HashSet<String>) -> OracleResult<()> {
        self.record(BufferOp::Delete(sorted(keys.iter())));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OracleError::WriteFailed("scripted delete failure".to_string()));
        }
        if self.discard_writes.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.delete(keys).await
    }
}
