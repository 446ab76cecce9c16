use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use matchsync_common::{winner_map, BufferState, OracleError, OracleResult, OracleSettings};

use crate::desired::construct_desired_state;
use crate::diff::{compute_overlap, StateDiff};
use crate::traits::{MatchBuffer, MatchFeed, MatchProvider};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for an [`Oracle`].
#[derive(Clone)]
pub struct OracleConfig {
    /// Source of truth. Only data from this provider is written.
    pub provider: Arc<dyn MatchProvider>,
    /// Optional cross-checks. If any of them disagrees with the primary
    /// provider on a match both know, the cycle writes nothing.
    pub verifiers: Vec<Arc<dyn MatchProvider>>,
    /// Upper bound for each verifier fetch.
    pub max_verify_time: Duration,
    /// Pause between two cycles.
    pub refresh_interval: Duration,
    /// How long concluded matches stay on the buffer.
    pub past_match_ttl: chrono::Duration,
    pub buffer_capacity: usize,
    /// Wait this long for the buffer to reflect a write. `None` skips the wait.
    pub convergence_timeout: Option<Duration>,
}

impl OracleConfig {
    pub fn new(provider: Arc<dyn MatchProvider>) -> Self {
        Self::from_settings(provider, &OracleSettings::default())
    }

    pub fn from_settings(provider: Arc<dyn MatchProvider>, settings: &OracleSettings) -> Self {
        Self {
            provider,
            verifiers: Vec::new(),
            max_verify_time: settings.max_verify_time(),
            refresh_interval: settings.refresh_interval(),
            past_match_ttl: settings.past_match_ttl(),
            buffer_capacity: settings.buffer_capacity,
            convergence_timeout: settings.convergence_timeout(),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_past_match_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.past_match_ttl = ttl;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_convergence_timeout(mut self, timeout: Duration) -> Self {
        self.convergence_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn MatchProvider>) -> Self {
        self.verifiers.push(verifier);
        self
    }

    pub fn with_max_verify_time(mut self, max: Duration) -> Self {
        self.max_verify_time = max;
        self
    }
}

// ---------------------------------------------------------------------------
// Phase / outcome / stats
// ---------------------------------------------------------------------------

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    BuildingDesired,
    Verifying,
    Diffing,
    Applying,
    AwaitingConvergence,
    Sleeping,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::BuildingDesired => write!(f, "building_desired"),
            Self::Verifying => write!(f, "verifying"),
            Self::Diffing => write!(f, "diffing"),
            Self::Applying => write!(f, "applying"),
            Self::AwaitingConvergence => write!(f, "awaiting_convergence"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of one fetch -> diff -> apply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Writes were submitted. `converged` is `None` when not checked.
    Applied {
        put: usize,
        deleted: usize,
        converged: Option<bool>,
    },
    /// Buffer already matched the desired state.
    Unchanged,
    /// Cycle abandoned; the next one starts from a fresh diff.
    Skipped(OracleError),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied {
                put,
                deleted,
                converged,
            } => {
                write!(f, "applied(put={put} deleted={deleted}")?;
                match converged {
                    Some(c) => write!(f, " converged={c})"),
                    None => write!(f, ")"),
                }
            }
            Self::Unchanged => write!(f, "unchanged"),
            Self::Skipped(e) => write!(f, "skipped({e})"),
        }
    }
}

/// Counters shared between the loop task and its owner.
#[derive(Debug, Default)]
struct OracleStats {
    cycles: AtomicU64,
    applied: AtomicU64,
    unchanged: AtomicU64,
    skipped: AtomicU64,
}

impl OracleStats {
    fn record(&self, outcome: &CycleOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CycleOutcome::Applied { .. } => &self.applied,
            CycleOutcome::Unchanged => &self.unchanged,
            CycleOutcome::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub applied: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} applied={} unchanged={} skipped={}",
            self.cycles, self.applied, self.unchanged, self.skipped
        )
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Keeps a [`MatchBuffer`] in line with what the provider reports.
///
/// `serve` spawns one background loop; `stop` cancels it and waits for it to
/// exit; `wait` only waits. Cancellation is observed between cycles and while
/// sleeping or awaiting convergence, never in the middle of a write.
pub struct Oracle {
    reconciler: Option<Reconciler>,
    stats: Arc<OracleStats>,
    phase: watch::Receiver<Phase>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Oracle {
    pub fn new(buffer: Arc<dyn MatchBuffer>, config: OracleConfig) -> Self {
        let stats = Arc::new(OracleStats::default());
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let reconciler = Reconciler {
            config,
            buffer,
            stats: stats.clone(),
            phase: phase_tx,
        };
        Self {
            reconciler: Some(reconciler),
            stats,
            phase: phase_rx,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Tie the loop to an outside shutdown signal. Cancelling `parent` stops
    /// the loop the same way `stop` does.
    ///
    /// # Panics
    ///
    /// If `serve` was already called.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        if self.reconciler.is_none() {
            panic!("Oracle::with_shutdown must be called before Oracle::serve");
        }
        self.cancel = parent.child_token();
        self
    }

    /// Start the control loop on the current tokio runtime. Returns at once.
    ///
    /// # Panics
    ///
    /// If called more than once, or outside a tokio runtime.
    pub fn serve(&mut self) {
        let Some(reconciler) = self.reconciler.take() else {
            panic!("Oracle::serve called twice on the same instance");
        };
        info!(
            refresh_interval = ?reconciler.config.refresh_interval,
            capacity = reconciler.config.buffer_capacity,
            verifiers = reconciler.config.verifiers.len(),
            "Oracle serving"
        );
        self.handle = Some(tokio::spawn(reconciler.run(self.cancel.clone())));
    }

    /// Cancel the loop and block until it has exited.
    ///
    /// # Panics
    ///
    /// If `serve` was never called.
    pub async fn stop(&mut self) {
        if self.reconciler.is_some() {
            panic!("need to call Oracle::serve before Oracle::stop");
        }
        self.cancel.cancel();
        self.join().await;
    }

    /// Block until the loop exits, without requesting cancellation.
    ///
    /// # Panics
    ///
    /// If `serve` was never called.
    pub async fn wait(&mut self) {
        if self.reconciler.is_some() {
            panic!("need to call Oracle::serve before Oracle::wait");
        }
        self.join().await;
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Oracle loop task failed");
            }
        }
    }
}

impl Drop for Oracle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Reconciler (owned by the loop task)
// ---------------------------------------------------------------------------

struct Reconciler {
    config: OracleConfig,
    buffer: Arc<dyn MatchBuffer>,
    stats: Arc<OracleStats>,
    phase: watch::Sender<Phase>,
}

impl Reconciler {
    async fn run(self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let outcome = self.cycle(&cancel).await;
            match &outcome {
                CycleOutcome::Applied { .. } => info!(%outcome, "Oracle cycle complete"),
                CycleOutcome::Unchanged => debug!(%outcome, "Oracle cycle complete"),
                CycleOutcome::Skipped(e) => warn!(error = %e, "Oracle cycle skipped"),
            }
            self.stats.record(&outcome);

            self.enter(Phase::Sleeping);
            if !self.sleep(&cancel).await {
                break;
            }
        }
        self.enter(Phase::Stopped);
        info!(stats = %self.stats.snapshot(), "Oracle stopped");
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        self.enter(Phase::Fetching);
        let MatchFeed { mut past, future } = match self.config.provider.fetch().await {
            Ok(feed) => feed,
            Err(e) => return CycleOutcome::Skipped(e),
        };

        self.enter(Phase::BuildingDesired);
        past.sort_by_key(|m| m.date);
        let desired = construct_desired_state(
            past,
            future,
            self.config.past_match_ttl,
            self.config.buffer_capacity,
            Utc::now(),
        );
        let desired = winner_map(&desired);

        if !self.config.verifiers.is_empty() {
            self.enter(Phase::Verifying);
            if let Err(e) = self.verify(&desired).await {
                return CycleOutcome::Skipped(e);
            }
        }

        self.enter(Phase::Diffing);
        let observed = match self.buffer.observe().await {
            Ok(state) => state,
            Err(e) => return CycleOutcome::Skipped(e),
        };
        let diff = compute_overlap(&desired, &observed);
        if diff.is_empty() {
            return CycleOutcome::Unchanged;
        }

        self.enter(Phase::Applying);
        if let Err(e) = self.apply(&diff).await {
            return CycleOutcome::Skipped(e);
        }

        let converged = match self.config.convergence_timeout {
            Some(timeout) => {
                self.enter(Phase::AwaitingConvergence);
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    converged = self.buffer.contains_within(&desired, timeout) => Some(converged),
                }
            }
            None => None,
        };

        CycleOutcome::Applied {
            put: diff.to_put.len(),
            deleted: diff.to_delete.len(),
            converged,
        }
    }

    /// Deletes go out before puts so a rewritten key never meets its stale
    /// entry. A failed delete skips the put.
    async fn apply(&self, diff: &StateDiff<String, String>) -> OracleResult<()> {
        if !diff.to_delete.is_empty() {
            self.buffer.delete(&diff.to_delete).await?;
        }
        if !diff.to_put.is_empty() {
            self.buffer.put(&diff.to_put).await?;
        }
        Ok(())
    }

    async fn verify(&self, desired: &BufferState) -> OracleResult<()> {
        for (i, verifier) in self.config.verifiers.iter().enumerate() {
            let feed = match tokio::time::timeout(self.config.max_verify_time, verifier.fetch()).await
            {
                Ok(Ok(feed)) => feed,
                Ok(Err(e)) => {
                    return Err(OracleError::VerificationFailed(format!("verifier {i}: {e}")))
                }
                Err(_) => {
                    return Err(OracleError::VerificationFailed(format!(
                        "verifier {i} did not answer within {:?}",
                        self.config.max_verify_time
                    )))
                }
            };

            let mut theirs = winner_map(&feed.past);
            theirs.extend(winner_map(&feed.future));
            let conflict = desired.iter().find_map(|(key, ours)| {
                theirs
                    .get(key)
                    .filter(|their| *their != ours)
                    .map(|their| (key, ours, their))
            });
            if let Some((key, ours, their)) = conflict {
                return Err(OracleError::VerificationFailed(format!(
                    "verifier {i} disagrees on match {key}: primary '{ours}', verifier '{their}'"
                )));
            }
        }
        Ok(())
    }

    /// Returns false when cancelled.
    async fn sleep(&self, cancel: &CancellationToken) -> bool {
        if self.config.refresh_interval.is_zero() {
            tokio::task::yield_now().await;
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.refresh_interval) => true,
        }
    }

    fn enter(&self, phase: Phase) {
        debug!(%phase, "Oracle phase");
        self.phase.send_replace(phase);
    }
}
