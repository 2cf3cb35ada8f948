//! Process-wide single-flight guard for engine runs

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tallyboard_core::{RunPhase, TallyboardError, TallyboardResult};
use tracing::debug;

/// Guards the single run slot.
///
/// Acquisition is a non-blocking compare-exchange: a second caller gets
/// [`TallyboardError::Conflict`] immediately instead of waiting.
pub struct RunGuard {
    running: AtomicBool,
    phase: RwLock<RunPhase>,
    last_outcome: RwLock<Option<RunPhase>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            phase: RwLock::new(RunPhase::Idle),
            last_outcome: RwLock::new(None),
        }
    }

    /// Try to take the run slot
    pub fn try_acquire(self: &Arc<Self>) -> TallyboardResult<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TallyboardError::Conflict)?;

        *self.phase.write() = RunPhase::Acquiring;
        debug!("Run slot acquired");

        Ok(RunPermit {
            guard: Arc::clone(self),
            outcome: RunPhase::Failed,
        })
    }

    /// Whether a run currently holds the slot
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current phase of the in-flight run, `Idle` when none
    pub fn phase(&self) -> RunPhase {
        *self.phase.read()
    }

    /// How the most recent run ended
    pub fn last_outcome(&self) -> Option<RunPhase> {
        *self.last_outcome.read()
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared guard type
pub type SharedRunGuard = Arc<RunGuard>;

/// Holding a permit means holding the run slot. Dropping it releases the
/// slot, whatever path the run took.
pub struct RunPermit {
    guard: Arc<RunGuard>,
    outcome: RunPhase,
}

impl RunPermit {
    /// The engine process has been started
    pub fn spawned(&self) {
        *self.guard.phase.write() = RunPhase::Spawned;
    }

    /// The run's snapshot has been published
    pub fn published(&mut self) {
        *self.guard.phase.write() = RunPhase::Published;
        self.outcome = RunPhase::Published;
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        *self.guard.last_outcome.write() = Some(self.outcome);
        *self.guard.phase.write() = RunPhase::Idle;
        self.guard.running.store(false, Ordering::Release);
        debug!("Run slot released ({})", self.outcome);
    }
}
