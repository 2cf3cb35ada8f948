//! Node runtime combining all components

use std::sync::Arc;
use tallyboard_core::{
    NodeConfig, OutputDecoder, RunPhase, TallyEngine, TallyParams, TallyRecord, TallySnapshot,
    TallyboardError, TallyboardResult, Timestamp, TimingRecord, VoterId,
};
use tallyboard_engine::{ProcessEngine, RunGuard, RunPermit, SharedRunGuard, TableDecoder};
use tallyboard_ledger::{BulletinBoard, Ledger, SharedLedger};
use tracing::{info, warn};

/// Outcome of a published run
#[derive(Debug, Clone)]
pub struct TallyOutcome {
    pub snapshot: Arc<TallySnapshot>,
    /// Ledger-computed placeholder tally, empty when that mode is off
    pub placeholder_tally: Vec<TallyRecord>,
}

/// Receipt for a cast ballot
#[derive(Debug, Clone)]
pub struct CastReceipt {
    pub ballot_id: String,
    pub insertion_index: u64,
}

/// Point-in-time view of the node
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub running: bool,
    pub run_phase: RunPhase,
    pub last_outcome: Option<RunPhase>,
    pub generation: Option<u64>,
    pub ballot_count: usize,
    pub voter_count: usize,
}

/// Node runtime managing all components
pub struct NodeRuntime {
    config: NodeConfig,
    guard: SharedRunGuard,
    engine: Arc<dyn TallyEngine>,
    decoder: Arc<dyn OutputDecoder>,
    ledger: SharedLedger,
    started_at: Timestamp,
}

impl NodeRuntime {
    /// Create a runtime driving the configured engine process
    pub fn new(config: NodeConfig) -> Self {
        let engine = Arc::new(ProcessEngine::new(config.engine.clone()));
        Self::with_engine(config, engine)
    }

    /// Create a runtime around any engine implementation
    pub fn with_engine(config: NodeConfig, engine: Arc<dyn TallyEngine>) -> Self {
        Self {
            config,
            guard: Arc::new(RunGuard::new()),
            engine,
            decoder: Arc::new(TableDecoder),
            ledger: Arc::new(Ledger::new()),
            started_at: Timestamp::now(),
        }
    }

    /// Register a voter's trapdoor commitment
    pub fn register_voter(&self, voter_id: &str, trapdoor_commitment: &str) -> TallyboardResult<()> {
        require_non_empty("voter_id", voter_id)?;
        require_non_empty("trapdoor_commitment", trapdoor_commitment)?;

        self.ledger
            .register_voter(VoterId::new(voter_id), trapdoor_commitment);
        Ok(())
    }

    /// Append a ballot to the ledger
    pub fn cast_ballot(
        &self,
        voter_id: &str,
        trapdoor_commitment: &str,
        encrypted_vote: &str,
        signature: &str,
    ) -> TallyboardResult<CastReceipt> {
        require_non_empty("voter_id", voter_id)?;
        require_non_empty("encrypted_vote", encrypted_vote)?;

        let ballot = self.ledger.cast_ballot(
            VoterId::new(voter_id),
            trapdoor_commitment,
            encrypted_vote,
            signature,
        );

        info!("Ballot {} cast by {}", ballot.id, ballot.voter_id);

        Ok(CastReceipt {
            ballot_id: ballot.id.to_string(),
            insertion_index: ballot.insertion_index,
        })
    }

    /// Run the engine once and publish its result.
    ///
    /// Fails fast with `Conflict` while another run holds the slot. The run
    /// itself executes on its own task, so a caller that goes away does not
    /// abandon a half-finished run.
    pub async fn run_tally(&self, params: TallyParams) -> TallyboardResult<TallyOutcome> {
        params.validate()?;

        let permit = match self.guard.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Tally rejected: run already in progress");
                return Err(e);
            }
        };

        let run = RunContext {
            engine: self.engine.clone(),
            decoder: self.decoder.clone(),
            ledger: self.ledger.clone(),
            derive_notifications: self.config.ledger.placeholder_notifications,
            ballot_cutoff: self.ledger.ballot_count() as u64,
        };

        tokio::spawn(run.execute(permit, params))
            .await
            .map_err(|e| TallyboardError::Internal(format!("tally task failed: {}", e)))?
    }

    /// Latest published snapshot
    pub fn latest_snapshot(&self) -> TallyboardResult<Arc<TallySnapshot>> {
        self.ledger
            .latest()
            .ok_or_else(|| TallyboardError::NotFound("No tally results yet. Run a tally first.".into()))
    }

    /// Timing table of the latest snapshot
    pub fn latest_timing(&self) -> TallyboardResult<TimingRecord> {
        Ok(self.latest_snapshot()?.timing.clone())
    }

    pub fn bulletin_board(&self) -> TallyboardResult<BulletinBoard> {
        self.ledger.bulletin_board()
    }

    pub fn get_notification(&self, voter_id: &str) -> TallyboardResult<String> {
        self.ledger.get_notification(&VoterId::new(voter_id))
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            running: self.guard.is_running(),
            run_phase: self.guard.phase(),
            last_outcome: self.guard.last_outcome(),
            generation: self.ledger.latest().map(|s| s.generation.0),
            ballot_count: self.ledger.ballot_count(),
            voter_count: self.ledger.voter_count(),
        }
    }

    /// Parameters for a tally request that leaves some out
    pub fn tally_defaults(&self) -> TallyParams {
        self.config.tally_defaults
    }

    /// Get config reference
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get ledger reference
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }
}

/// Everything a run task needs, detached from the runtime's lifetime
struct RunContext {
    engine: Arc<dyn TallyEngine>,
    decoder: Arc<dyn OutputDecoder>,
    ledger: SharedLedger,
    derive_notifications: bool,
    /// Ballot count when the run slot was taken
    ballot_cutoff: u64,
}

impl RunContext {
    /// The permit is dropped when this returns, on every path
    async fn execute(self, mut permit: RunPermit, params: TallyParams) -> TallyboardResult<TallyOutcome> {
        permit.spawned();

        let output = match self.engine.execute(&params).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tally run failed: {}", e);
                return Err(e);
            }
        };

        let decoded = self.decoder.decode(&output.text);
        if decoded.bulletin_entries.is_empty() {
            warn!("Engine output contained no bulletin board entries");
        }
        if decoded.timing.is_empty() {
            warn!("Engine output contained no timing table");
        }

        let snapshot = self.ledger.publish(TallySnapshot {
            bulletin_entries: decoded.bulletin_entries,
            timing: decoded.timing,
            raw_text: output.text,
            generation: self.ledger.next_generation(),
            params,
            completed_at: Timestamp::now(),
            ballot_cutoff: self.ballot_cutoff,
        });
        permit.published();

        let placeholder_tally = if self.derive_notifications {
            self.ledger.derive_notifications(&snapshot)
        } else {
            Vec::new()
        };

        info!(
            "Tally {} completed in {}ms",
            snapshot.generation, output.elapsed_ms
        );

        Ok(TallyOutcome {
            snapshot,
            placeholder_tally,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> TallyboardResult<()> {
    if value.trim().is_empty() {
        return Err(TallyboardError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tallyboard_core::{EngineOutput, Phase};
    use tokio::sync::{Notify, Semaphore};

    pub(crate) const ENGINE_OUTPUT: &str = "\
+-------+---------------+-------------------+
| Setup | Voting (avg.) | Tallying (Mixing) |
+=======+===============+===================+
| 1.234 | 2.567         | 0.891             |
+-------+---------------+-------------------+
+------------------------------------+--------------+
| Vote                               | Commitment   |
+====================================+==============+
| {'x': 12345, 'curve': 'secp256k1'} | abc123def456 |
+------------------------------------+--------------+
| {'x': 67890, 'curve': 'secp256k1'} | ghi789jkl012 |
+------------------------------------+--------------+
";

    /// Engine that prints a fixed transcript, optionally held until released
    pub(crate) struct ScriptedEngine {
        pub output: TallyboardResult<String>,
        pub gate: Option<Arc<Semaphore>>,
        pub started: Arc<Notify>,
        pub calls: AtomicUsize,
    }

    impl ScriptedEngine {
        pub(crate) fn ok(text: &str) -> Self {
            Self {
                output: Ok(text.to_string()),
                gate: None,
                started: Arc::new(Notify::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                output: Err(TallyboardError::engine_failure("engine exited with code 1", "Traceback")),
                ..Self::ok("")
            }
        }

        pub(crate) fn gated(text: &str, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::ok(text)
            }
        }
    }

    #[async_trait]
    impl TallyEngine for ScriptedEngine {
        async fn execute(&self, _params: &TallyParams) -> TallyboardResult<EngineOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate closed").forget();
            }

            match &self.output {
                Ok(text) => Ok(EngineOutput {
                    text: text.clone(),
                    exit_code: 0,
                    elapsed_ms: 1,
                }),
                Err(e) => Err(TallyboardError::engine_failure(
                    e.to_string(),
                    e.engine_output().unwrap_or_default(),
                )),
            }
        }
    }

    pub(crate) fn runtime_with(engine: ScriptedEngine) -> (Arc<NodeRuntime>, Arc<ScriptedEngine>) {
        let engine = Arc::new(engine);
        let runtime = Arc::new(NodeRuntime::with_engine(NodeConfig::default(), engine.clone()));
        (runtime, engine)
    }

    #[tokio::test]
    async fn test_run_publishes_snapshot() {
        let (runtime, _) = runtime_with(ScriptedEngine::ok(ENGINE_OUTPUT));

        let outcome = runtime.run_tally(TallyParams::default()).await.unwrap();

        assert_eq!(outcome.snapshot.bulletin_entries.len(), 2);
        assert_eq!(outcome.snapshot.timing.get(Phase::Voting), Some(2.567));
        assert_eq!(outcome.snapshot.raw_text, ENGINE_OUTPUT);
        assert_eq!(runtime.latest_snapshot().unwrap().generation, outcome.snapshot.generation);

        let status = runtime.status();
        assert!(!status.running);
        assert_eq!(status.last_outcome, Some(RunPhase::Published));
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_engine() {
        let (runtime, engine) = runtime_with(ScriptedEngine::ok(ENGINE_OUTPUT));

        let err = runtime
            .run_tally(TallyParams::new(10, 3, 4, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, TallyboardError::Validation(_)));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert!(!runtime.status().running);
    }

    #[tokio::test]
    async fn test_overlapping_runs_conflict() {
        let gate = Arc::new(Semaphore::new(0));
        let (runtime, engine) = runtime_with(ScriptedEngine::gated(ENGINE_OUTPUT, gate.clone()));

        let first = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_tally(TallyParams::default()).await }
        });
        engine.started.notified().await;

        let second = runtime.run_tally(TallyParams::default()).await;
        assert!(matches!(second, Err(TallyboardError::Conflict)));
        assert!(runtime.status().running);

        gate.add_permits(1);
        assert!(first.await.unwrap().is_ok());

        gate.add_permits(1);
        let third = runtime.run_tally(TallyParams::default()).await.unwrap();
        assert_eq!(third.snapshot.generation.0, 2);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reads_are_served_during_a_run() {
        let gate = Arc::new(Semaphore::new(0));
        let (runtime, engine) = runtime_with(ScriptedEngine::gated(ENGINE_OUTPUT, gate.clone()));
        runtime.cast_ballot("voter1", "hash1", "vote", "sig").unwrap();

        let run = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_tally(TallyParams::default()).await }
        });
        engine.started.notified().await;

        assert_eq!(runtime.status().run_phase, RunPhase::Spawned);
        assert!(matches!(
            runtime.bulletin_board().unwrap(),
            BulletinBoard::Cast { .. }
        ));
        assert!(runtime.latest_snapshot().is_err());

        gate.add_permits(1);
        run.await.unwrap().unwrap();
        assert!(matches!(
            runtime.bulletin_board().unwrap(),
            BulletinBoard::Engine { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_snapshot() {
        let (good, _) = runtime_with(ScriptedEngine::ok(ENGINE_OUTPUT));
        let first = good.run_tally(TallyParams::default()).await.unwrap();

        // Same ledger, engine that now fails
        let failing = NodeRuntime {
            config: NodeConfig::default(),
            guard: Arc::new(RunGuard::new()),
            engine: Arc::new(ScriptedEngine::failing()),
            decoder: Arc::new(TableDecoder),
            ledger: good.ledger().clone(),
            started_at: Timestamp::now(),
        };

        let err = failing.run_tally(TallyParams::default()).await.unwrap_err();
        assert_eq!(err.engine_output(), Some("Traceback"));
        assert!(!failing.status().running);
        assert_eq!(failing.status().last_outcome, Some(RunPhase::Failed));
        assert_eq!(
            failing.latest_snapshot().unwrap().generation,
            first.snapshot.generation
        );
    }

    #[tokio::test]
    async fn test_unparseable_output_still_publishes() {
        let (runtime, _) = runtime_with(ScriptedEngine::ok("engine finished, nothing to show"));

        let outcome = runtime.run_tally(TallyParams::default()).await.unwrap();
        assert!(outcome.snapshot.bulletin_entries.is_empty());
        assert!(outcome.snapshot.timing.is_empty());
        assert!(runtime.latest_timing().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_after_run() {
        let (runtime, _) = runtime_with(ScriptedEngine::ok(ENGINE_OUTPUT));
        runtime.register_voter("voter1", "hash1").unwrap();
        let receipt = runtime.cast_ballot("voter1", "hash1", "vote", "sig").unwrap();

        assert!(runtime.get_notification("voter1").is_err());

        let outcome = runtime.run_tally(TallyParams::default()).await.unwrap();
        assert_eq!(outcome.placeholder_tally.len(), 1);

        let token = runtime.get_notification("voter1").unwrap();
        assert!(token.contains(&receipt.ballot_id));
    }

    #[tokio::test]
    async fn test_ballot_cast_during_run_is_not_notified() {
        let gate = Arc::new(Semaphore::new(0));
        let (runtime, engine) = runtime_with(ScriptedEngine::gated(ENGINE_OUTPUT, gate.clone()));
        runtime.register_voter("early", "hash1").unwrap();
        runtime.cast_ballot("early", "hash1", "vote", "sig").unwrap();

        let run = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_tally(TallyParams::default()).await }
        });
        engine.started.notified().await;

        runtime.register_voter("late", "hash2").unwrap();
        runtime.cast_ballot("late", "hash2", "vote", "sig").unwrap();
        gate.add_permits(1);

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome.snapshot.ballot_cutoff, 1);
        assert_eq!(outcome.placeholder_tally.len(), 1);
        assert!(runtime.get_notification("early").is_ok());
        assert!(matches!(
            runtime.get_notification("late"),
            Err(TallyboardError::NotFound(_))
        ));

        // The next run picks the late ballot up
        gate.add_permits(1);
        runtime.run_tally(TallyParams::default()).await.unwrap();
        assert!(runtime.get_notification("late").is_ok());
    }

    #[tokio::test]
    async fn test_placeholder_notifications_can_be_disabled() {
        let mut config = NodeConfig::default();
        config.ledger.placeholder_notifications = false;
        let runtime = NodeRuntime::with_engine(config, Arc::new(ScriptedEngine::ok(ENGINE_OUTPUT)));
        runtime.register_voter("voter1", "hash1").unwrap();
        runtime.cast_ballot("voter1", "hash1", "vote", "sig").unwrap();

        let outcome = runtime.run_tally(TallyParams::default()).await.unwrap();
        assert!(outcome.placeholder_tally.is_empty());
        assert!(runtime.get_notification("voter1").is_err());
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        let (runtime, _) = runtime_with(ScriptedEngine::ok(""));

        assert!(matches!(
            runtime.register_voter(" ", "hash"),
            Err(TallyboardError::Validation(_))
        ));
        assert!(runtime.cast_ballot("voter", "hash", "", "sig").is_err());
        assert_eq!(runtime.status().ballot_count, 0);
    }
}
