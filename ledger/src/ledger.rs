//! Ballot ledger and snapshot publication

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tallyboard_core::{
    Ballot, BallotId, BulletinEntry, Generation, TallySnapshot, TallyboardError,
    TallyboardResult, Timestamp, VoterId, VoterSecret,
};
use tracing::{debug, info};

/// What `/bb` serves: engine output once a run has been published, the raw
/// cast ballots before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BulletinBoard {
    Engine {
        generation: Generation,
        entries: Vec<BulletinEntry>,
    },
    Cast {
        ballots: Vec<Ballot>,
    },
}

impl BulletinBoard {
    pub fn len(&self) -> usize {
        match self {
            BulletinBoard::Engine { entries, .. } => entries.len(),
            BulletinBoard::Cast { ballots } => ballots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory ledger. All mutable session state except the run slot lives
/// here; nothing is persisted.
pub struct Ledger {
    ballots: RwLock<Vec<Ballot>>,
    pub(crate) secrets: RwLock<HashMap<VoterId, VoterSecret>>,
    latest: RwLock<Option<Arc<TallySnapshot>>>,
    generation: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            ballots: RwLock::new(Vec::new()),
            secrets: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Store or overwrite a voter's trapdoor commitment. An existing
    /// notification token is kept.
    pub fn register_voter(&self, voter_id: VoterId, trapdoor_commitment: impl Into<String>) {
        let commitment = trapdoor_commitment.into();
        let mut secrets = self.secrets.write();

        match secrets.get_mut(&voter_id) {
            Some(secret) => secret.trapdoor_commitment = commitment,
            None => {
                secrets.insert(voter_id.clone(), VoterSecret::new(commitment));
            }
        }

        debug!("Registered voter {}", voter_id);
    }

    /// Append a ballot. Repeat ballots from the same voter are accepted.
    pub fn cast_ballot(
        &self,
        voter_id: VoterId,
        trapdoor_commitment: impl Into<String>,
        encrypted_vote: impl Into<String>,
        signature: impl Into<String>,
    ) -> Ballot {
        let mut ballots = self.ballots.write();

        let ballot = Ballot {
            id: BallotId::generate(),
            voter_id,
            trapdoor_commitment: trapdoor_commitment.into(),
            encrypted_vote: encrypted_vote.into(),
            signature: signature.into(),
            insertion_index: ballots.len() as u64,
            cast_at: Timestamp::now(),
        };
        ballots.push(ballot.clone());

        debug!(
            "Ballot {} cast by {} (index {})",
            ballot.id, ballot.voter_id, ballot.insertion_index
        );
        ballot
    }

    /// Copy of all ballots in insertion order
    pub fn ballots(&self) -> Vec<Ballot> {
        self.ballots.read().clone()
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.read().len()
    }

    pub fn voter_count(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn voter_secret(&self, voter_id: &VoterId) -> Option<VoterSecret> {
        self.secrets.read().get(voter_id).cloned()
    }

    /// Reserve the generation number for the next snapshot
    pub fn next_generation(&self) -> Generation {
        Generation::new(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Replace the latest snapshot. Readers see either the old or the new
    /// snapshot, never a mix.
    pub fn publish(&self, snapshot: TallySnapshot) -> Arc<TallySnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self.latest.write().replace(Arc::clone(&snapshot));

        info!(
            "Published snapshot {} ({} entries, {} timed phases, previous: {})",
            snapshot.generation,
            snapshot.bulletin_entries.len(),
            snapshot.timing.len(),
            previous
                .map(|p| p.generation.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        snapshot
    }

    /// Latest published snapshot
    pub fn latest(&self) -> Option<Arc<TallySnapshot>> {
        self.latest.read().clone()
    }

    pub fn bulletin_board(&self) -> TallyboardResult<BulletinBoard> {
        if let Some(snapshot) = self.latest() {
            return Ok(BulletinBoard::Engine {
                generation: snapshot.generation,
                entries: snapshot.bulletin_entries.clone(),
            });
        }

        let ballots = self.ballots();
        if ballots.is_empty() {
            return Err(TallyboardError::NotFound(
                "No bulletin board available. Run a tally first.".into(),
            ));
        }
        Ok(BulletinBoard::Cast { ballots })
    }

    /// Notification token of a voter
    pub fn get_notification(&self, voter_id: &VoterId) -> TallyboardResult<String> {
        self.secrets
            .read()
            .get(voter_id)
            .and_then(|secret| secret.notification_token.clone())
            .ok_or_else(|| {
                TallyboardError::NotFound(format!("No notification for voter {}", voter_id))
            })
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared ledger type
pub type SharedLedger = Arc<Ledger>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tallyboard_core::{TallyParams, TimingRecord};

    pub(crate) fn snapshot(ledger: &Ledger, entries: Vec<BulletinEntry>) -> TallySnapshot {
        TallySnapshot {
            bulletin_entries: entries,
            timing: TimingRecord::new(),
            raw_text: String::new(),
            generation: ledger.next_generation(),
            params: TallyParams::default(),
            completed_at: Timestamp::now(),
            ballot_cutoff: ledger.ballot_count() as u64,
        }
    }

    #[test]
    fn test_register_voter_is_idempotent() {
        let ledger = Ledger::new();

        ledger.register_voter("voter1".into(), "hash1");
        ledger.register_voter("voter1".into(), "hash1");
        ledger.register_voter("voter2".into(), "hash2");

        assert_eq!(ledger.voter_count(), 2);
        let secret = ledger.voter_secret(&"voter1".into()).unwrap();
        assert_eq!(secret.trapdoor_commitment, "hash1");
        assert_eq!(secret.notification_token, None);
    }

    #[test]
    fn test_reregistration_overwrites_commitment_and_keeps_token() {
        let ledger = Ledger::new();
        ledger.register_voter("voter1".into(), "hash1");
        ledger
            .secrets
            .write()
            .get_mut(&VoterId::from("voter1"))
            .unwrap()
            .notification_token = Some("token".into());

        ledger.register_voter("voter1".into(), "hash2");

        let secret = ledger.voter_secret(&"voter1".into()).unwrap();
        assert_eq!(secret.trapdoor_commitment, "hash2");
        assert_eq!(secret.notification_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_cast_ballots_are_appended() {
        let ledger = Ledger::new();

        let first = ledger.cast_ballot("voter1".into(), "hash1", "vote1", "sig1");
        let second = ledger.cast_ballot("voter1".into(), "hash1", "vote2", "sig2");

        assert_ne!(first.id, second.id);
        assert_eq!(first.insertion_index, 0);
        assert_eq!(second.insertion_index, 1);

        let ballots = ledger.ballots();
        assert_eq!(ballots, vec![first, second]);
    }

    #[test]
    fn test_bulletin_board_before_and_after_run() {
        let ledger = Ledger::new();
        assert!(matches!(
            ledger.bulletin_board(),
            Err(TallyboardError::NotFound(_))
        ));

        let ballot = ledger.cast_ballot("voter1".into(), "hash1", "enc-vote", "sig");
        match ledger.bulletin_board().unwrap() {
            BulletinBoard::Cast { ballots } => {
                assert_eq!(ballots.len(), 1);
                assert_eq!(ballots[0].voter_id, VoterId::from("voter1"));
                assert_eq!(ballots[0].trapdoor_commitment, "hash1");
                assert_eq!(ballots[0].encrypted_vote, "enc-vote");
                assert_eq!(ballots[0].signature, "sig");
                assert_eq!(ballots[0].id, ballot.id);
            }
            other => panic!("expected cast ballots, got {other:?}"),
        }

        let entry = BulletinEntry::new("{'x': 1, 'curve': 'c'}", "aa");
        let published = ledger.publish(snapshot(&ledger, vec![entry.clone()]));

        assert_eq!(
            ledger.bulletin_board().unwrap(),
            BulletinBoard::Engine {
                generation: published.generation,
                entries: vec![entry],
            }
        );
    }

    #[test]
    fn test_publish_replaces_latest() {
        let ledger = Ledger::new();
        assert!(ledger.latest().is_none());

        let first = ledger.publish(snapshot(&ledger, vec![]));
        let held = ledger.latest().unwrap();
        let second = ledger.publish(snapshot(&ledger, vec![BulletinEntry::new("v", "c")]));

        assert!(second.generation > first.generation);
        assert_eq!(ledger.latest().unwrap().generation, second.generation);
        // An earlier reader keeps its complete snapshot
        assert_eq!(held.generation, first.generation);
        assert!(held.bulletin_entries.is_empty());
    }

    #[test]
    fn test_generations_are_monotonic() {
        let ledger = Ledger::new();
        let a = ledger.next_generation();
        let b = ledger.next_generation();
        assert_eq!(a, Generation::new(1));
        assert_eq!(b, Generation::new(2));
    }

    #[test]
    fn test_bulletin_board_serialization() {
        let board = BulletinBoard::Engine {
            generation: Generation::new(3),
            entries: vec![BulletinEntry::new("v", "c")],
        };
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["source"], "engine");
        assert_eq!(json["generation"], 3);
        assert_eq!(json["entries"][0]["commitment_text"], "c");
    }

    #[test]
    fn test_missing_notification() {
        let ledger = Ledger::new();
        ledger.register_voter("voter1".into(), "hash1");

        assert!(matches!(
            ledger.get_notification(&"voter1".into()),
            Err(TallyboardError::NotFound(_))
        ));
        assert!(ledger.get_notification(&"ghost".into()).is_err());
    }
}
