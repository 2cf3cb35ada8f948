//! Placeholder tally and voter notification tokens
//!
//! Stands in for the engine's notification phase: ballots are shuffled to
//! model the anonymising mix, and every voter whose ballot took part gets a
//! token derived from their ballot id.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use tallyboard_core::{BallotId, TallyRecord, TallySnapshot, VoterSecret};
use tracing::{debug, info};

use crate::ledger::Ledger;

/// Token handed to the voter who cast `ballot_id`
pub fn notification_token(ballot_id: &BallotId) -> String {
    format!("g_r_{}", ballot_id)
}

impl Ledger {
    /// Derive notification tokens for the ballots that were on the ledger
    /// when the run behind `snapshot` started, returning the placeholder
    /// tally in shuffled order. Later ballots are left for the next run.
    pub fn derive_notifications(&self, snapshot: &TallySnapshot) -> Vec<TallyRecord> {
        self.derive_notifications_with_rng(snapshot, &mut rand::thread_rng())
    }

    pub fn derive_notifications_with_rng<R: Rng + ?Sized>(
        &self,
        snapshot: &TallySnapshot,
        rng: &mut R,
    ) -> Vec<TallyRecord> {
        let mut ballots: Vec<_> = self
            .ballots()
            .into_iter()
            .filter(|b| b.insertion_index < snapshot.ballot_cutoff)
            .collect();
        ballots.shuffle(rng);

        let mut notified = HashSet::new();
        let mut tally = Vec::with_capacity(ballots.len());
        let mut secrets = self.secrets.write();

        for ballot in ballots {
            let token = notification_token(&ballot.id);

            // First ballot in mixed order wins for voters who cast several
            if notified.insert(ballot.voter_id.clone()) {
                let secret = secrets
                    .entry(ballot.voter_id.clone())
                    .or_insert_with(|| {
                        debug!("Ballot {} from unregistered voter {}", ballot.id, ballot.voter_id);
                        VoterSecret::new(ballot.trapdoor_commitment.clone())
                    });
                secret.notification_token = Some(token.clone());
            }

            tally.push(TallyRecord {
                ballot_id: ballot.id,
                vote: ballot.encrypted_vote,
                token,
            });
        }

        info!(
            "Derived {} notifications for snapshot {}",
            notified.len(),
            snapshot.generation
        );

        tally
    }
}
