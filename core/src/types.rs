//! Core types for TALLYBOARD
//!
//! Defines the ballots, voter secrets and tally snapshots that flow between
//! the engine runner, the ledger and the API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::TallyboardError;

/// Voter identifier as supplied by the client
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(pub String);

impl VoterId {
    pub fn new(id: impl Into<String>) -> Self {
        VoterId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoterId({})", self.0)
    }
}

impl From<&str> for VoterId {
    fn from(s: &str) -> Self {
        VoterId(s.to_string())
    }
}

/// Unique ballot identifier, generated on insert
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotId(pub Uuid);

impl BallotId {
    pub fn generate() -> Self {
        BallotId(Uuid::new_v4())
    }
}

impl fmt::Display for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BallotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BallotId({})", self.0)
    }
}

/// Timestamp in milliseconds since Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis() as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A cast ballot. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: BallotId,
    pub voter_id: VoterId,
    pub trapdoor_commitment: String,
    pub encrypted_vote: String,
    pub signature: String,
    pub insertion_index: u64,
    pub cast_at: Timestamp,
}

/// Per-voter secret material held by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSecret {
    pub trapdoor_commitment: String,
    /// Set only after a run that included one of this voter's ballots
    pub notification_token: Option<String>,
}

impl VoterSecret {
    pub fn new(trapdoor_commitment: impl Into<String>) -> Self {
        Self {
            trapdoor_commitment: trapdoor_commitment.into(),
            notification_token: None,
        }
    }
}

/// Protocol phase reported in the engine's timing table.
///
/// Declaration order is the canonical column order; the derived `Ord` relies
/// on it so a [`TimingRecord`] iterates in table order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "Setup")]
    Setup,
    #[serde(rename = "Voting (avg.)")]
    Voting,
    #[serde(rename = "Tallying (Mixing)")]
    TallyingMixing,
    #[serde(rename = "Tallying (Decryption)")]
    TallyingDecryption,
    #[serde(rename = "Notification")]
    Notification,
    #[serde(rename = "Verification (avg.)")]
    Verification,
    #[serde(rename = "Coercion Mitigation")]
    CoercionMitigation,
    #[serde(rename = "Individual Views")]
    IndividualViews,
}

impl Phase {
    /// All phases in canonical (positional) order
    pub const ALL: [Phase; 8] = [
        Phase::Setup,
        Phase::Voting,
        Phase::TallyingMixing,
        Phase::TallyingDecryption,
        Phase::Notification,
        Phase::Verification,
        Phase::CoercionMitigation,
        Phase::IndividualViews,
    ];

    /// Words that identify a phase column in a header line
    pub const HEADER_TOKENS: [&'static str; 7] = [
        "Setup",
        "Voting",
        "Tallying",
        "Notification",
        "Verification",
        "Coercion",
        "Individual",
    ];

    /// Label as printed by the engine and exposed on the API
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Setup => "Setup",
            Phase::Voting => "Voting (avg.)",
            Phase::TallyingMixing => "Tallying (Mixing)",
            Phase::TallyingDecryption => "Tallying (Decryption)",
            Phase::Notification => "Notification",
            Phase::Verification => "Verification (avg.)",
            Phase::CoercionMitigation => "Coercion Mitigation",
            Phase::IndividualViews => "Individual Views",
        }
    }

    pub fn from_label(label: &str) -> Option<Phase> {
        let label = label.trim();
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase({})", self.label())
    }
}

/// Phase durations in seconds. Any subset of phases may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingRecord(pub BTreeMap<Phase, f64>);

impl TimingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, phase: Phase, seconds: f64) {
        self.0.insert(phase, seconds);
    }

    pub fn get(&self, phase: Phase) -> Option<f64> {
        self.0.get(&phase).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Phases in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, f64)> + '_ {
        self.0.iter().map(|(p, s)| (*p, *s))
    }

    /// Sum of all present phases
    pub fn total_seconds(&self) -> f64 {
        self.0.values().sum()
    }
}

/// One row of the engine's published bulletin board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinEntry {
    pub vote_text: String,
    pub commitment_text: String,
}

impl BulletinEntry {
    pub fn new(vote_text: impl Into<String>, commitment_text: impl Into<String>) -> Self {
        Self {
            vote_text: vote_text.into(),
            commitment_text: commitment_text.into(),
        }
    }
}

/// Parameters of a single engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyParams {
    pub voter_count: u32,
    pub teller_count: u32,
    pub threshold: u32,
    pub max_vote_value: u32,
}

impl TallyParams {
    pub fn new(voter_count: u32, teller_count: u32, threshold: u32, max_vote_value: u32) -> Self {
        Self {
            voter_count,
            teller_count,
            threshold,
            max_vote_value,
        }
    }

    /// Reject parameters the engine cannot run with
    pub fn validate(&self) -> Result<(), TallyboardError> {
        if self.voter_count < 1 {
            return Err(TallyboardError::Validation(
                "voter_count must be at least 1".into(),
            ));
        }
        if self.teller_count < 1 {
            return Err(TallyboardError::Validation(
                "teller_count must be at least 1".into(),
            ));
        }
        if self.threshold < 1 || self.threshold > self.teller_count {
            return Err(TallyboardError::Validation(format!(
                "threshold must be between 1 and teller_count ({}), got {}",
                self.teller_count, self.threshold
            )));
        }
        if self.max_vote_value < 2 {
            return Err(TallyboardError::Validation(
                "max_vote_value must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Positional engine arguments: `voters tellers threshold -maxv max`
    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.voter_count.to_string(),
            self.teller_count.to_string(),
            self.threshold.to_string(),
            "-maxv".to_string(),
            self.max_vote_value.to_string(),
        ]
    }
}

impl Default for TallyParams {
    fn default() -> Self {
        Self {
            voter_count: 50,
            teller_count: 3,
            threshold: 2,
            max_vote_value: 2,
        }
    }
}

/// Monotonic snapshot generation counter
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn next(&self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generation({})", self.0)
    }
}

/// Result of a completed engine run. Published as a whole, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallySnapshot {
    pub bulletin_entries: Vec<BulletinEntry>,
    pub timing: TimingRecord,
    pub raw_text: String,
    pub generation: Generation,
    pub params: TallyParams,
    pub completed_at: Timestamp,
    /// Ballots with an insertion index below this were on the ledger when
    /// the run started
    #[serde(default)]
    pub ballot_cutoff: u64,
}

/// Decoded form of the engine's console output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedOutput {
    pub bulletin_entries: Vec<BulletinEntry>,
    pub timing: TimingRecord,
}

/// Captured output of a successful engine invocation
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub text: String,
    pub exit_code: i32,
    pub elapsed_ms: u64,
}

/// Entry of the ledger-computed placeholder tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRecord {
    pub ballot_id: BallotId,
    pub vote: String,
    pub token: String,
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Acquiring,
    Spawned,
    Published,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Acquiring => "acquiring",
            RunPhase::Spawned => "spawned",
            RunPhase::Published => "published",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}
