//! Decoder for the engine's bulletin board table
//!
//! Each logical row is `| vote | commitment |`, but the engine wraps long vote
//! cells over several physical lines, leaving the commitment cell empty (or
//! holding the next slice of the commitment) on continuation lines. Fragments
//! are accumulated until a row terminator and then joined.

use tallyboard_core::BulletinEntry;
use tracing::debug;

use crate::timing::{is_border, COLUMN_DELIMITER};

/// Marker of the vote's value field
pub const VALUE_MARKER: &str = "{'x':";

/// Marker of the vote's curve field
pub const CURVE_MARKER: &str = "'curve':";

/// Start of the table's header line, repeated by the engine between rows
const HEADER_PREFIX: &str = "| Vote";

/// Decode the bulletin board table. Never fails; rows whose vote text lacks
/// either structural marker are dropped.
pub fn parse_bulletin_board(text: &str) -> Vec<BulletinEntry> {
    let mut entries = Vec::new();
    let mut row = RowAccumulator::default();

    for line in text.lines() {
        let line = line.trim_start();

        if is_row_terminator(line) {
            entries.extend(row.flush());
        } else if line.starts_with(COLUMN_DELIMITER) {
            row.push_line(line);
        }
    }
    entries.extend(row.flush());

    debug!("Decoded {} bulletin board entries", entries.len());
    entries
}

fn is_row_terminator(line: &str) -> bool {
    line.trim().is_empty() || is_border(line) || line.starts_with(HEADER_PREFIX)
}

/// Whether joined vote text looks like an engine ballot
pub fn has_required_markers(vote_text: &str) -> bool {
    vote_text.contains(VALUE_MARKER) && vote_text.contains(CURVE_MARKER)
}

#[derive(Debug, Default)]
struct RowAccumulator {
    vote_fragments: Vec<String>,
    commitment_fragments: Vec<String>,
}

impl RowAccumulator {
    fn push_line(&mut self, line: &str) {
        let mut cells = line.split(COLUMN_DELIMITER).skip(1);

        // Need at least `| vote |`; a line with no closing delimiter is noise
        let (Some(vote), Some(commitment)) = (cells.next(), cells.next()) else {
            return;
        };

        let vote = vote.trim();
        if !vote.is_empty() {
            self.vote_fragments.push(vote.to_string());
        }
        let commitment = commitment.trim();
        if !commitment.is_empty() {
            self.commitment_fragments.push(commitment.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.vote_fragments.is_empty() && self.commitment_fragments.is_empty()
    }

    /// Join pending fragments into an entry and reset, valid or not
    fn flush(&mut self) -> Option<BulletinEntry> {
        if self.is_empty() {
            return None;
        }

        let vote_text = self.vote_fragments.join(" ");
        let commitment_text = self.commitment_fragments.concat();
        self.vote_fragments.clear();
        self.commitment_fragments.clear();

        if has_required_markers(&vote_text) {
            Some(BulletinEntry::new(vote_text, commitment_text))
        } else {
            debug!("Dropping bulletin row without ballot markers: {:?}", vote_text);
            None
        }
    }
}
