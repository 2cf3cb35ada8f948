//! Console text decoding

use tallyboard_core::{DecodedOutput, OutputDecoder};

use crate::board::parse_bulletin_board;
use crate::timing::parse_timings;

/// Decodes the bordered text tables the engine prints today.
///
/// Both tables are decoded independently from the same text; one being
/// absent does not affect the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableDecoder;

impl OutputDecoder for TableDecoder {
    fn decode(&self, text: &str) -> DecodedOutput {
        DecodedOutput {
            bulletin_entries: parse_bulletin_board(text),
            timing: parse_timings(text),
        }
    }
}
