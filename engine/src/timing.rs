//! Decoder for the engine's phase timing table
//!
//! The engine prints a bordered text table whose header may wrap over several
//! physical lines (`Voting` on one line, `(avg.)` on the next). Header text is
//! only used to locate the table. Values are assigned to phases by column
//! position against [`Phase::ALL`], which is the fixed column order.

use tallyboard_core::{Phase, TimingRecord};
use tracing::debug;

/// Column delimiter used by the engine's tables
pub const COLUMN_DELIMITER: char = '|';

/// How far below the header line the closing border may appear
const MAX_HEADER_LINES: usize = 6;

/// Header lines must mention at least this many phase tokens
const MIN_HEADER_TOKENS: usize = 2;

/// Decode the timing table. Never fails; returns an empty record when no
/// header or data row can be found.
pub fn parse_timings(text: &str) -> TimingRecord {
    let lines: Vec<&str> = text.lines().collect();
    let mut timing = TimingRecord::new();

    let Some(header) = lines
        .iter()
        .position(|line| count_phase_tokens(line) >= MIN_HEADER_TOKENS)
    else {
        debug!("No timing header found");
        return timing;
    };

    let data_start = match find_header_border(&lines, header) {
        Some(border) => border + 1,
        None => header + 1,
    };

    let Some(row) = lines
        .iter()
        .skip(data_start)
        .find(|line| is_data_row(line))
    else {
        debug!("Timing header at line {} has no data row", header + 1);
        return timing;
    };

    let cells = data_cells(row);
    for (phase, cell) in Phase::ALL.iter().zip(cells.iter()) {
        match parse_seconds(cell) {
            Some(seconds) => timing.insert(*phase, seconds),
            None => debug!("Omitting {}: unparseable cell {:?}", phase, cell),
        }
    }

    timing
}

/// Count words in the line that name a phase column
fn count_phase_tokens(line: &str) -> usize {
    line.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| Phase::HEADER_TOKENS.contains(word))
        .count()
}

/// A table border such as `+-----+-----+` or `+=====+=====+`
pub(crate) fn is_border(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('+')
        && line.len() > 1
        && line.chars().all(|c| matches!(c, '+' | '-' | '='))
}

/// Find the border that closes the (possibly wrapped) header
fn find_header_border(lines: &[&str], header: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(header + 1)
        .take(MAX_HEADER_LINES)
        .find(|(_, line)| is_border(line))
        .map(|(index, _)| index)
}

fn is_data_row(line: &str) -> bool {
    line.contains(COLUMN_DELIMITER)
        && line
            .split(|c: char| c == COLUMN_DELIMITER || c.is_whitespace())
            .any(|token| parse_seconds(token).is_some())
}

/// Split a data row into value cells.
///
/// The empty cells produced by outer delimiters are dropped, as is a leading
/// row label naming a phase (`Setup | 1.2 | 3.4`).
fn data_cells(row: &str) -> Vec<&str> {
    let mut cells: Vec<&str> = row.split(COLUMN_DELIMITER).map(str::trim).collect();

    if cells.first().is_some_and(|cell| cell.is_empty()) {
        cells.remove(0);
    }
    if cells.len() > 1 && cells.last().is_some_and(|cell| cell.is_empty()) {
        cells.pop();
    }
    if cells.first().is_some_and(|cell| is_row_label(cell)) {
        cells.remove(0);
    }

    cells
}

fn is_row_label(cell: &str) -> bool {
    Phase::from_label(cell).is_some() || Phase::HEADER_TOKENS.contains(&cell)
}

/// Parse a duration cell. Tokens without a digit (`inf`, `NaN`) are rejected.
fn parse_seconds(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if !cell.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}
