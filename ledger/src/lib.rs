//! TALLYBOARD Ledger
//! 
//! In-memory record of a voting session:
//! - Voter registration and trapdoor commitments
//! - Append-only ballot storage
//! - The latest published tally snapshot
//! - Placeholder notification tokens derived after a run

pub mod ledger;
pub mod notification;

pub use ledger::*;
pub use notification::*;
