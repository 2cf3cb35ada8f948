//! TALLYBOARD Node Implementation
//! 
//! Node library combining all components:
//! - Single-flight tally runs against the external engine
//! - Ballot ledger and snapshot publication
//! - HTTP API
//! - Logging setup

mod api;
mod logging;
mod node;
mod runtime;

pub use api::*;
pub use logging::*;
pub use node::*;
pub use runtime::*;
