//! TALLYBOARD engine integration
//! 
//! Everything that touches the external tally engine:
//! - Single-flight run guard
//! - Child process runner with timeout
//! - Tolerant decoders for the engine's timing and bulletin board tables

pub mod guard;
pub mod runner;
pub mod timing;
pub mod board;
pub mod decoder;

pub use guard::*;
pub use runner::*;
pub use timing::*;
pub use board::*;
pub use decoder::*;
