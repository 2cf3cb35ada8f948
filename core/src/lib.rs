//! TALLYBOARD Core Library
//! 
//! Core types, traits, and abstractions shared by the TALLYBOARD crates:
//! ballots and voter secrets, tally snapshots, the engine/decoder seams,
//! configuration and the error taxonomy.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
