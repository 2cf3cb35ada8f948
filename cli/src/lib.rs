//! TALLYBOARD client library
//!
//! HTTP client for the node API and voter-side trapdoor generation.

pub mod commands;
pub mod trapdoor;

pub use commands::*;
pub use trapdoor::*;
