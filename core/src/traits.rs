//! Core traits defining TALLYBOARD seams
//!
//! The engine process and the decoding of its console text sit behind these
//! traits so either can be replaced without touching the run orchestration.

use crate::types::*;
use async_trait::async_trait;

/// Result type for TALLYBOARD operations
pub type TallyboardResult<T> = Result<T, crate::error::TallyboardError>;

/// An external tally engine
#[async_trait]
pub trait TallyEngine: Send + Sync {
    /// Run the engine once with validated parameters.
    ///
    /// Returns the captured text of a run that exited with status zero;
    /// anything else is an `EngineFailure`.
    async fn execute(&self, params: &TallyParams) -> TallyboardResult<EngineOutput>;
}

/// Turns engine console text into typed records. Never fails: a table that
/// cannot be found decodes as empty.
pub trait OutputDecoder: Send + Sync {
    fn decode(&self, text: &str) -> DecodedOutput;
}
