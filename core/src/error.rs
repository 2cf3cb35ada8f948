//! Error types for TALLYBOARD

use thiserror::Error;

/// Main error type for TALLYBOARD
#[derive(Error, Debug)]
pub enum TallyboardError {
    // ============ Run Errors ============
    #[error("Tally run already in progress")]
    Conflict,

    #[error("Engine failure: {reason}")]
    EngineFailure {
        reason: String,
        /// Whatever the engine printed before failing
        output: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    // ============ Lookup Errors ============
    #[error("Not found: {0}")]
    NotFound(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    // ============ General Errors ============
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TallyboardError {
    pub fn engine_failure(reason: impl Into<String>, output: impl Into<String>) -> Self {
        TallyboardError::EngineFailure {
            reason: reason.into(),
            output: output.into(),
        }
    }

    /// Captured engine text, if this error carries any
    pub fn engine_output(&self) -> Option<&str> {
        match self {
            TallyboardError::EngineFailure { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TallyboardError {
    fn from(err: std::io::Error) -> Self {
        TallyboardError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TallyboardError {
    fn from(err: serde_json::Error) -> Self {
        TallyboardError::Serialization(err.to_string())
    }
}
