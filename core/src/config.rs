//! Configuration types for TALLYBOARD

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TallyboardError;
use crate::types::TallyParams;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Logging level (overridden by `RUST_LOG`)
    pub log_level: String,

    /// `human` or `json`
    pub log_format: String,

    /// API configuration
    pub api: ApiConfig,

    /// External engine configuration
    pub engine: EngineConfig,

    /// Ledger configuration
    pub ledger: LedgerConfig,

    /// Parameters used when a tally request omits them
    pub tally_defaults: TallyParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "tallyboard-node".to_string(),
            log_level: "info".to_string(),
            log_format: "human".to_string(),
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
            ledger: LedgerConfig::default(),
            tally_defaults: TallyParams::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> Result<Self, TallyboardError> {
        let config: NodeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TallyboardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, TallyboardError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TallyboardError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), TallyboardError> {
        if self.engine.program.trim().is_empty() {
            return Err(TallyboardError::Config("engine.program is empty".into()));
        }
        if self.engine.timeout_secs == 0 {
            return Err(TallyboardError::Config(
                "engine.timeout_secs must be greater than 0".into(),
            ));
        }
        self.tally_defaults
            .validate()
            .map_err(|e| TallyboardError::Config(format!("tally_defaults: {}", e)))
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API listen address
    pub listen_addr: String,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            enable_cors: true,
        }
    }
}

/// External tally engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable to spawn
    pub program: String,

    /// Arguments placed before the run parameters
    pub args: Vec<String>,

    /// Working directory for the engine process
    pub working_dir: Option<PathBuf>,

    /// Kill the engine after this many seconds
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["hyperion/main.py".to_string()],
            working_dir: None,
            timeout_secs: 600,
        }
    }
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Derive placeholder notification tokens after every published run
    pub placeholder_notifications: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            placeholder_notifications: true,
        }
    }
}
