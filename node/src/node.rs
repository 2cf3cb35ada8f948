//! Full node implementation

use crate::api::start_api_server;
use crate::runtime::NodeRuntime;
use std::path::PathBuf;
use std::sync::Arc;
use tallyboard_core::NodeConfig;
use tokio::signal;
use tracing::{error, info};

/// Full TALLYBOARD node
pub struct TallyboardNode {
    runtime: Arc<NodeRuntime>,
}

impl TallyboardNode {
    /// Create a new node
    pub fn new(config: NodeConfig) -> Self {
        let runtime = Arc::new(NodeRuntime::new(config));
        Self { runtime }
    }

    /// Serve the API until ctrl-c
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting TALLYBOARD node...");

        let config = self.runtime.config();
        info!(
            "Engine: {} {}",
            config.engine.program,
            config.engine.args.join(" ")
        );
        if let Some(dir) = &config.engine.working_dir {
            info!("Engine working directory: {}", dir.display());
        }

        let api_addr = config.api.listen_addr.clone();
        let shutdown = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received, stopping node..."),
                Err(e) => error!("Error waiting for shutdown signal: {}", e),
            }
        };

        start_api_server(self.runtime.clone(), &api_addr, shutdown).await?;

        info!("Node stopped");

        Ok(())
    }

    /// Get runtime reference
    pub fn runtime(&self) -> &Arc<NodeRuntime> {
        &self.runtime
    }
}

/// Node builder for easier configuration
pub struct NodeBuilder {
    config: NodeConfig,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_addr(mut self, addr: &str) -> Self {
        self.config.api.listen_addr = addr.to_string();
        self
    }

    pub fn engine_program(mut self, program: &str) -> Self {
        self.config.engine.program = program.to_string();
        self
    }

    /// Replace the arguments placed before the run parameters
    pub fn engine_args(mut self, args: Vec<String>) -> Self {
        self.config.engine.args = args;
        self
    }

    pub fn engine_dir(mut self, dir: PathBuf) -> Self {
        self.config.engine.working_dir = Some(dir);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine.timeout_secs = secs;
        self
    }

    /// Validate the assembled configuration and build the node
    pub fn build(self) -> anyhow::Result<TallyboardNode> {
        self.config.validate()?;
        Ok(TallyboardNode::new(self.config))
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
