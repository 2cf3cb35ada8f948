//! TALLYBOARD Node Binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tallyboard_core::NodeConfig;
use tallyboard_node::{init_logging, LogFormat, NodeBuilder};
use tracing::info;

#[derive(Parser)]
#[command(name = "tallyboard-node")]
#[command(about = "TALLYBOARD Node - Tally orchestration for the Hyperion engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Engine executable
        #[arg(long)]
        engine_program: Option<String>,

        /// Engine argument placed before the run parameters (repeatable)
        #[arg(long = "engine-arg")]
        engine_args: Vec<String>,

        /// Engine working directory
        #[arg(long)]
        engine_dir: Option<PathBuf>,

        /// Engine timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Log format: human or json
        #[arg(long)]
        log_format: Option<String>,
    },

    /// Write the default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            api_addr,
            engine_program,
            engine_args,
            engine_dir,
            timeout_secs,
            log_format,
        } => {
            let config = match config {
                Some(path) => NodeConfig::load(&path)?,
                None => NodeConfig::default(),
            };

            let format: LogFormat = log_format
                .as_deref()
                .unwrap_or(&config.log_format)
                .parse()?;
            init_logging(format, &config.log_level);

            info!("Starting TALLYBOARD Node...");

            let mut builder = NodeBuilder::new().config(config);
            if let Some(addr) = api_addr {
                builder = builder.api_addr(&addr);
            }
            if let Some(program) = engine_program {
                builder = builder.engine_program(&program);
            }
            if !engine_args.is_empty() {
                builder = builder.engine_args(engine_args);
            }
            if let Some(dir) = engine_dir {
                builder = builder.engine_dir(dir);
            }
            if let Some(secs) = timeout_secs {
                builder = builder.timeout_secs(secs);
            }

            let node = builder.build()?;
            node.start().await?;
        }

        Commands::Config { output } => {
            let json = NodeConfig::default().to_json()?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json)?;
                    println!("Configuration saved to: {}", path.display());
                }
                None => {
                    println!("{}", json);
                }
            }
        }
    }

    Ok(())
}
