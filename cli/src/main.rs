//! TALLYBOARD CLI - Command Line Interface

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tallyboard_cli::{ApiClient, ApiError, BoardView, CastRequest, TallyRequest, Trapdoor};
use tallyboard_core::TimingRecord;

#[derive(Parser)]
#[command(name = "tallyboard")]
#[command(about = "TALLYBOARD - Voter and admin CLI")]
#[command(version)]
struct Cli {
    /// Node URL
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    node: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a trapdoor secret and its commitment
    Trapdoor {
        /// Save the trapdoor to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Register a voter
    Register {
        /// Voter identifier
        voter_id: String,

        /// Commitment to register (defaults to the one in --trapdoor)
        #[arg(long)]
        commitment: Option<String>,

        /// Trapdoor file written by `trapdoor --output`
        #[arg(short, long)]
        trapdoor: Option<PathBuf>,
    },

    /// Cast a ballot
    Cast {
        /// Voter identifier
        voter_id: String,

        /// Encrypted vote
        #[arg(short, long)]
        vote: String,

        /// Ballot signature
        #[arg(short, long, default_value = "sig_placeholder")]
        signature: String,

        /// Commitment (defaults to the one in --trapdoor)
        #[arg(long)]
        commitment: Option<String>,

        /// Trapdoor file written by `trapdoor --output`
        #[arg(short, long)]
        trapdoor: Option<PathBuf>,
    },

    /// Run the tally engine
    Tally {
        #[arg(long)]
        voters: Option<u32>,

        #[arg(long)]
        tellers: Option<u32>,

        #[arg(long)]
        threshold: Option<u32>,

        /// Maximum vote value
        #[arg(long)]
        max_vote: Option<u32>,

        /// Request timeout in seconds
        #[arg(long, default_value = "900")]
        timeout: u64,

        /// Print the raw engine output
        #[arg(long)]
        raw: bool,
    },

    /// Show the bulletin board
    Bb,

    /// Show the latest tally results
    Results,

    /// Show a voter's notification token
    Notify {
        /// Voter identifier
        voter_id: String,
    },

    /// Node status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let timeout = match &cli.command {
        Commands::Tally { timeout, .. } => Duration::from_secs(*timeout),
        _ => tallyboard_cli::REQUEST_TIMEOUT,
    };
    let api_client = ApiClient::new(&cli.node, timeout)?;

    let result = run(cli.command, &api_client).await;
    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(ApiError::Server {
            engine_output: Some(output),
            ..
        }) = e.downcast_ref::<ApiError>()
        {
            eprintln!("Engine output:\n{}", output);
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, api_client: &ApiClient) -> anyhow::Result<()> {
    match command {
        Commands::Trapdoor { output } => {
            let trapdoor = Trapdoor::generate();

            match output {
                Some(path) => {
                    trapdoor.save(&path)?;
                    println!("Trapdoor saved to: {}", path.display());
                    println!("Commitment: {}", trapdoor.commitment);
                }
                None => {
                    println!("{}", trapdoor.to_json()?);
                }
            }
        }

        Commands::Register {
            voter_id,
            commitment,
            trapdoor,
        } => {
            let commitment = resolve_commitment(commitment, trapdoor)?;
            api_client.register(&voter_id, &commitment).await?;
            println!("{} Voter '{}' registered", "✓".green(), voter_id);
        }

        Commands::Cast {
            voter_id,
            vote,
            signature,
            commitment,
            trapdoor,
        } => {
            let commitment = resolve_commitment(commitment, trapdoor)?;
            let receipt = api_client
                .cast(&CastRequest {
                    voter_id,
                    trapdoor_commitment: commitment,
                    encrypted_vote: vote,
                    signature,
                })
                .await?;

            println!("{} Ballot cast", "✓".green());
            println!("Ballot ID: {}", receipt.ballot_id);
            println!("Position:  {}", receipt.insertion_index);
        }

        Commands::Tally {
            voters,
            tellers,
            threshold,
            max_vote,
            raw,
            ..
        } => {
            let request = TallyRequest {
                voter_count: voters,
                teller_count: tellers,
                threshold,
                max_vote_value: max_vote,
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]")?);
            spinner.set_message("Running tally engine...");
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = api_client.tally(&request).await;
            spinner.finish_and_clear();
            let result = result?;

            println!("{} Tally {} published", "✓".green(), result.generation);
            print_entries(&result.bulletin_board);
            print_timings(&result.timings);
            if raw {
                println!("\n{}", result.raw_output);
            }
        }

        Commands::Bb => match api_client.bulletin_board().await? {
            BoardView::Engine { generation, entries } => {
                println!("{} (tally {})", "Bulletin Board".bold(), generation);
                print_entries(&entries);
            }
            BoardView::Cast { ballots } => {
                println!("{} (cast ballots, no tally yet)", "Bulletin Board".bold());
                println!("{:<38} {:<20} {}", "Ballot", "Voter", "Vote");
                println!("{:-<38} {:-<20} {:-<20}", "", "", "");
                for ballot in ballots {
                    println!(
                        "{:<38} {:<20} {}",
                        ballot.id.to_string(),
                        ballot.voter_id.as_str(),
                        ballot.encrypted_vote
                    );
                }
            }
        },

        Commands::Results => {
            let results = api_client.results().await?;
            println!("{} {}", "Tally".bold(), results.generation);
            println!(
                "Parameters: {} voters, {} tellers, threshold {}, max vote {}",
                results.params.voter_count,
                results.params.teller_count,
                results.params.threshold,
                results.params.max_vote_value
            );
            print_entries(&results.bulletin_board);
            print_timings(&results.timings);
        }

        Commands::Notify { voter_id } => {
            let notification = api_client.notify(&voter_id).await?;
            println!("Voter: {}", notification.voter_id);
            println!("Token: {}", notification.token);
        }

        Commands::Status => {
            let status = api_client.status().await?;
            println!("{}", "TALLYBOARD Node Status".bold());
            println!("========================");
            println!("Name:          {}", status.name);
            println!("Node:          {}", api_client.base_url());
            println!(
                "Running:       {}",
                if status.running { "Yes".yellow() } else { "No".normal() }
            );
            println!("Run Phase:     {}", status.run_phase);
            println!(
                "Last Outcome:  {}",
                status
                    .last_outcome
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "Generation:    {}",
                status
                    .generation
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("Ballots:       {}", status.ballot_count);
            println!("Voters:        {}", status.voter_count);
        }
    }

    Ok(())
}

fn resolve_commitment(
    commitment: Option<String>,
    trapdoor: Option<PathBuf>,
) -> anyhow::Result<String> {
    match (commitment, trapdoor) {
        (Some(commitment), _) => Ok(commitment),
        (None, Some(path)) => Ok(Trapdoor::load(&path)?.commitment),
        (None, None) => anyhow::bail!("provide --commitment or --trapdoor"),
    }
}

fn print_entries(entries: &[tallyboard_core::BulletinEntry]) {
    if entries.is_empty() {
        println!("No bulletin board entries.");
        return;
    }
    println!("{:<4} {:<50} {}", "#", "Vote", "Commitment");
    println!("{:-<4} {:-<50} {:-<20}", "", "", "");
    for (i, entry) in entries.iter().enumerate() {
        println!("{:<4} {:<50} {}", i, entry.vote_text, entry.commitment_text);
    }
}

fn print_timings(timings: &TimingRecord) {
    if timings.is_empty() {
        println!("No timing table.");
        return;
    }
    println!();
    for (phase, seconds) in timings.iter() {
        println!("{:<24} {:>10.3}s", phase.label(), seconds);
    }
    println!("{:<24} {:>10.3}s", "Total", timings.total_seconds());
}
