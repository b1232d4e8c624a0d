//! UTXO Ledger CLI Application
//!
//! A command-line interface for generating keys and running a local ledger.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use utxo_ledger::cli;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A single-node UTXO ledger with proof-of-work mining", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a password-sealed private key
    Keygen {
        /// Password protecting the private key
        #[arg(short, long)]
        password: String,

        /// Also save the sealed key as a wallet file
        #[arg(short, long)]
        wallet_out: Option<PathBuf>,
    },

    /// Run a scripted mining and transfer session
    Demo {
        /// Number of zero hex digits a block hash needs
        #[arg(short, long)]
        difficulty: Option<usize>,

        /// Coins minted per block
        #[arg(short, long)]
        reward: Option<u64>,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the chain JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen {
            password,
            wallet_out,
        } => {
            cli::cmd_keygen(&password, wallet_out.as_deref())?;
        }

        Commands::Demo {
            difficulty,
            reward,
            config,
            output,
        } => {
            let config = cli::resolve_config(config.as_deref(), difficulty, reward)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_demo(config, output.as_deref()))?;
        }
    }

    Ok(())
}
