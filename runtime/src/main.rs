// Copyright 2026 P2P Sampler Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use p2p_sampler::cli::{self, doctor, history_cmd, run_cmd, GlobalArgs};

/// Exit code for errors raised before any fetch (config, setup).
const SETUP_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "p2p-sampler",
    about = "Sample P2P fiat listings from Bybit and Binance and derive a cross rate",
    version,
    after_help = "Run 'p2p-sampler <command> --help' for details on each command.\nRun 'p2p-sampler' with no command to take one sample."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Take one sample from both sources and persist it (default)
    Run(run_cmd::RunArgs),
    /// Check environment and diagnose issues
    Doctor,
    /// Show recent records from the structured store
    History {
        /// Number of records to show
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Output records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Run(run_cmd::RunArgs::default()));

    if let Commands::Completions { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "p2p-sampler", &mut std::io::stdout());
        return;
    }

    let result = match cli::resolve_config(&cli.global) {
        Ok(config) => match command {
            Commands::Run(args) => run_cmd::run(config, &args).await,
            Commands::Doctor => doctor::run(&config).await,
            Commands::History { limit, json } => {
                history_cmd::run(&config, limit, json).await.map(|()| 0)
            }
            Commands::Completions { .. } => Ok(0),
        },
        Err(e) => Err(e),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  Error: {e:#}");
            SETUP_FAILURE
        }
    };
    std::process::exit(code);
}
