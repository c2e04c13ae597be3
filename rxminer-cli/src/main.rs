use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::*;

/// RxMiner - Stratum pool client
#[derive(Parser)]
#[command(name = "rxminer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose mode (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the pool and follow its jobs
    Start(start::StartArgs),

    /// Show the configured pool
    Show(show::ShowArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(cli.verbose > 1)
        .init();

    if let Some(config_path) = &cli.config {
        config::set_config_path(config_path);
    }

    match cli.command {
        Commands::Start(args) => start::execute(args).await?,
        Commands::Show(args) => show::execute(args).await?,
    }

    Ok(())
}
