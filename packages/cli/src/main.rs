mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{replay, roundtrip, ReplayArgs, RoundtripArgs};
use config::Overrides;
use folio_common::ErrorReport;
use folio_editor::EditorError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Folio CLI - replay operation logs and run HTML through the editor
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Editor config file (defaults to folio.config.json in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an operation log into a fresh editor and print the result
    Replay(ReplayArgs),

    /// Load HTML into an editor and print the data it produces
    Roundtrip(RoundtripArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<String> {
    let cwd = std::env::current_dir()?;
    match cli.command {
        Command::Replay(args) => {
            let config = config::load(cli.config.as_deref(), &cwd, &args.overrides())?;
            replay(args, config).await
        }
        Command::Roundtrip(args) => {
            let overrides = Overrides {
                root: Some(args.root.clone()),
                ..Overrides::default()
            };
            let config = config::load(cli.config.as_deref(), &cwd, &overrides)?;
            roundtrip(args, config).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(data) => println!("{data}"),
        Err(err) => {
            eprintln!();
            match err.downcast_ref::<EditorError>() {
                Some(error) => eprintln!("{} {}", "Error:".red().bold(), ErrorReport::from_error(error)),
                None => eprintln!("{} {}", "Error:".red().bold(), err),
            }
            eprintln!();
            std::process::exit(1);
        }
    }
}
