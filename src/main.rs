use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use taxlot::cli::setup::setup;
use taxlot::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Compute gains, dividends and withheld tax for the reporting year
    Report {
        /// Transaction CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the deduplicated, classified transactions
    Transactions {
        /// Transaction CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli.config_path.as_deref();
    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(Commands::Report { files }) => {
            taxlot::run_command(taxlot::AppCommand::Report, config_path, &files).await
        }
        Some(Commands::Transactions { files }) => {
            taxlot::run_command(taxlot::AppCommand::Transactions, config_path, &files).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
