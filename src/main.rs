use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use lotwise::core::log::init_logging;

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
    /// Display portfolio snapshots
    Snapshot {
        /// Only show this portfolio
        #[arg(short, long)]
        portfolio: Option<String>,
        /// Point in time of the snapshot (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Fetch the latest quotes of securities
    UpdateQuotes {
        /// Securities to update, all if omitted
        security_ids: Vec<String>,
    },
}

impl From<Commands> for lotwise::AppCommand {
    fn from(cmd: Commands) -> lotwise::AppCommand {
        match cmd {
            Commands::Snapshot { portfolio, at } => lotwise::AppCommand::Snapshot { portfolio, at },
            Commands::UpdateQuotes { security_ids } => {
                lotwise::AppCommand::UpdateQuotes { security_ids }
            }
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => lotwise::cli::setup::setup(cli.config_path.as_deref()),
        Some(cmd) => lotwise::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
