use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use foliofit::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for foliofit::AppCommand {
    fn from(cmd: Commands) -> foliofit::AppCommand {
        match cmd {
            Commands::Validate { tickers } => foliofit::AppCommand::Validate { tickers },
            Commands::Models => foliofit::AppCommand::Models,
            Commands::Analyze { portfolio } => foliofit::AppCommand::Analyze { portfolio },
            Commands::Aggregate => foliofit::AppCommand::Aggregate,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Check that tickers resolve and show their asset classes
    Validate {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// List the model portfolios
    Models,
    /// Compare a configured portfolio against the closest model
    Analyze {
        /// Portfolio name, defaults to the first configured portfolio
        #[arg(short, long)]
        portfolio: Option<String>,
    },
    /// Analyze all configured portfolios as one household
    Aggregate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => foliofit::cli::setup::setup_at_path(path),
            None => foliofit::cli::setup::setup(),
        },
        Some(cmd) => foliofit::run_command(cmd.into(), cli.config_path.as_deref(), cli.json).await,
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
