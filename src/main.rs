use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxrates::core::log::init_logging;

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

impl From<Commands> for fxrates::AppCommand {
    fn from(cmd: Commands) -> fxrates::AppCommand {
        match cmd {
            Commands::Serve => fxrates::AppCommand::Serve,
            Commands::Update => fxrates::AppCommand::Update,
            Commands::Latest { currency } => fxrates::AppCommand::Latest { currency },
            Commands::History => fxrates::AppCommand::History,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the hourly updater and the HTTP API
    Serve,
    /// Fetch the rate document once and store its rates
    Update,
    /// Show the latest stored rate for a currency
    Latest {
        /// Currency code, defaults to the configured default currency
        #[arg(long)]
        currency: Option<String>,
    },
    /// Show every stored rate
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fxrates::cli::setup::setup(cli.config_path.as_deref()),
        Some(cmd) => fxrates::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
