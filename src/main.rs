mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use icpc_coder::config::AppConfig;
use icpc_coder::server;

#[derive(Parser)]
#[command(
    name = "icpc-coder",
    version,
    about = "ICPC-2 coding assistant — retrieval-grounded code suggestions for clinical notes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Analyze one note from a file or stdin
    Analyze {
        /// Path to the note text; reads stdin when omitted
        file: Option<PathBuf>,
        /// Print completion fragments as they arrive
        #[arg(long, short)]
        stream: bool,
    },
    /// Manage the catalog index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index and metadata from the raw ICPC-2 CSV
    Build {
        /// Path to the ICPC-2 CSV file
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.icpc-coder/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = AppConfig::load()?;

    // Initialize tracing with the configured log level, to stderr.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Analyze { file, stream } => {
            cli::analyze::analyze(&config, file, stream).await?;
        }
        Command::Index { action } => match action {
            IndexAction::Build { csv } => {
                cli::build_index::build_index(&config, &csv).await?;
            }
        },
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
