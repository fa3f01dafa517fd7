mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hoard::config::HoardConfig;

#[derive(Parser)]
#[command(name = "hoard", version, about = "Aggregate personal data into uniform records")]
struct Cli {
    /// Config file (defaults to ~/.hoard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available producer types and their attribute schemas
    Sources,
    /// Fetch configured sources and write records to stdout as JSON lines
    Fetch {
        /// Only fetch these source names (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Rebuild records from a JSON-lines file and print them
    Show {
        /// JSON-lines file written by `hoard fetch`
        file: PathBuf,
        /// Producer type the records came from
        #[arg(long = "type")]
        kind: String,
        /// Relabel records with this origin (defaults to the stored one)
        #[arg(long)]
        origin: Option<String>,
        /// Print one-line summaries instead of full renderings
        #[arg(long)]
        summary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = match &cli.config {
        Some(path) => HoardConfig::load_from(path)?,
        None => HoardConfig::load()?,
    };

    // Log to stderr so stdout stays clean for record output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    hoard::sources::register_builtin();

    match cli.command {
        Command::Sources => cli::sources::list(),
        Command::Fetch { sources } => cli::fetch::fetch(&config, &sources).await?,
        Command::Show {
            file,
            kind,
            origin,
            summary,
        } => cli::show::show(&file, &kind, origin.as_deref(), summary)?,
    }

    Ok(())
}
