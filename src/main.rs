//! # MotoCare CLI (`motocare`)
//!
//! ## Usage
//!
//! ```bash
//! motocare --config ./config/motocare.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `motocare init` | Create the SQLite database and schema |
//! | `motocare serve` | Start the HTTP API |
//! | `motocare fred load` | Embed the knowledge corpus into the database |
//! | `motocare fred ask "<question>"` | Ask Fred from the terminal |
//! | `motocare stats` | Row counts and knowledge coverage |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to adjust
//! (default `motocare=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use motocare::{config, fred, knowledge, migrate, server, stats};

/// MotoCare: motorcycle maintenance log with Fred, a maintenance assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/motocare.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "motocare",
    about = "MotoCare: motorcycle maintenance log and assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/motocare.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables. Running it again is safe.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Fred's knowledge base and terminal access.
    Fred {
        #[command(subcommand)]
        action: FredAction,
    },

    /// Show row counts and knowledge coverage.
    Stats,
}

#[derive(Subcommand)]
enum FredAction {
    /// Embed the knowledge corpus.
    ///
    /// Only chunks whose content or embedding model changed since the last
    /// load are embedded again.
    Load {
        /// TOML corpus file with `[[chunks]]` entries. Defaults to the built-in corpus.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Delete the source's stored chunks and embed everything.
        #[arg(long)]
        rebuild: bool,
    },

    /// Ask Fred a question.
    Ask {
        /// The question.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("motocare=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Fred { action } => match action {
            FredAction::Load { file, rebuild } => {
                knowledge::run_load(&cfg, file.as_deref(), rebuild).await?;
            }
            FredAction::Ask { question } => {
                fred::run_ask(&cfg, &question).await?;
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
