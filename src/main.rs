//! # fedreg CLI
//!
//! The `fedreg` binary drives ingestion, search, and the chat agent.
//!
//! ## Usage
//!
//! ```bash
//! fedreg [--config ./config/fedreg.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fedreg init` | Create the `federal_documents` table |
//! | `fedreg ingest` | Fetch and upsert documents for a date range |
//! | `fedreg search` | Search stored documents |
//! | `fedreg get <number>` | Print one stored document |
//! | `fedreg chat [query]` | Ask the agent (interactive without a query) |
//! | `fedreg serve` | Start the chat HTTP server |
//!
//! Store settings come from `DB_*` environment variables and the model key
//! from `OPENAI_API_KEY`; a `.env` file in the working directory is loaded
//! first if present.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fedreg_agent::config::{self, StoreBackend};
use fedreg_agent::search::SearchArgs;
use fedreg_agent::{agent, get, ingest, migrate, search, server};

/// fedreg: a chat agent over Federal Register documents.
#[derive(Parser)]
#[command(
    name = "fedreg",
    about = "Ingest Federal Register documents and chat about them",
    version
)]
struct Cli {
    /// Path to the settings file (TOML).
    ///
    /// Defaults to `./config/fedreg.toml`; built-in defaults apply when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the document table. Idempotent.
    Init,

    /// Fetch documents published in a date range and upsert them.
    ///
    /// Defaults to January 1 of the current year through today.
    Ingest {
        /// First publication date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Last publication date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,
    },

    /// Search stored documents, newest first.
    Search {
        /// Text to find in titles or abstracts.
        #[arg(long)]
        query: Option<String>,

        /// Agency name, or part of it.
        #[arg(long)]
        agency: Option<String>,

        /// Earliest publication date (YYYY-MM-DD).
        #[arg(long)]
        start_date: Option<String>,

        /// Latest publication date (YYYY-MM-DD).
        #[arg(long)]
        end_date: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print a stored document by its document number.
    Get {
        /// Federal Register document number (e.g. `2025-04512`).
        document_number: String,
    },

    /// Ask the agent a question.
    ///
    /// Without a query, starts an interactive session; type `quit` to leave.
    Chat {
        query: Option<String>,
    },

    /// Start the chat HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&StoreBackend::from_env()?).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { start, end } => {
            ingest::run_ingest(&cfg, start, end).await?;
        }
        Commands::Search {
            query,
            agency,
            start_date,
            end_date,
            limit,
        } => {
            let args = SearchArgs {
                query,
                agency,
                start_date,
                end_date,
                limit,
            };
            search::run_search(&cfg, args).await?;
        }
        Commands::Get { document_number } => {
            get::run_get(&document_number).await?;
        }
        Commands::Chat { query } => {
            agent::run_chat(&cfg, query).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
