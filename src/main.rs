//! # docchat CLI
//!
//! Ask questions about a set of PDF, DOCX, and CSV files.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat chat <files...>` | Process the files, then answer questions from stdin |
//! | `docchat extract <files...>` | Print the concatenated extracted text |
//! | `docchat chunks <files...>` | Show how the text would be chunked |
//! | `docchat serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Chat over a contract and its price sheet
//! OPENAI_API_KEY=sk-... docchat chat contract.pdf prices.csv
//!
//! # Inspect chunking with a custom config
//! docchat --config ./config/docchat.toml chunks handbook.docx --show-text
//!
//! # Serve the HTTP API
//! docchat serve --config ./config/docchat.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docchat::{chat_cmd, config, ingest, server};

/// docchat: chat with your documents.
///
/// Settings come from an optional TOML file (see
/// `config/docchat.example.toml`) and from the environment. A `.env` file in
/// the working directory is loaded first.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Ask questions about PDF, DOCX, and CSV files using a hosted chat model",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `info`, `docchat=debug`).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process files and start an interactive chat.
    ///
    /// Reads one question per line from stdin. `/reset` re-processes the
    /// same files with an empty history; `/quit` exits.
    Chat {
        /// PDF, DOCX, or CSV files to process.
        files: Vec<PathBuf>,

        /// Chat service credential. Falls back to `[chat].api_key`, then `OPENAI_API_KEY`.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print the text extracted from the given files.
    Extract {
        files: Vec<PathBuf>,
    },

    /// Show how the extracted text is split into chunks.
    Chunks {
        files: Vec<PathBuf>,

        /// Print each chunk's text as well as its size.
        #[arg(long)]
        show_text: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::Config::default(),
    };

    match cli.command {
        Commands::Chat { files, api_key } => {
            chat_cmd::run_chat(cfg, &files, api_key).await?;
        }
        Commands::Extract { files } => {
            ingest::run_extract(&files)?;
        }
        Commands::Chunks { files, show_text } => {
            ingest::run_chunks(&cfg, &files, show_text)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
