//! # Vault Harness CLI (`vault`)
//!
//! Index a folder of Markdown notes and ask questions about it.
//!
//! ## Usage
//!
//! ```bash
//! vault --config ./config/vault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault index <root>` | Load, chunk, embed and store every note under `<root>` |
//! | `vault ask --vault <root> "<question>"` | Answer a question from an indexed vault |
//! | `vault status --vault <root>` | Show where the vault's index lives and how big it is |
//! | `vault serve [--vault <root>]` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Index a vault (Ctrl-C stops between batches)
//! vault index ~/notes --config ./config/vault.toml
//!
//! # Ask a question
//! vault ask --vault ~/notes "What did I decide about the garden?"
//!
//! # Serve the API with the vault already loaded
//! vault serve --vault ~/notes
//! ```
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vault_harness::config;
use vault_harness::server;
use vault_harness::session::Session;
use vault_harness::store::sqlite::{SqliteVectorStore, META_EMBEDDING_MODEL};
use vault_harness::store::{store_path_for, VectorStore};

/// Vault Harness CLI: question answering over a personal notes vault.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vault.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vault",
    about = "Vault Harness: retrieval-augmented question answering over a notes vault",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every note under a vault root.
    ///
    /// Safe to re-run: chunks already stored are not embedded twice.
    Index {
        /// Vault root directory.
        root: PathBuf,
    },

    /// Answer a question from a previously indexed vault.
    Ask {
        /// Vault root directory (must have been indexed).
        #[arg(long)]
        vault: PathBuf,

        /// The question.
        question: String,
    },

    /// Show the index location and vector count for a vault.
    Status {
        #[arg(long)]
        vault: PathBuf,
    },

    /// Start the HTTP API.
    Serve {
        /// Resume this vault's existing index at startup.
        #[arg(long)]
        vault: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { root } => {
            let session = Session::new(cfg);
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupted; stopping after the current batch...");
                    on_signal.cancel();
                }
            });

            let summary = session.initialize_index_with_cancel(&root, &cancel).await?;
            println!("Indexed vault {}", summary.vault.display());
            println!("  documents: {}", summary.documents);
            if summary.skipped > 0 {
                println!("  skipped:   {}", summary.skipped);
            }
            println!("  chunks:    {}", summary.chunks);
            println!("  batches:   {}", summary.batches);
            println!("  new:       {}", summary.inserted);
            println!("  total:     {}", summary.total_vectors);
            println!("  store:     {}", summary.store_path.display());
        }
        Commands::Ask { vault, question } => {
            let session = Session::new(cfg);
            session.open_existing(&vault).await?;
            let answer = session.answer_query(&question).await?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {}", source);
                }
            }
        }
        Commands::Status { vault } => {
            let store_path = store_path_for(&cfg.store.data_dir, &vault);
            println!("Vault: {}", vault.display());
            println!("Store: {}", store_path.display());
            if !store_path.exists() {
                println!("Not indexed yet. Run `vault index {}`.", vault.display());
                return Ok(());
            }
            let store = SqliteVectorStore::open(&store_path).await?;
            let vectors = store.count().await?;
            let model = store.get_meta(META_EMBEDDING_MODEL).await?;
            let dims = store.dims().await?;
            store.close().await;
            println!("Vectors: {}", vectors);
            if let Some(model) = model {
                println!("Embedding model: {}", model);
            }
            if let Some(dims) = dims {
                println!("Dimensions: {}", dims);
            }
        }
        Commands::Serve { vault } => {
            let session = Arc::new(Session::new(cfg));
            if let Some(vault) = vault {
                let vectors = session.open_existing(&vault).await?;
                println!("Loaded {} vectors for {}", vectors, vault.display());
            }
            server::run_server(session).await?;
        }
    }

    Ok(())
}
