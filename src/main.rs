//! # docvec CLI
//!
//! The `docvec` binary initialises the database, serves the collections
//! HTTP API, and runs one-off queries and repairs against the configured
//! backend.
//!
//! ## Usage
//!
//! ```bash
//! docvec --config ./config/docvec.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docvec init` | Create the SQLite database and run schema migrations |
//! | `docvec serve` | Start the HTTP server |
//! | `docvec collections [name] [--id <id>]` | List collections or read documents |
//! | `docvec query <collection> "<text>" [-k N]` | Nearest-neighbour query |
//! | `docvec vectors <collection>` | Dump a collection's vector records |
//! | `docvec reconcile <collection> [--dry-run]` | Repair the vector index |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docvec::config::{self, Backend};
use docvec::{commands, migrate, server};

/// docvec: document collections mirrored into a vector index.
#[derive(Parser)]
#[command(name = "docvec", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docvec.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// List collections, or print the documents of one.
    Collections {
        /// Collection name. Without it, collection names are listed.
        name: Option<String>,

        /// Only the document with this id.
        #[arg(long)]
        id: Option<String>,
    },

    /// Query a collection's vector index.
    Query {
        collection: String,
        text: String,

        /// Number of results; defaults to `collections.default_k`.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print every vector record of a collection.
    Vectors { collection: String },

    /// Make the vector index agree with the document store.
    ///
    /// Removes vectors without a document, indexes documents without a
    /// vector, and re-embeds vectors whose text is out of date.
    Reconcile {
        collection: String,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvec=info,docvec_core=info,tower_http=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if cfg.db.backend == Backend::Memory {
                println!("Memory backend configured; nothing to initialize.");
                return Ok(());
            }
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Collections { name, id } => {
            commands::run_collections(&cfg, name.as_deref(), id.as_deref()).await?;
        }
        Commands::Query { collection, text, k } => {
            commands::run_query(&cfg, &collection, &text, k).await?;
        }
        Commands::Vectors { collection } => {
            commands::run_vectors(&cfg, &collection).await?;
        }
        Commands::Reconcile {
            collection,
            dry_run,
        } => {
            commands::run_reconcile(&cfg, &collection, dry_run).await?;
        }
    }

    Ok(())
}
