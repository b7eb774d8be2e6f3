//! # citebridge CLI
//!
//! ## Usage
//!
//! ```bash
//! citebridge --config ./config/citebridge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `citebridge init` | Create the SQLite library and run schema migrations |
//! | `citebridge import <file>` | Load a CSL-JSON array into a library |
//! | `citebridge resolve <keys>` | Resolve citation keys and print the reply |
//! | `citebridge search "<query>"` | Quick search and print the reply |
//! | `citebridge serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `citebridge=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use citebridge::{commands, config, import, migrate, server};

/// citebridge: resolve citation keys against a local reference library.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/citebridge.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "citebridge",
    about = "Resolve citation keys and render bibliographies from a local reference library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/citebridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import a CSL-JSON array.
    Import {
        /// Path to the CSL-JSON file.
        file: PathBuf,

        /// Target library id. Defaults to the personal library.
        #[arg(long)]
        library: Option<i64>,

        /// Add every imported item to this collection, creating it if needed.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Resolve comma-separated citation keys.
    Resolve {
        /// Keys such as `DoeBook2005,doe:2006article`.
        keys: String,

        /// Output format (`json`, `key`, `bibliography`, `easykey`, `bibtex`, ...).
        #[arg(long)]
        format: Option<String>,

        /// Citation style for `--format bibliography`.
        #[arg(long)]
        style: Option<String>,
    },

    /// Quick search over all libraries.
    Search {
        /// Search words, separated by spaces or `+`.
        query: String,

        /// `titleCreatorYear`, `fields`, or `everything`.
        #[arg(long)]
        method: Option<String>,

        /// Output format.
        #[arg(long)]
        format: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("citebridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let reply = match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Import {
            file,
            library,
            collection,
        } => {
            let summary =
                import::import_csl_json(&cfg, &file, library, collection.as_deref()).await?;
            println!("import {}", file.display());
            println!("  items: {}", summary.items);
            println!("  notes: {}", summary.notes);
            println!("  attachments: {}", summary.attachments);
            println!("ok");
            return Ok(());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
            return Ok(());
        }
        Commands::Resolve {
            keys,
            format,
            style,
        } => commands::run_resolve(&cfg, &keys, format.as_deref(), style.as_deref()).await?,
        Commands::Search {
            query,
            method,
            format,
        } => commands::run_search(&cfg, &query, method.as_deref(), format.as_deref()).await?,
    };

    if reply.is_success() {
        println!("{}", reply.body);
        Ok(())
    } else {
        eprintln!("{}", reply.body);
        std::process::exit(1);
    }
}
