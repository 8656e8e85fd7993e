//! # Librarian CLI (`librarian`)
//!
//! Runs the document librarian agent and its one-shot maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! librarian --config ./config/librarian.toml [command]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `librarian watch` | Watch the sources and keep the library current (default) |
//! | `librarian reindex` | Force every matching file through the pipeline once |
//! | `librarian stats` | Summarize the persisted index |
//! | `librarian sources` | List configured source roots and whether they exist |
//!
//! ## Examples
//!
//! ```bash
//! # Run the agent with a config file
//! librarian --config ./config/librarian.toml
//!
//! # Watch a directory without a config file
//! librarian --root ~/notes --library ~/library watch
//!
//! # Rebuild the index from scratch
//! librarian reindex --config ./config/librarian.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use doc_librarian::{agent, config, sources, stats};

/// Document librarian: watches folders of text documents, files a
/// normalized copy of each into a category tree, and keeps a JSON index of
/// everything it has filed.
#[derive(Parser)]
#[command(name = "librarian", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/librarian.toml`. May be absent when at least
    /// one `--root` is given.
    #[arg(long, global = true, default_value = "./config/librarian.toml")]
    config: PathBuf,

    /// Additional source directory to watch. Repeatable.
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    /// Destination root of the library tree.
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Path of the JSON index artifact.
    #[arg(long, global = true)]
    index_file: Option<PathBuf>,

    /// Path of the JSON ledger artifact.
    #[arg(long, global = true)]
    ledger_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch all sources until SIGTERM or SIGINT.
    ///
    /// Pre-existing files are processed first, then every file that
    /// settles after a write. Unchanged files are skipped via the ledger.
    Watch,

    /// Reprocess every matching file once, ignoring the ledger, then exit.
    Reindex,

    /// Print totals and per-category counts from the index artifact.
    Stats,

    /// List configured sources and their status.
    Sources,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();

    // Panics are logged instead of only printed, so they reach the same sink
    // as everything else.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "unhandled panic");
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let overrides = config::Overrides {
        roots: cli.roots,
        library: cli.library,
        index_file: cli.index_file,
        ledger_file: cli.ledger_file,
    };
    let cfg = config::load_with_overrides(&cli.config, &overrides)?;

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => {
            agent::run_watch(&cfg).await?;
        }
        Commands::Reindex => {
            let report = agent::run_reindex(&cfg).await?;
            agent::print_reindex_report(&cfg, &report);
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
    }

    Ok(())
}
