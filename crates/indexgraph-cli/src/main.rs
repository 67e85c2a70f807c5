mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "indexgraph",
    version,
    about = "Dependency-graph indexing for AI coding assistants",
    long_about = "indexgraph walks a repository, parses each source file with tree-sitter,\n\
        and stores symbols, references, and dependency edges in a local SQLite\n\
        database. Supports full and incremental indexing and a filesystem watcher\n\
        for keeping the index current.\n\n\
        Supported languages: Rust, TypeScript, Python, Go.\n\n\
        Quick start:\n  \
        indexgraph init\n  \
        indexgraph index\n  \
        indexgraph watch\n  \
        indexgraph doctor"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: .indexgraph/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize indexgraph for a project
    ///
    /// Creates the SQLite database under the project's data directory and
    /// registers the repository, detecting the default VCS ref if present.
    ///
    /// Example: indexgraph init --path /path/to/project
    Init {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Check project health and diagnose issues
    ///
    /// Verifies SQLite integrity, repository registration, tree-sitter
    /// grammar availability, and ignore rule configuration.
    ///
    /// Example: indexgraph doctor
    Doctor {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Index a project's source code
    ///
    /// Walks the working tree, extracts symbols and references via
    /// tree-sitter, resolves dependency edges, and stores everything in
    /// two chunked, transactional passes.
    ///
    /// Examples:
    ///   indexgraph index
    ///   indexgraph index --force
    Index {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Start a new job even if one is already active for this ref
        #[arg(long)]
        force: bool,
    },
    /// Watch a project for changes and index incrementally
    ///
    /// Debounces filesystem events and dispatches added, modified, and
    /// deleted paths into the incremental indexer as they settle.
    ///
    /// Example: indexgraph watch
    Watch {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Export, import, or merge index state for moving between working copies
    #[command(subcommand)]
    Sync(SyncCommands),
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Export every table to JSONL files under a directory
    Export {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Directory to export JSONL files into
        #[arg(long)]
        out: String,
    },
    /// Apply a deletion manifest and import JSONL table files
    Import {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Directory containing JSONL table files to import
        #[arg(long)]
        from: String,
    },
    /// Three-way merge a single table's JSONL export
    Merge {
        /// Path to the base export file
        #[arg(long)]
        base: String,

        /// Path to our export file
        #[arg(long)]
        ours: String,

        /// Path to their export file
        #[arg(long)]
        theirs: String,

        /// Path to write the merged result to
        #[arg(long)]
        out: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_file = cli.config.as_deref().map(std::path::Path::new);

    match cli.command {
        Commands::Init { path } => {
            let path = resolve_path(path)?;
            commands::init::run(&path, config_file)?;
        }
        Commands::Doctor { path } => {
            let path = resolve_path(path)?;
            commands::doctor::run(&path, config_file)?;
        }
        Commands::Index { path, force } => {
            let path = resolve_path(path)?;
            commands::index::run(&path, config_file, force)?;
        }
        Commands::Watch { path } => {
            let path = resolve_path(path)?;
            commands::watch::run(&path, config_file)?;
        }
        Commands::Sync(sync_command) => match sync_command {
            SyncCommands::Export { path, out } => {
                let path = resolve_path(path)?;
                commands::sync::run_export(&path, config_file, std::path::Path::new(&out))?;
            }
            SyncCommands::Import { path, from } => {
                let path = resolve_path(path)?;
                commands::sync::run_import(&path, config_file, std::path::Path::new(&from))?;
            }
            SyncCommands::Merge { base, ours, theirs, out } => {
                commands::sync::run_merge(
                    std::path::Path::new(&base),
                    std::path::Path::new(&ours),
                    std::path::Path::new(&theirs),
                    std::path::Path::new(&out),
                )?;
            }
        },
    }

    Ok(())
}

fn resolve_path(path: Option<String>) -> anyhow::Result<std::path::PathBuf> {
    match path {
        Some(p) => Ok(std::path::PathBuf::from(p)),
        None => Ok(std::env::current_dir()?),
    }
}
