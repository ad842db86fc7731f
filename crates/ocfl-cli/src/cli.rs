use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ocfl-index",
    about = "Index and serve the contents of an OCFL storage root",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "OCFL_INDEX_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the index server
    Serve(ServeArgs),
    /// Index the storage root, or only the given object ids
    Index(IndexArgs),
    /// Show what the index holds
    Status(StoreArgs),
    /// Print version information
    Version,
}

/// Where the storage root and index live. Flags override the config file
/// and `OCFL_INDEX_*` variables.
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// Storage root directory
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Index log file
    #[arg(long, conflicts_with = "memory")]
    pub index_file: Option<PathBuf>,
    /// Keep the index in memory only
    #[arg(long)]
    pub memory: bool,
    /// Inventories parsed at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
    /// Record file sizes from content file metadata
    #[arg(long)]
    pub read_sizes: bool,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Listen address, e.g. 127.0.0.1:8080 or :8080
    #[arg(long)]
    pub bind: Option<String>,
    /// Run a full index when the server starts
    #[arg(long)]
    pub index: bool,
}

#[derive(Args)]
pub struct IndexArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Object ids to reindex; all objects when empty
    pub ids: Vec<String>,
}
