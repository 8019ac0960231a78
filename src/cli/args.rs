//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Hoard - content-addressed storage for large project data
///
/// Saves files and directories into a local cache, links them back into the
/// workspace, and syncs cache entries with remote storage.
#[derive(Parser, Debug)]
#[command(name = "hoard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "HOARD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a .hoard project directory here
    Init(InitArgs),

    /// Store paths in the cache and write pointer files
    Save(SaveArgs),

    /// Restore tracked paths from the cache
    Checkout(CheckoutArgs),

    /// Upload cache entries to a remote
    Push(SyncArgs),

    /// Download cache entries from a remote and check them out
    Pull(SyncArgs),

    /// Compare the cache with a remote
    Status(StatusArgs),

    /// Remove cache entries no pointer file references
    Gc(GcArgs),

    /// Replace cache links with writable copies
    Unprotect(UnprotectArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Default remote url (e.g. s3://bucket/prefix or /mnt/storage)
    #[arg(long)]
    pub remote: Option<String>,
}

/// Arguments for the save command
#[derive(Parser, Debug)]
pub struct SaveArgs {
    /// Files or directories to save
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Arguments for the checkout command
#[derive(Parser, Debug)]
pub struct CheckoutArgs {
    /// Tracked paths or pointer files (default: every pointer in the project)
    pub targets: Vec<PathBuf>,

    /// Discard local changes to tracked paths
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments shared by push and pull
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Tracked paths or pointer files (default: every pointer in the project)
    pub targets: Vec<PathBuf>,

    /// Parallel transfers (default: from config)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Remote name (default: core.remote)
    #[arg(short, long)]
    pub remote: Option<String>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the gc command
#[derive(Parser, Debug)]
pub struct GcArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the unprotect command
#[derive(Parser, Debug)]
pub struct UnprotectArgs {
    /// Tracked files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Add or replace a remote
    Remote {
        /// Remote name
        name: String,
        /// Remote url
        url: String,
        /// Make this the default remote
        #[arg(short, long)]
        default: bool,
    },
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}
