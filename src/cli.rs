//! Command-line interface definitions for dupetree.
//!
//! Global options (verbosity, color, config, database) apply to every
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Remember a directory and scan everything remembered
//! dupetree dirs add ~/Pictures
//! dupetree scan
//!
//! # Scan extra paths once, without remembering them
//! dupetree scan ~/Downloads /mnt/backup
//!
//! # Show the tree of files sharing content, duplicates only
//! dupetree tree --key hash --duplicates-only
//!
//! # Show every copy of one file
//! dupetree group ~/Pictures/cat.jpg --key hash
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::grouping::EquivalenceKey;

/// Find duplicate files and browse them as a directory tree.
///
/// dupetree hashes every file under the selected directories (BLAKE3),
/// stores the results in a local database and groups them by name, by
/// content or by both.
#[derive(Debug, Parser)]
#[command(name = "dupetree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file (overrides the configured one)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash every file under the selected directories
    Scan(ScanArgs),
    /// Manage the remembered scan directories
    Dirs(DirsArgs),
    /// Print the duplicate tree from the last scan
    Tree(TreeArgs),
    /// Print every copy of one file
    Group(GroupArgs),
    /// Show or initialize the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan in addition to the remembered ones
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Also remember the given directories for later scans
    #[arg(long)]
    pub remember: bool,

    /// Number of hash worker threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Hasher read size in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Plain-text progress without animation
    #[arg(long)]
    pub accessible: bool,
}

/// Arguments for the dirs subcommand.
#[derive(Debug, Args)]
pub struct DirsArgs {
    /// Action to perform
    #[command(subcommand)]
    pub action: DirsCommand,
}

/// Remembered directory actions.
#[derive(Debug, Subcommand)]
pub enum DirsCommand {
    /// Remember a directory
    Add {
        /// Directory to remember
        path: PathBuf,
    },
    /// Forget a directory
    Remove {
        /// Directory to forget
        path: PathBuf,
    },
    /// List remembered directories
    List,
}

/// Arguments for the tree subcommand.
#[derive(Debug, Args)]
pub struct TreeArgs {
    /// What makes two files duplicates (default: from config)
    #[arg(short, long, value_enum)]
    pub key: Option<KeyArg>,

    /// Hide files and directories without duplicates
    #[arg(short, long, overrides_with = "all")]
    pub duplicates_only: bool,

    /// Show every file, even if the config asks for duplicates only
    #[arg(short, long, overrides_with = "duplicates_only")]
    pub all: bool,

    /// Print the visible tree as JSON
    #[arg(long)]
    pub json: bool,
}

impl TreeArgs {
    /// The duplicates-only choice made on the command line, if any.
    #[must_use]
    pub fn duplicates_only_choice(&self) -> Option<bool> {
        match (self.duplicates_only, self.all) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }
}

/// Arguments for the group subcommand.
#[derive(Debug, Args)]
pub struct GroupArgs {
    /// File whose copies to show
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// What makes two files duplicates (default: from config)
    #[arg(short, long, value_enum)]
    pub key: Option<KeyArg>,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Action to perform
    #[command(subcommand)]
    pub action: ConfigCommand,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the merged configuration as TOML
    Show,
    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Equivalence key as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyArg {
    /// Same file name
    Name,
    /// Same content
    Hash,
    /// Same file name and same content
    NameHash,
}

impl From<KeyArg> for EquivalenceKey {
    fn from(arg: KeyArg) -> Self {
        match arg {
            KeyArg::Name => Self::ByName,
            KeyArg::Hash => Self::ByHash,
            KeyArg::NameHash => Self::ByNameAndHash,
        }
    }
}
