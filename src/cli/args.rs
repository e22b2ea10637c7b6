//! CLI argument definitions using clap derive

use crate::platform::Architecture;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// rbup - Ruby runtime provisioner for CI workers
///
/// Resolves a version request against the platform's build catalog,
/// installs the runtime, and installs and caches Bundler dependencies.
#[derive(Parser, Debug)]
#[command(name = "rbup")]
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
    #[arg(short, long, global = true, env = "RBUP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a Ruby runtime and its bundled dependencies
    Install(InstallArgs),

    /// List the versions available on this platform
    Versions(VersionsArgs),

    /// Manage the local dependency cache store
    Cache(CacheArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Runtime request: a version (3.2), engine-version
    /// (jruby-9.4.8.0), engine alone, or "default" to read
    /// .ruby-version / .tool-versions
    #[arg(default_value = "default")]
    pub runtime: String,

    /// Target architecture
    #[arg(long, value_enum, default_value_t = Architecture::X64)]
    pub architecture: Architecture,

    /// Bundler version to install: a version, "default" (lockfile,
    /// then latest), "latest", or "none" to skip dependencies
    #[arg(long, default_value = "default")]
    pub bundler: String,

    /// Run bundle install and cache the result
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub bundler_cache: bool,

    /// Project directory to operate in (defaults to current directory)
    #[arg(short = 'C', long)]
    pub working_directory: Option<PathBuf>,

    /// Dependency cache store directory override
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for the versions command
#[derive(Parser, Debug)]
pub struct VersionsArgs {
    /// Engine to list
    #[arg(long, default_value = "ruby")]
    pub engine: String,

    /// Architecture whose catalog to list
    #[arg(long, value_enum, default_value_t = Architecture::Default)]
    pub architecture: Architecture,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List saved dependency cache entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Store directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Remove all saved dependency cache entries
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,

        /// Store directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
