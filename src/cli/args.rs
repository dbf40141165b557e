//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    archive::{DeleteArgs, UnarchiveArgs},
    completions::CompletionsArgs,
    config::ConfigCommands,
    edit::EditArgs,
    init::InitArgs,
    link::LinkCommands,
    new::NewArgs,
    pin::{IdArgs, OpenArgs},
    rebuild::{RebuildArgs, SyncArgs},
    search::SearchArgs,
    show::ShowArgs,
    stats::RecentArgs,
};

#[derive(Parser)]
#[command(name = "prjindex")]
#[command(author, version, about = "Project library index and resource linker")]
#[command(long_about = "Search a filesystem project library through a rebuildable SQLite catalog, and link projects to report folders discovered on shared drives.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Library root (default: PRJINDEX_LIBRARY or the configured library)
    #[arg(long, global = true)]
    pub library: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a library and its catalog
    Init(InitArgs),

    /// Create a new project
    New(NewArgs),

    /// Edit a project's tags, status or description
    Edit(EditArgs),

    /// Move a project into the archive directory
    Archive(IdArgs),

    /// Move an archived project back to its month directory
    Unarchive(UnarchiveArgs),

    /// Delete a project directory and its catalog entry
    Delete(DeleteArgs),

    /// Search projects
    Search(SearchArgs),

    /// Show one project with its links
    Show(ShowArgs),

    /// Rebuild the catalog from the library
    Rebuild(RebuildArgs),

    /// Re-index one project
    Sync(SyncArgs),

    /// Pin a project to the top of listings
    Pin(IdArgs),

    /// Unpin a project
    Unpin(IdArgs),

    /// Record that a project was opened and print its directory
    Open(OpenArgs),

    /// Show library statistics
    Stats,

    /// Show recently opened and created projects
    Recent(RecentArgs),

    /// Discover and review resource links
    #[command(subcommand)]
    Link(LinkCommands),

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (table for lists, details for show)
    #[default]
    Auto,
    /// Tab-aligned table (for reading and piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Just IDs, one per line
    Id,
}
