//! Shared helper functions for CLI commands
//!
//! Opening the configured library and catalog, plus small formatting
//! helpers used by several commands.

use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::CatalogStore;
use crate::core::error::LibraryError;
use crate::core::indexer::Indexer;
use crate::core::layout::Library;
use crate::core::project::ProjectEntry;
use crate::core::Config;

/// Configuration, library and catalog for one command invocation
pub struct LibraryContext {
    pub config: Config,
    pub library: Library,
    pub store: CatalogStore,
}

impl LibraryContext {
    /// Resolve the library from `--library`, the environment or the config,
    /// and open its catalog
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let (config, library) = open_library(global)?;
        let store = CatalogStore::open(&library)?;
        Ok(Self {
            config,
            library,
            store,
        })
    }

    pub fn indexer(&self) -> Indexer<'_> {
        Indexer::new(&self.library, &self.store).batch_size(self.config.rebuild_batch_size)
    }

    /// Locate a project's ground truth by id
    pub fn project_entry(&self, id: &str) -> Result<ProjectEntry> {
        self.library
            .find_project(id.trim())
            .ok_or_else(|| LibraryError::project_not_found(id.trim()).into())
    }
}

/// Resolve configuration and library without opening the catalog, for
/// commands that open it on a worker thread
pub fn open_library(global: &GlobalOpts) -> Result<(Config, Library)> {
    let config = Config::load(global.library.as_deref());
    let root = config.library_root()?;
    let library = Library::open(&root)?;
    Ok((config, library))
}

/// `Auto` resolved to a command's preferred format
pub fn effective_format(format: OutputFormat, auto: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => auto,
        other => other,
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

/// Truncate a string to `max_len` characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
