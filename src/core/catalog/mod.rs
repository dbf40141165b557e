//! SQLite-backed project catalog
//!
//! The catalog is a derived mirror of the ground-truth project files that
//! makes searching thousands of projects fast:
//! - One row per project plus its file manifest and item-tag manifest
//! - Optional FTS5 shadow tables for ranked search, with a substring fallback
//! - Discovered resource links and the discovery scan-history cache
//!
//! IMPORTANT: The catalog is never authoritative. It can be deleted at any
//! time and rebuilt from the library.

mod history;
mod links;
mod projects;
mod queries;
mod schema;
mod shadow;
mod types;

// Re-export all types
pub use links::ClaimPolicy;
pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use rusqlite::Connection;
use tracing::debug;

use crate::core::layout::Library;

/// Options controlling how the catalog is opened
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Create and use the FTS5 shadow tables when the engine supports them
    pub full_text: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { full_text: true }
    }
}

/// The project catalog backed by SQLite
pub struct CatalogStore {
    conn: Connection,
    path: PathBuf,
    full_text: bool,
}

impl CatalogStore {
    /// Open or create the catalog of a library
    pub fn open(library: &Library) -> Result<Self> {
        library.ensure_system_dir()?;
        Self::open_path(&library.index_path(), OpenOptions::default())
    }

    /// Open or create a catalog file at an explicit path
    pub fn open_path(path: &Path, options: OpenOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }

        let conn = Connection::open(path).into_diagnostic()?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .into_diagnostic()?;

        let mut store = Self {
            conn,
            path: path.to_path_buf(),
            full_text: false,
        };
        store.rebuild_schema(options.full_text)?;
        debug!(
            "opened catalog {} (full text: {})",
            store.path.display(),
            store.full_text
        );
        Ok(store)
    }

    /// Whether ranked full-text search is available
    pub fn full_text(&self) -> bool {
        self.full_text
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside one transaction; an error rolls everything back
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction().into_diagnostic()?;
        let value = f(self)?;
        tx.commit().into_diagnostic()?;
        Ok(value)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_schema() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        assert!(store.full_text());

        let tables: Vec<String> = store
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for expected in [
            "cached_inspection_folders",
            "external_resources",
            "file_fts",
            "files",
            "item_tag_fts",
            "item_tags",
            "project_fts",
            "projects",
            "scanned_directories",
            "shared_drive_folders",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_open_is_idempotent() {
        let tmp = tempdir().unwrap();
        drop(open_store(tmp.path(), true));
        let store = open_store(tmp.path(), true);
        assert!(store.full_text());
    }

    #[test]
    fn test_open_without_full_text() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), false);
        assert!(!store.full_text());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let result: Result<()> = store.in_transaction(|s| {
            s.conn()
                .execute("INSERT INTO scanned_directories(path, scanned_as_of, scanned_at) VALUES('/x', '2020-01-01', '2020-01-01T00:00:00')", [])
                .into_diagnostic()?;
            Err(miette::miette!("boom"))
        });
        assert!(result.is_err());

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM scanned_directories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
