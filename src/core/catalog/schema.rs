//! Database schema initialization and migration

use std::collections::HashSet;

use miette::{IntoDiagnostic, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::CatalogStore;

/// Stored in `PRAGMA user_version` once the schema is current
const SCHEMA_VERSION: i32 = 2;

impl CatalogStore {
    /// Create missing tables and indexes, add missing columns and try to set
    /// up the full-text shadow tables. Safe to run on every open.
    pub(super) fn rebuild_schema(&mut self, want_full_text: bool) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            -- Project catalog rows
            CREATE TABLE IF NOT EXISTS projects(
                id TEXT PRIMARY KEY,
                customer TEXT NOT NULL,
                name TEXT NOT NULL,
                tags_json TEXT NOT NULL,
                status TEXT NOT NULL,
                create_time TEXT NOT NULL,
                month TEXT NOT NULL,
                project_dir TEXT NOT NULL,
                description TEXT,
                part_number TEXT,
                pinned INTEGER NOT NULL DEFAULT 0,
                last_open_time TEXT,
                open_count INTEGER NOT NULL DEFAULT 0
            );

            -- Per-project file manifest
            CREATE TABLE IF NOT EXISTS files(
                project_id TEXT NOT NULL,
                rel_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                PRIMARY KEY(project_id, rel_path),
                FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            -- Per-item tag manifest
            CREATE TABLE IF NOT EXISTS item_tags(
                project_id TEXT NOT NULL,
                rel_path TEXT NOT NULL,
                tag TEXT NOT NULL,
                is_dir INTEGER NOT NULL,
                PRIMARY KEY(project_id, rel_path, tag),
                FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_files_project_id ON files(project_id);
            CREATE INDEX IF NOT EXISTS idx_item_tags_project_id ON item_tags(project_id);

            -- Inspection report folder links
            CREATE TABLE IF NOT EXISTS external_resources(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                root_path TEXT NOT NULL,
                folder_year INTEGER NOT NULL,
                folder_date TEXT NOT NULL,
                folder_name TEXT NOT NULL,
                full_path TEXT NOT NULL UNIQUE,
                match_score INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ext_res_project_id ON external_resources(project_id);

            -- Shared-drive folder links
            CREATE TABLE IF NOT EXISTS shared_drive_folders(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                root_path TEXT NOT NULL,
                folder_path TEXT NOT NULL,
                folder_name TEXT NOT NULL,
                file_count INTEGER NOT NULL DEFAULT 0,
                total_size INTEGER NOT NULL DEFAULT 0,
                modified_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'indexed',
                match_score INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(root_path, folder_path)
            );
            CREATE INDEX IF NOT EXISTS idx_shared_folders_project_id ON shared_drive_folders(project_id);
            CREATE INDEX IF NOT EXISTS idx_shared_folders_status ON shared_drive_folders(status);

            -- Directories whose children are known as of a past date
            CREATE TABLE IF NOT EXISTS scanned_directories(
                path TEXT PRIMARY KEY,
                scanned_as_of TEXT NOT NULL,
                scanned_at TEXT NOT NULL
            );

            -- Child candidates replayed for scanned directories
            CREATE TABLE IF NOT EXISTS cached_inspection_folders(
                parent_path TEXT NOT NULL,
                full_path TEXT NOT NULL,
                folder_name TEXT NOT NULL,
                folder_year INTEGER NOT NULL,
                folder_date TEXT NOT NULL,
                PRIMARY KEY(parent_path, full_path)
            );
            CREATE INDEX IF NOT EXISTS idx_cached_folders_parent ON cached_inspection_folders(parent_path);
            "#,
            )
            .into_diagnostic()?;

        self.ensure_project_columns()?;

        self.conn
            .execute_batch(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_part_number ON projects(part_number) \
                 WHERE part_number IS NOT NULL AND part_number != '';",
            )
            .into_diagnostic()?;

        self.full_text = want_full_text && try_enable_full_text(&self.conn);
        if want_full_text && !self.full_text {
            warn!("full-text search unavailable, falling back to substring search");
        }

        self.conn
            .execute_batch(&format!("PRAGMA user_version={};", SCHEMA_VERSION))
            .into_diagnostic()?;
        Ok(())
    }

    /// Add columns introduced after the first catalog version
    fn ensure_project_columns(&self) -> Result<()> {
        let cols = table_columns(&self.conn, "projects")?;

        let additions = [
            ("pinned", "ALTER TABLE projects ADD COLUMN pinned INTEGER NOT NULL DEFAULT 0;"),
            ("last_open_time", "ALTER TABLE projects ADD COLUMN last_open_time TEXT;"),
            ("open_count", "ALTER TABLE projects ADD COLUMN open_count INTEGER NOT NULL DEFAULT 0;"),
            ("part_number", "ALTER TABLE projects ADD COLUMN part_number TEXT;"),
        ];
        for (column, sql) in additions {
            if !cols.contains(column) {
                info!("migrating catalog: adding projects.{}", column);
                self.conn.execute_batch(sql).into_diagnostic()?;
            }
        }
        Ok(())
    }

    /// Schema version recorded in the file
    pub fn schema_version(&self) -> Result<i32> {
        self.conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .into_diagnostic()
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({});", table))
        .into_diagnostic()?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .into_diagnostic()?
        .filter_map(|r| r.ok())
        .collect();
    Ok(cols)
}

/// Create the FTS5 shadow tables; false when the engine lacks FTS5
fn try_enable_full_text(conn: &Connection) -> bool {
    // FTS5 tables cannot gain columns, so an old project_fts is recreated
    match table_columns(conn, "project_fts") {
        Ok(cols) if !cols.is_empty() && !cols.contains("part_number") => {
            info!("recreating project_fts with part_number column");
            if let Err(e) = conn.execute_batch("DROP TABLE project_fts;") {
                debug!("could not drop project_fts: {}", e);
                return false;
            }
        }
        Ok(_) => {}
        Err(e) => {
            debug!("could not inspect project_fts: {}", e);
            return false;
        }
    }

    let result = conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS project_fts USING fts5(
            id UNINDEXED,
            customer,
            name,
            part_number,
            tags,
            dir_name,
            description,
            tokenize = 'unicode61'
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS file_fts USING fts5(
            project_id UNINDEXED,
            rel_path,
            file_name,
            tokenize = 'unicode61'
        );
        CREATE VIRTUAL TABLE IF NOT EXISTS item_tag_fts USING fts5(
            project_id UNINDEXED,
            rel_path,
            tag,
            tokenize = 'unicode61'
        );
        "#,
    );

    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("fts5 unavailable: {}", e);
            false
        }
    }
}
