//! Write-through full-text shadow index
//!
//! The FTS5 tables have no triggers. Every base-table mutation in this crate
//! goes through one of the `CatalogStore` write methods, and each of those
//! mirrors its change here. When full text is unavailable every call is a
//! no-op, so call sites never branch on capability.

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection};
use tracing::debug;

use super::CatalogStore;

/// Searchable projection of one project row
pub(crate) struct ProjectText<'a> {
    pub id: &'a str,
    pub customer: &'a str,
    pub name: &'a str,
    pub part_number: &'a str,
    pub tags: String,
    pub dir_name: String,
    pub description: &'a str,
}

pub(crate) struct ShadowIndex<'a> {
    conn: &'a Connection,
    enabled: bool,
}

impl CatalogStore {
    pub(crate) fn shadow(&self) -> ShadowIndex<'_> {
        ShadowIndex {
            conn: &self.conn,
            enabled: self.full_text,
        }
    }
}

impl ShadowIndex<'_> {
    pub fn replace_project(&self, text: &ProjectText<'_>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.conn
            .execute("DELETE FROM project_fts WHERE id = ?1", params![text.id])
            .into_diagnostic()?;
        self.conn
            .execute(
                "INSERT INTO project_fts(id, customer, name, part_number, tags, dir_name, description) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    text.id,
                    text.customer,
                    text.name,
                    text.part_number,
                    text.tags,
                    text.dir_name,
                    text.description
                ],
            )
            .into_diagnostic()?;
        Ok(())
    }

    pub fn replace_files(&self, project_id: &str, files: &[(String, String)]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.conn
            .execute("DELETE FROM file_fts WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO file_fts(project_id, rel_path, file_name) VALUES(?1, ?2, ?3)")
            .into_diagnostic()?;
        for (rel_path, file_name) in files {
            stmt.execute(params![project_id, rel_path, file_name])
                .into_diagnostic()?;
        }
        Ok(())
    }

    pub fn replace_item_tags(&self, project_id: &str, rows: &[(String, String, bool)]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.conn
            .execute("DELETE FROM item_tag_fts WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO item_tag_fts(project_id, rel_path, tag) VALUES(?1, ?2, ?3)")
            .into_diagnostic()?;
        for (rel_path, tag, _) in rows {
            stmt.execute(params![project_id, rel_path, tag])
                .into_diagnostic()?;
        }
        Ok(())
    }

    /// Remove every shadow row of a project. Missing tables are tolerated.
    pub fn delete_project(&self, project_id: &str) {
        if !self.enabled {
            return;
        }
        for sql in [
            "DELETE FROM project_fts WHERE id = ?1",
            "DELETE FROM file_fts WHERE project_id = ?1",
            "DELETE FROM item_tag_fts WHERE project_id = ?1",
        ] {
            if let Err(e) = self.conn.execute(sql, params![project_id]) {
                debug!("shadow delete for {} failed: {}", project_id, e);
            }
        }
    }
}
