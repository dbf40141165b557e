//! Project row writes
//!
//! Each method replaces the affected base rows and mirrors the change into
//! the shadow index.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, OptionalExtension};

use super::shadow::ProjectText;
use super::CatalogStore;
use crate::core::error::LibraryError;
use crate::core::project::{iso_datetime, Project};

impl CatalogStore {
    /// Insert or update a project's row, keeping its pin and open counters.
    ///
    /// A non-empty part number already used by another project is rejected
    /// with [`LibraryError::DuplicatePartNumber`] and nothing is written.
    pub fn upsert_project(&self, project: &Project, project_dir: &Path) -> Result<()> {
        let part_number = project.part_number();
        if let Some(pn) = part_number {
            if let Some(existing) = self.project_with_part_number(pn, Some(&project.id))? {
                return Err(LibraryError::DuplicatePartNumber {
                    part_number: pn.to_string(),
                    existing,
                }
                .into());
            }
        }

        let tags_json = serde_json::to_string(&project.tags).into_diagnostic()?;
        let project_dir_str = project_dir.to_string_lossy();

        self.conn
            .execute(
                r#"
            INSERT INTO projects(id, customer, name, tags_json, status, create_time, month, project_dir, description, part_number)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                customer=excluded.customer,
                name=excluded.name,
                tags_json=excluded.tags_json,
                status=excluded.status,
                create_time=excluded.create_time,
                month=excluded.month,
                project_dir=excluded.project_dir,
                description=excluded.description,
                part_number=excluded.part_number
            "#,
                params![
                    project.id,
                    project.customer,
                    project.name,
                    tags_json,
                    project.status.as_str(),
                    iso_datetime::format(&project.create_time),
                    project.month(),
                    project_dir_str,
                    project.description,
                    part_number,
                ],
            )
            .into_diagnostic()?;

        let dir_name = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.shadow().replace_project(&ProjectText {
            id: &project.id,
            customer: &project.customer,
            name: &project.name,
            part_number: part_number.unwrap_or_default(),
            tags: project.tags.join(" "),
            dir_name,
            description: project.description.as_deref().unwrap_or_default(),
        })
    }

    /// Replace a project's file manifest
    pub fn replace_project_files(&self, project_id: &str, files: &[(String, String)]) -> Result<()> {
        self.conn
            .execute("DELETE FROM files WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;
        {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO files(project_id, rel_path, file_name) VALUES(?1, ?2, ?3)")
                .into_diagnostic()?;
            for (rel_path, file_name) in files {
                stmt.execute(params![project_id, rel_path, file_name])
                    .into_diagnostic()?;
            }
        }
        self.shadow().replace_files(project_id, files)
    }

    /// Replace a project's item-tag manifest; returns the number of tag rows
    pub fn replace_project_item_tags(
        &self,
        project_id: &str,
        project_dir: &Path,
        item_tags: &BTreeMap<String, Vec<String>>,
    ) -> Result<usize> {
        self.conn
            .execute("DELETE FROM item_tags WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;

        let mut rows: Vec<(String, String, bool)> = Vec::new();
        for (rel_path, tags) in item_tags {
            let rel = rel_path.trim().replace('\\', "/");
            let rel = rel.trim_matches('/');
            if rel.is_empty() {
                continue;
            }
            let is_dir = project_dir.join(rel).is_dir();
            for tag in tags {
                let tag = tag.trim();
                if tag.is_empty() || rows.iter().any(|(r, t, _)| r == rel && t == tag) {
                    continue;
                }
                rows.push((rel.to_string(), tag.to_string(), is_dir));
            }
        }

        {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT INTO item_tags(project_id, rel_path, tag, is_dir) VALUES(?1, ?2, ?3, ?4)")
                .into_diagnostic()?;
            for (rel, tag, is_dir) in &rows {
                stmt.execute(params![project_id, rel, tag, *is_dir as i32])
                    .into_diagnostic()?;
            }
        }
        self.shadow().replace_item_tags(project_id, &rows)?;
        Ok(rows.len())
    }

    /// Set or clear the pinned flag
    pub fn set_pinned(&self, project_id: &str, pinned: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE projects SET pinned = ?1 WHERE id = ?2",
                params![pinned as i32, project_id],
            )
            .into_diagnostic()?;
        if changed == 0 {
            return Err(LibraryError::project_not_found(project_id).into());
        }
        Ok(())
    }

    /// Record that a project was opened
    pub fn mark_opened(&self, project_id: &str, at: NaiveDateTime) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE projects SET last_open_time = ?1, open_count = open_count + 1 WHERE id = ?2",
                params![iso_datetime::format(&at), project_id],
            )
            .into_diagnostic()?;
        if changed == 0 {
            return Err(LibraryError::project_not_found(project_id).into());
        }
        Ok(())
    }

    /// Delete a project row with its manifests and shadow rows.
    /// Returns false when there was no such row.
    pub fn delete_project(&self, project_id: &str) -> Result<bool> {
        self.conn
            .execute("DELETE FROM files WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;
        self.conn
            .execute("DELETE FROM item_tags WHERE project_id = ?1", params![project_id])
            .into_diagnostic()?;
        let deleted = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![project_id])
            .into_diagnostic()?;
        self.shadow().delete_project(project_id);
        Ok(deleted > 0)
    }

    /// True when no other project uses this part number. Blank is always unique.
    pub fn check_part_number_unique(&self, part_number: &str, exclude_id: Option<&str>) -> Result<bool> {
        let pn = part_number.trim();
        if pn.is_empty() {
            return Ok(true);
        }
        Ok(self.project_with_part_number(pn, exclude_id)?.is_none())
    }

    /// Id of the project holding a part number, ignoring `exclude_id`
    pub fn project_with_part_number(&self, part_number: &str, exclude_id: Option<&str>) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM projects WHERE part_number = ?1 AND id != ?2 LIMIT 1",
                params![part_number.trim(), exclude_id.unwrap_or_default()],
                |row| row.get(0),
            )
            .optional()
            .into_diagnostic()
    }

    /// Clear a row's stored part number unless it equals `keep`.
    ///
    /// Only the base row changes; the shadow text is rewritten with the row's
    /// next upsert. Returns true when a part number was released.
    pub fn release_part_number(&self, project_id: &str, keep: Option<&str>) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE projects SET part_number = NULL \
                 WHERE id = ?1 AND part_number IS NOT NULL AND part_number IS NOT ?2",
                params![project_id, keep.map(str::trim)],
            )
            .into_diagnostic()?;
        Ok(changed > 0)
    }

    /// Every catalogued project id with its stored status
    pub fn project_ids(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, status FROM projects ORDER BY id")
            .into_diagnostic()?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
