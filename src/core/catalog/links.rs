//! Resource link rows for both resource families
//!
//! Inspection links live in `external_resources`, shared-folder links in
//! `shared_drive_folders`. Both are addressed through [`ResourceKind`] and
//! share one lifecycle; the folder family additionally carries a
//! [`FolderAggregate`].

use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{
    CatalogStore, FolderAggregate, LinkCandidate, LinkStats, LinkStatus, ResourceKind,
    ResourceLink, UpsertOutcome,
};
use crate::core::error::LibraryError;

/// How an upsert treats a path already linked to a different project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Move the link to the new project unless it was confirmed
    Reassign,
    /// Move it only when the new score is strictly higher, and never when confirmed
    IfBetter,
}

const INSPECTION_COLUMNS: &str = "id, project_id, root_path, full_path, folder_name, folder_year, \
     folder_date, match_score, status, created_at";

const FOLDER_COLUMNS: &str = "id, project_id, root_path, folder_path, folder_name, file_count, \
     total_size, modified_time, match_score, status, created_at";

impl CatalogStore {
    /// Insert a discovered link or update the row already holding its path.
    ///
    /// Re-discovery for the same project refreshes score and aggregates and
    /// keeps a confirmed or ignored decision; anything else returns to pending.
    pub fn upsert_link(&self, candidate: &LinkCandidate, now: &str, policy: ClaimPolicy) -> Result<UpsertOutcome> {
        let kind = candidate.kind;
        let Some(existing) = self.find_link_by_path(kind, &candidate.full_path)? else {
            let id = self.insert_link(candidate, LinkStatus::Pending, now)?;
            return Ok(UpsertOutcome::Inserted(id));
        };

        let status = if existing.project_id == candidate.project_id {
            if existing.status.is_decided() {
                existing.status
            } else {
                LinkStatus::Pending
            }
        } else {
            let keep = existing.status == LinkStatus::Confirmed
                || (policy == ClaimPolicy::IfBetter && candidate.match_score <= existing.match_score);
            if keep {
                debug!(
                    "{} stays with {} ({})",
                    candidate.full_path.display(),
                    existing.project_id,
                    existing.status
                );
                return Ok(UpsertOutcome::Kept(existing.id));
            }
            LinkStatus::Pending
        };

        self.update_link(existing.id, candidate, status)?;
        Ok(UpsertOutcome::Updated(existing.id))
    }

    /// Record a user-chosen folder as a confirmed link.
    ///
    /// A path that already has a row is rejected with [`LibraryError::DuplicateLink`].
    pub fn add_manual_link(&self, candidate: &LinkCandidate, now: &str) -> Result<i64> {
        if let Some(existing) = self.find_link_by_path(candidate.kind, &candidate.full_path)? {
            return Err(LibraryError::DuplicateLink {
                path: candidate.full_path.clone(),
                existing_id: existing.id,
            }
            .into());
        }
        self.insert_link(candidate, LinkStatus::Confirmed, now)
    }

    fn insert_link(&self, c: &LinkCandidate, status: LinkStatus, now: &str) -> Result<i64> {
        let status = status.db_value(c.kind);
        match c.kind {
            ResourceKind::Inspection => {
                self.conn
                    .execute(
                        r#"
                    INSERT INTO external_resources(
                        project_id, resource_type, root_path, folder_year, folder_date,
                        folder_name, full_path, match_score, status, created_at
                    )
                    VALUES(?1, 'inspection', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                        params![
                            c.project_id,
                            c.root_path.to_string_lossy(),
                            c.folder_year,
                            c.folder_date,
                            c.folder_name,
                            c.full_path.to_string_lossy(),
                            c.match_score,
                            status,
                            now
                        ],
                    )
                    .into_diagnostic()?;
            }
            ResourceKind::SharedFolder => {
                let agg = c.aggregate.clone().unwrap_or_default();
                self.conn
                    .execute(
                        r#"
                    INSERT INTO shared_drive_folders(
                        project_id, root_path, folder_path, folder_name, file_count,
                        total_size, modified_time, status, match_score, created_at
                    )
                    VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                        params![
                            c.project_id,
                            c.root_path.to_string_lossy(),
                            c.full_path.to_string_lossy(),
                            c.folder_name,
                            agg.file_count as i64,
                            agg.total_size as i64,
                            folder_modified_time(&agg, &c.folder_date),
                            status,
                            c.match_score,
                            now
                        ],
                    )
                    .into_diagnostic()?;
            }
        }
        Ok(self.conn.last_insert_rowid())
    }

    fn update_link(&self, id: i64, c: &LinkCandidate, status: LinkStatus) -> Result<()> {
        let status = status.db_value(c.kind);
        match c.kind {
            ResourceKind::Inspection => {
                self.conn
                    .execute(
                        "UPDATE external_resources SET project_id = ?1, root_path = ?2, folder_year = ?3, \
                         folder_date = ?4, folder_name = ?5, match_score = ?6, status = ?7 WHERE id = ?8",
                        params![
                            c.project_id,
                            c.root_path.to_string_lossy(),
                            c.folder_year,
                            c.folder_date,
                            c.folder_name,
                            c.match_score,
                            status,
                            id
                        ],
                    )
                    .into_diagnostic()?;
            }
            ResourceKind::SharedFolder => {
                let agg = c.aggregate.clone().unwrap_or_default();
                self.conn
                    .execute(
                        "UPDATE shared_drive_folders SET project_id = ?1, folder_name = ?2, file_count = ?3, \
                         total_size = ?4, modified_time = ?5, match_score = ?6, status = ?7 WHERE id = ?8",
                        params![
                            c.project_id,
                            c.folder_name,
                            agg.file_count as i64,
                            agg.total_size as i64,
                            folder_modified_time(&agg, &c.folder_date),
                            c.match_score,
                            status,
                            id
                        ],
                    )
                    .into_diagnostic()?;
            }
        }
        Ok(())
    }

    /// Link row holding a path, if any
    pub fn find_link_by_path(&self, kind: ResourceKind, path: &Path) -> Result<Option<ResourceLink>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY id LIMIT 1",
            columns(kind),
            kind.table(),
            kind.path_column()
        );
        self.conn
            .query_row(&sql, params![path.to_string_lossy()], |row| row_to_link(kind, row))
            .optional()
            .into_diagnostic()
    }

    /// One link by id
    pub fn get_link(&self, kind: ResourceKind, id: i64) -> Result<Option<ResourceLink>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns(kind), kind.table());
        self.conn
            .query_row(&sql, params![id], |row| row_to_link(kind, row))
            .optional()
            .into_diagnostic()
    }

    /// Links of a project, newest folder date first
    pub fn links_for_project(
        &self,
        kind: ResourceKind,
        project_id: &str,
        status: Option<LinkStatus>,
    ) -> Result<Vec<ResourceLink>> {
        let order = match kind {
            ResourceKind::Inspection => "folder_date DESC, id",
            ResourceKind::SharedFolder => "modified_time DESC, id",
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE project_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY {}",
            columns(kind),
            kind.table(),
            order
        );
        self.query_links(kind, &sql, params![project_id, status.map(|s| s.db_value(kind))])
    }

    /// Every link in a status, across projects
    pub fn links_with_status(&self, kind: ResourceKind, status: LinkStatus) -> Result<Vec<ResourceLink>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE status = ?1 ORDER BY project_id, id",
            columns(kind),
            kind.table()
        );
        self.query_links(kind, &sql, params![status.db_value(kind)])
    }

    fn query_links(&self, kind: ResourceKind, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ResourceLink>> {
        let mut stmt = self.conn.prepare(sql).into_diagnostic()?;
        let rows = stmt
            .query_map(params, |row| row_to_link(kind, row))
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Set a link's status. Missing ids are [`LibraryError::NotFound`];
    /// setting the current status again is a no-op.
    pub fn set_link_status(&self, kind: ResourceKind, id: i64, status: LinkStatus) -> Result<()> {
        let changed = self
            .conn
            .execute(
                &format!("UPDATE {} SET status = ?1 WHERE id = ?2", kind.table()),
                params![status.db_value(kind), id],
            )
            .into_diagnostic()?;
        if changed == 0 {
            return Err(LibraryError::link_not_found(id).into());
        }
        Ok(())
    }

    /// Delete every link discovered under a root; returns the number removed
    pub fn clear_links_by_root(&self, kind: ResourceKind, root: &Path) -> Result<usize> {
        self.conn
            .execute(
                &format!("DELETE FROM {} WHERE root_path = ?1", kind.table()),
                params![root.to_string_lossy()],
            )
            .into_diagnostic()
    }

    /// Delete every link of a project; returns the number removed
    pub fn delete_links_for_project(&self, kind: ResourceKind, project_id: &str) -> Result<usize> {
        self.conn
            .execute(
                &format!("DELETE FROM {} WHERE project_id = ?1", kind.table()),
                params![project_id],
            )
            .into_diagnostic()
    }

    /// Counters for a project's links of one kind
    pub fn link_stats(&self, kind: ResourceKind, project_id: &str) -> Result<LinkStats> {
        let size_expr = match kind {
            ResourceKind::Inspection => "0",
            ResourceKind::SharedFolder => "COALESCE(SUM(total_size), 0)",
        };
        let sql = format!(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status IN ('pending', 'indexed') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'confirmed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'ignored' THEN 1 ELSE 0 END), 0),
                {}
            FROM {}
            WHERE project_id = ?1
            "#,
            size_expr,
            kind.table()
        );
        self.conn
            .query_row(&sql, params![project_id], |row| {
                Ok(LinkStats {
                    total: row.get::<_, i64>(0)? as u64,
                    pending: row.get::<_, i64>(1)? as u64,
                    confirmed: row.get::<_, i64>(2)? as u64,
                    ignored: row.get::<_, i64>(3)? as u64,
                    total_size: row.get::<_, i64>(4)?.max(0) as u64,
                })
            })
            .into_diagnostic()
    }
}

fn columns(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Inspection => INSPECTION_COLUMNS,
        ResourceKind::SharedFolder => FOLDER_COLUMNS,
    }
}

/// Stored modification time of a folder link, falling back to its inferred date
fn folder_modified_time(agg: &FolderAggregate, folder_date: &str) -> String {
    if agg.modified_time.is_empty() {
        format!("{}T00:00:00", folder_date)
    } else {
        agg.modified_time.clone()
    }
}

fn row_to_link(kind: ResourceKind, row: &Row<'_>) -> rusqlite::Result<ResourceLink> {
    match kind {
        ResourceKind::Inspection => {
            let status: String = row.get(8)?;
            Ok(ResourceLink {
                id: row.get(0)?,
                kind,
                project_id: row.get(1)?,
                root_path: PathBuf::from(row.get::<_, String>(2)?),
                full_path: PathBuf::from(row.get::<_, String>(3)?),
                folder_name: row.get(4)?,
                folder_year: row.get(5)?,
                folder_date: row.get(6)?,
                match_score: row.get::<_, i64>(7)?.clamp(0, 100) as u8,
                status: LinkStatus::from_db(&status),
                created_at: row.get(9)?,
                aggregate: None,
            })
        }
        ResourceKind::SharedFolder => {
            let modified_time: String = row.get(7)?;
            let status: String = row.get(9)?;
            let folder_date: String = modified_time.chars().take(10).collect();
            let folder_year = folder_date
                .get(..4)
                .and_then(|y| y.parse().ok())
                .unwrap_or(0);
            Ok(ResourceLink {
                id: row.get(0)?,
                kind,
                project_id: row.get(1)?,
                root_path: PathBuf::from(row.get::<_, String>(2)?),
                full_path: PathBuf::from(row.get::<_, String>(3)?),
                folder_name: row.get(4)?,
                folder_year,
                folder_date,
                match_score: row.get::<_, i64>(8)?.clamp(0, 100) as u8,
                status: LinkStatus::from_db(&status),
                created_at: row.get(10)?,
                aggregate: Some(FolderAggregate {
                    file_count: row.get::<_, i64>(5)?.max(0) as u64,
                    total_size: row.get::<_, i64>(6)?.max(0) as u64,
                    modified_time,
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_store;
    use super::*;
    use tempfile::tempdir;

    const NOW: &str = "2024-06-01T10:00:00";

    fn candidate(kind: ResourceKind, project: &str, path: &str, score: u8) -> LinkCandidate {
        LinkCandidate {
            kind,
            project_id: project.to_string(),
            root_path: PathBuf::from("/share"),
            full_path: PathBuf::from(path),
            folder_name: path.rsplit('/').next().unwrap().to_string(),
            folder_year: 2024,
            folder_date: "2024-01-02".to_string(),
            match_score: score,
            aggregate: match kind {
                ResourceKind::Inspection => None,
                ResourceKind::SharedFolder => Some(FolderAggregate {
                    file_count: 3,
                    total_size: 300,
                    modified_time: "2024-01-05T08:00:00".to_string(),
                }),
            },
        }
    }

    fn count(store: &CatalogStore, kind: ResourceKind) -> i64 {
        store
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_upsert_same_path_keeps_one_row() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        for kind in ResourceKind::ALL {
            let c = candidate(kind, "PRJ-202401-001", "/share/ACME01_Beam", 80);
            let first = store.upsert_link(&c, NOW, ClaimPolicy::Reassign).unwrap();
            assert!(matches!(first, UpsertOutcome::Inserted(_)));

            let mut again = c.clone();
            again.match_score = 90;
            let second = store.upsert_link(&again, NOW, ClaimPolicy::Reassign).unwrap();
            assert_eq!(second, UpsertOutcome::Updated(first.id()));
            assert_eq!(count(&store, kind), 1);

            let link = store.get_link(kind, first.id()).unwrap().unwrap();
            assert_eq!(link.match_score, 90);
            assert_eq!(link.status, LinkStatus::Pending);
        }
    }

    #[test]
    fn test_rediscovery_keeps_user_decision() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let c = candidate(ResourceKind::Inspection, "PRJ-202401-001", "/share/A", 80);
        let id = store.upsert_link(&c, NOW, ClaimPolicy::Reassign).unwrap().id();

        store.set_link_status(ResourceKind::Inspection, id, LinkStatus::Ignored).unwrap();
        store.upsert_link(&c, NOW, ClaimPolicy::Reassign).unwrap();
        let link = store.get_link(ResourceKind::Inspection, id).unwrap().unwrap();
        assert_eq!(link.status, LinkStatus::Ignored);
    }

    #[test]
    fn test_claim_policies() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let kind = ResourceKind::Inspection;
        let owner = candidate(kind, "PRJ-202401-001", "/share/A", 80);
        let id = store.upsert_link(&owner, NOW, ClaimPolicy::Reassign).unwrap().id();

        let weaker = candidate(kind, "PRJ-202401-002", "/share/A", 70);
        assert_eq!(
            store.upsert_link(&weaker, NOW, ClaimPolicy::IfBetter).unwrap(),
            UpsertOutcome::Kept(id)
        );

        let stronger = candidate(kind, "PRJ-202401-002", "/share/A", 95);
        assert_eq!(
            store.upsert_link(&stronger, NOW, ClaimPolicy::IfBetter).unwrap(),
            UpsertOutcome::Updated(id)
        );
        let link = store.get_link(kind, id).unwrap().unwrap();
        assert_eq!(link.project_id, "PRJ-202401-002");

        store.set_link_status(kind, id, LinkStatus::Confirmed).unwrap();
        assert_eq!(
            store.upsert_link(&owner, NOW, ClaimPolicy::Reassign).unwrap(),
            UpsertOutcome::Kept(id)
        );
    }

    #[test]
    fn test_folder_family_round_trip_and_stats() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let kind = ResourceKind::SharedFolder;
        let a = store
            .upsert_link(&candidate(kind, "PRJ-202401-001", "/share/A", 40), NOW, ClaimPolicy::Reassign)
            .unwrap()
            .id();
        store
            .upsert_link(&candidate(kind, "PRJ-202401-001", "/share/B", 50), NOW, ClaimPolicy::Reassign)
            .unwrap();
        store.set_link_status(kind, a, LinkStatus::Confirmed).unwrap();

        let stored_status: String = store
            .conn()
            .query_row("SELECT status FROM shared_drive_folders WHERE folder_path = '/share/B'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored_status, "indexed");

        let links = store.links_for_project(kind, "PRJ-202401-001", None).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].folder_date, "2024-01-05");
        assert_eq!(links[0].aggregate.as_ref().unwrap().total_size, 300);

        let pending = store
            .links_for_project(kind, "PRJ-202401-001", Some(LinkStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);

        let stats = store.link_stats(kind, "PRJ-202401-001").unwrap();
        assert_eq!(
            stats,
            LinkStats {
                total: 2,
                pending: 1,
                confirmed: 1,
                ignored: 0,
                total_size: 600,
            }
        );

        assert_eq!(store.clear_links_by_root(kind, Path::new("/share")).unwrap(), 2);
        assert_eq!(count(&store, kind), 0);
    }

    #[test]
    fn test_manual_link_and_status_errors() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let kind = ResourceKind::Inspection;
        let c = candidate(kind, "PRJ-202401-001", "/share/Manual", 100);
        let id = store.add_manual_link(&c, NOW).unwrap();
        assert_eq!(
            store.get_link(kind, id).unwrap().unwrap().status,
            LinkStatus::Confirmed
        );

        let err = store.add_manual_link(&c, NOW).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::DuplicateLink { existing_id, .. }) if *existing_id == id
        ));

        // Idempotent re-confirm, missing id is an error
        store.set_link_status(kind, id, LinkStatus::Confirmed).unwrap();
        let err = store.set_link_status(kind, 999, LinkStatus::Confirmed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::NotFound { kind: "link", .. })
        ));
    }
}
