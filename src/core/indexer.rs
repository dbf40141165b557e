//! Mirroring the library's ground truth into the catalog
//!
//! Rebuilds commit in small batches so a huge library never holds one long
//! write transaction, and report progress after every batch. Searches
//! heal the catalog as they go: rows whose project directory disappeared
//! are pruned, and an empty catalog triggers one rebuild.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::NaiveDateTime;
use miette::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::catalog::{ActivityItem, CatalogRow, CatalogStore, ResourceKind, SyncStats};
use crate::core::error::LibraryError;
use crate::core::identity::ProjectStatus;
use crate::core::jobs::{CancellationToken, LibraryLease};
use crate::core::layout::{self, Library, NewProject};
use crate::core::project::{ground_truth_exists, ProjectEntry};

/// Projects written per transaction during a rebuild
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Rows returned by [`Indexer::search`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub rows: Vec<CatalogRow>,
    /// False when ranked search was unavailable and substring search was used
    pub full_text: bool,
}

/// Keeps one library's catalog in step with its ground truth
pub struct Indexer<'a> {
    library: &'a Library,
    store: &'a CatalogStore,
    batch_size: usize,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Indexer<'a> {
    pub fn new(library: &'a Library, store: &'a CatalogStore) -> Self {
        Self {
            library,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn cancel_token(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Re-read every project and replace its catalog rows, then prune rows
    /// of projects that were not found.
    ///
    /// `progress` receives `(projects done, projects total)` after each
    /// committed batch. On cancellation, batches already committed stay.
    pub fn rebuild(&self, include_archived: bool, mut progress: impl FnMut(usize, usize)) -> Result<SyncStats> {
        let started = Instant::now();
        let entries = self.library.list_projects(include_archived);
        let total = entries.len();
        let mut stats = SyncStats::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(total);

        info!("rebuilding catalog of {} ({} projects)", self.library.root().display(), total);
        let released = self.release_moved_part_numbers(&entries, include_archived)?;
        if released > 0 {
            debug!("released {} part numbers that moved or vanished", released);
        }

        let mut done = 0;
        for batch in entries.chunks(self.batch_size) {
            if let Some(token) = self.cancel {
                token.check()?;
            }
            self.store.in_transaction(|store| {
                for entry in batch {
                    sync_entry(store, entry, true, &mut stats)?;
                }
                Ok(())
            })?;
            seen.extend(batch.iter().map(|e| e.project.id.as_str()));
            done += batch.len();
            debug!("committed {}/{} projects", done, total);
            progress(done, total);
        }

        stats.pruned = self.store.in_transaction(|store| {
            let mut pruned = 0;
            for (id, status) in store.project_ids()? {
                if seen.contains(id.as_str()) {
                    continue;
                }
                if !include_archived && ProjectStatus::from_lenient(&status) == ProjectStatus::Archived {
                    continue;
                }
                debug!("pruning {} (not found in library)", id);
                if store.delete_project(&id)? {
                    pruned += 1;
                }
            }
            Ok(pruned)
        })?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "rebuilt {} projects ({} files, {} item tags, {} pruned) in {} ms",
            stats.projects, stats.files, stats.item_tags, stats.pruned, stats.duration_ms
        );
        Ok(stats)
    }

    /// Mirror one project after it was created or edited.
    ///
    /// A part number already held by another project is rejected.
    pub fn sync_one(&self, entry: &ProjectEntry) -> Result<()> {
        let mut stats = SyncStats::default();
        self.store
            .in_transaction(|store| sync_entry(store, entry, false, &mut stats))
    }

    /// Search the catalog and return full rows, pruning stale ones.
    ///
    /// When nothing matches and the catalog is empty, the library is
    /// rebuilt once and the search repeated.
    pub fn search(&self, query: &str, limit: usize, include_archived: bool) -> Result<SearchResults> {
        let mut hits = self.store.search(query, limit, include_archived)?;
        if hits.ids.is_empty() && self.store.count()? == 0 {
            match LibraryLease::acquire(self.library) {
                Ok(_lease) => {
                    info!("catalog is empty, rebuilding before searching");
                    self.rebuild(include_archived, |_, _| {})?;
                    hits = self.store.search(query, limit, include_archived)?;
                }
                Err(e) => debug!("skipping first-run rebuild: {}", e),
            }
        }

        let mut rows = Vec::with_capacity(hits.ids.len());
        for row in self.store.fetch_by_ids(&hits.ids)? {
            if !self.prune_if_stale(&row)? {
                rows.push(row);
            }
        }

        Ok(SearchResults {
            rows,
            full_text: hits.full_text,
        })
    }

    /// One catalog row; a row whose project directory is gone is pruned and
    /// reported as absent
    pub fn get(&self, id: &str) -> Result<Option<CatalogRow>> {
        match self.store.get(id.trim())? {
            Some(row) if !self.prune_if_stale(&row)? => Ok(Some(row)),
            _ => Ok(None),
        }
    }

    /// Recent-activity feed without projects whose directory is gone
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityItem>> {
        loop {
            let items = self.store.recent_activity(limit)?;
            let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
            let mut pruned = 0;
            for row in self.store.fetch_by_ids(&ids)? {
                if self.prune_if_stale(&row)? {
                    pruned += 1;
                }
            }
            // Each pass deletes at least one row, so this ends
            if pruned == 0 {
                return Ok(items);
            }
        }
    }

    /// Move a project into the archive directory and re-sync its row
    pub fn archive(&self, id: &str) -> Result<ProjectEntry> {
        let entry = self.locate(id)?;
        let archived = layout::archive_project(self.library, &entry)?;
        self.sync_one(&archived)?;
        info!("archived {} to {}", id.trim(), archived.project_dir.display());
        Ok(archived)
    }

    /// Move an archived project back to its month directory with `status`
    pub fn unarchive(&self, id: &str, status: ProjectStatus) -> Result<ProjectEntry> {
        if status == ProjectStatus::Archived {
            return Err(miette::miette!("unarchiving needs a status other than archived"));
        }
        let entry = self.locate(id)?;
        let restored = layout::unarchive_project(self.library, &entry, status)?;
        self.sync_one(&restored)?;
        info!("unarchived {} to {}", id.trim(), restored.project_dir.display());
        Ok(restored)
    }

    /// Delete a project directory from disk, then its row and links
    pub fn delete(&self, id: &str) -> Result<ProjectEntry> {
        let entry = self.locate(id)?;
        layout::delete_project_dir(&entry)?;
        self.store.in_transaction(|store| {
            store.delete_project(&entry.project.id)?;
            for kind in ResourceKind::ALL {
                store.delete_links_for_project(kind, &entry.project.id)?;
            }
            Ok(())
        })?;
        info!("deleted {}", entry.project.id);
        Ok(entry)
    }

    fn locate(&self, id: &str) -> Result<ProjectEntry> {
        let id = id.trim();
        self.library
            .find_project(id)
            .ok_or_else(|| LibraryError::project_not_found(id).into())
    }

    fn prune_if_stale(&self, row: &CatalogRow) -> Result<bool> {
        if ground_truth_exists(&row.project_dir) {
            return Ok(false);
        }
        info!("pruning stale catalog row {} ({})", row.id, row.project_dir.display());
        self.store.delete_project(&row.id)?;
        Ok(true)
    }

    /// Clear stored part numbers that the ground truth no longer assigns to
    /// the same project, so a number moved between projects is free before
    /// its new holder is written. Rows of archived projects outside this
    /// rebuild keep theirs.
    fn release_moved_part_numbers(&self, entries: &[ProjectEntry], include_archived: bool) -> Result<usize> {
        let wanted: HashMap<&str, Option<&str>> = entries
            .iter()
            .map(|e| (e.project.id.as_str(), e.project.part_number()))
            .collect();
        self.store.in_transaction(|store| {
            let mut released = 0;
            for (id, status) in store.project_ids()? {
                let keep = match wanted.get(id.as_str()) {
                    Some(pn) => *pn,
                    None if !include_archived
                        && ProjectStatus::from_lenient(&status) == ProjectStatus::Archived =>
                    {
                        continue
                    }
                    None => None,
                };
                if store.release_part_number(&id, keep)? {
                    released += 1;
                }
            }
            Ok(released)
        })
    }

    /// Create a project on disk and add it to the catalog
    pub fn create_project(&self, request: &NewProject, now: NaiveDateTime) -> Result<ProjectEntry> {
        if let Some(pn) = request.part_number.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(existing) = self.store.project_with_part_number(pn, None)? {
                return Err(LibraryError::DuplicatePartNumber {
                    part_number: pn.to_string(),
                    existing,
                }
                .into());
            }
        }
        let entry = layout::create_project(self.library, request, now)?;
        self.sync_one(&entry)?;
        info!("created {} in {}", entry.project.id, entry.project_dir.display());
        Ok(entry)
    }
}

/// Write one project's row and manifests.
///
/// With `lenient`, a duplicate part number is dropped from the row instead of
/// failing, so one bad ground-truth file cannot stop a rebuild.
fn sync_entry(store: &CatalogStore, entry: &ProjectEntry, lenient: bool, stats: &mut SyncStats) -> Result<()> {
    let project = &entry.project;
    match store.upsert_project(project, &entry.project_dir) {
        Ok(()) => {}
        Err(e) if lenient && matches!(e.downcast_ref::<LibraryError>(), Some(LibraryError::DuplicatePartNumber { .. })) => {
            warn!("{}: {}; indexing without part number", project.id, e);
            let mut without = project.clone();
            without.part_number = None;
            store.upsert_project(&without, &entry.project_dir)?;
        }
        Err(e) => return Err(e),
    }

    let files = layout::walk_project_files(&entry.project_dir);
    store.replace_project_files(&project.id, &files)?;
    let tags = store.replace_project_item_tags(&project.id, &entry.project_dir, &project.item_tags)?;

    stats.projects += 1;
    stats.files += files.len();
    stats.item_tags += tags;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::test_support::open_store;
    use crate::core::error::is_cancelled;
    use crate::core::layout::test_support::{write_project, write_project_with};
    use std::fs;
    use tempfile::tempdir;

    fn all_rows(store: &CatalogStore) -> Vec<CatalogRow> {
        let hits = store.search("", 1000, true).unwrap();
        store.fetch_by_ids(&hits.ids).unwrap()
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let dir = write_project_with(lib.path(), "PRJ-202401-001", "Front Beam", "Acme", |p| {
            p.tags = vec!["steel".to_string()];
            p.item_tags.insert("01_3D文件".to_string(), vec!["cad".to_string()]);
        });
        fs::create_dir_all(dir.join("01_3D文件")).unwrap();
        fs::write(dir.join("01_3D文件/beam.step"), b"x").unwrap();
        write_project(lib.path(), "PRJ-202402-001", "Rear Beam", "Acme");

        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);

        let first = indexer.rebuild(false, |_, _| {}).unwrap();
        assert_eq!(first.projects, 2);
        assert_eq!(first.files, 1);
        assert_eq!(first.item_tags, 1);
        let rows = all_rows(&store);
        let shadow = crate::core::catalog::test_support::shadow_snapshot(&store);

        indexer.rebuild(false, |_, _| {}).unwrap();
        assert_eq!(all_rows(&store), rows);
        assert_eq!(crate::core::catalog::test_support::shadow_snapshot(&store), shadow);
    }

    #[test]
    fn test_rebuild_batches_report_progress() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        for seq in 1..=5 {
            write_project(lib.path(), &format!("PRJ-202403-{:03}", seq), "Part", "Acme");
        }
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);

        let mut events = Vec::new();
        Indexer::new(&library, &store)
            .batch_size(2)
            .rebuild(false, |done, total| events.push((done, total)))
            .unwrap();
        assert_eq!(events, vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn test_rebuild_prunes_missing_but_keeps_archived_rows() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let gone = write_project(lib.path(), "PRJ-202401-001", "Gone", "Acme");
        write_project(lib.path(), "PRJ-202401-002", "Kept", "Acme");
        write_project_with(lib.path(), "PRJ-202401-003", "Old", "Acme", |p| {
            p.status = ProjectStatus::Archived;
        });
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(true, |_, _| {}).unwrap();
        assert_eq!(store.count().unwrap(), 3);

        fs::remove_dir_all(&gone).unwrap();
        let stats = indexer.rebuild(false, |_, _| {}).unwrap();
        assert_eq!(stats.pruned, 1);
        assert!(store.get("PRJ-202401-001").unwrap().is_none());
        assert!(store.get("PRJ-202401-003").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_part_number_does_not_stop_rebuild() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        write_project_with(lib.path(), "PRJ-202401-001", "A", "Acme", |p| {
            p.part_number = Some("PN-1".to_string());
        });
        write_project_with(lib.path(), "PRJ-202401-002", "B", "Acme", |p| {
            p.part_number = Some("PN-1".to_string());
        });
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);

        let stats = Indexer::new(&library, &store).rebuild(false, |_, _| {}).unwrap();
        assert_eq!(stats.projects, 2);
        let holders: Vec<_> = all_rows(&store)
            .into_iter()
            .filter(|r| r.part_number.as_deref() == Some("PN-1"))
            .collect();
        assert_eq!(holders.len(), 1);
    }

    #[test]
    fn test_rebuild_follows_part_number_swap() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let with_pn = |pn: &'static str| move |p: &mut crate::core::project::Project| {
            p.part_number = Some(pn.to_string());
        };
        write_project_with(lib.path(), "PRJ-202401-001", "Old", "Acme", with_pn("PN-1"));
        write_project_with(lib.path(), "PRJ-202402-001", "New", "Acme", with_pn("PN-2"));
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(false, |_, _| {}).unwrap();

        write_project_with(lib.path(), "PRJ-202401-001", "Old", "Acme", with_pn("PN-2"));
        write_project_with(lib.path(), "PRJ-202402-001", "New", "Acme", with_pn("PN-1"));
        indexer.rebuild(false, |_, _| {}).unwrap();

        let part = |id: &str| store.get(id).unwrap().unwrap().part_number;
        assert_eq!(part("PRJ-202401-001").as_deref(), Some("PN-2"));
        assert_eq!(part("PRJ-202402-001").as_deref(), Some("PN-1"));
        let rows = all_rows(&store);
        indexer.rebuild(false, |_, _| {}).unwrap();
        assert_eq!(all_rows(&store), rows);

        let hits = indexer.search("PN-1", 10, false).unwrap();
        let ids: Vec<_> = hits.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["PRJ-202402-001"]);
    }

    #[test]
    fn test_rebuild_frees_part_number_of_deleted_project() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let gone = write_project_with(lib.path(), "PRJ-202401-001", "Old", "Acme", |p| {
            p.part_number = Some("PN-1".to_string());
        });
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(false, |_, _| {}).unwrap();

        fs::remove_dir_all(&gone).unwrap();
        write_project_with(lib.path(), "PRJ-202402-001", "New", "Acme", |p| {
            p.part_number = Some("PN-1".to_string());
        });
        indexer.rebuild(false, |_, _| {}).unwrap();
        assert_eq!(
            store.get("PRJ-202402-001").unwrap().unwrap().part_number.as_deref(),
            Some("PN-1")
        );
    }

    #[test]
    fn test_get_and_recent_prune_stale_rows() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let gone = write_project(lib.path(), "PRJ-202401-001", "Gone", "Acme");
        write_project(lib.path(), "PRJ-202401-002", "Kept", "Acme");
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(false, |_, _| {}).unwrap();
        store
            .mark_opened("PRJ-202401-001", crate::core::catalog::test_support::ts("2024-06-01T10:00:00"))
            .unwrap();

        fs::remove_dir_all(&gone).unwrap();
        let recent = indexer.recent_activity(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "PRJ-202401-002");
        assert!(store.get("PRJ-202401-001").unwrap().is_none());

        write_project(lib.path(), "PRJ-202401-003", "Later", "Acme");
        indexer.rebuild(false, |_, _| {}).unwrap();
        fs::remove_dir_all(lib.path().join("2024-01/PRJ-202401-003_Acme_Later")).unwrap();
        assert!(indexer.get("PRJ-202401-003").unwrap().is_none());
        assert!(store.get("PRJ-202401-003").unwrap().is_none());
        assert!(indexer.get("PRJ-202401-002").unwrap().is_some());
    }

    #[test]
    fn test_archive_unarchive_and_delete_keep_catalog_in_step() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        write_project(lib.path(), "PRJ-202401-001", "Front Beam", "Acme");
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(false, |_, _| {}).unwrap();

        let archived = indexer.archive("PRJ-202401-001").unwrap();
        let row = store.get("PRJ-202401-001").unwrap().unwrap();
        assert_eq!(row.status, ProjectStatus::Archived);
        assert_eq!(row.project_dir, archived.project_dir);
        assert!(archived.project_dir.starts_with(library.archive_dir()));
        assert!(indexer.search("", 10, false).unwrap().rows.is_empty());

        assert!(indexer.unarchive("PRJ-202401-001", ProjectStatus::Archived).is_err());
        let restored = indexer.unarchive("PRJ-202401-001", ProjectStatus::Ongoing).unwrap();
        let row = store.get("PRJ-202401-001").unwrap().unwrap();
        assert_eq!(row.status, ProjectStatus::Ongoing);
        assert_eq!(row.project_dir, restored.project_dir);

        let now = "2024-06-01T10:00:00";
        store
            .upsert_link(
                &crate::core::catalog::LinkCandidate {
                    kind: ResourceKind::Inspection,
                    project_id: "PRJ-202401-001".to_string(),
                    root_path: lib.path().join("share"),
                    full_path: lib.path().join("share/ACME01_Beam"),
                    folder_name: "ACME01_Beam".to_string(),
                    folder_year: 2024,
                    folder_date: "2024-05-01".to_string(),
                    match_score: 80,
                    aggregate: None,
                },
                now,
                crate::core::catalog::ClaimPolicy::Reassign,
            )
            .unwrap();

        indexer.delete("PRJ-202401-001").unwrap();
        assert!(!restored.project_dir.exists());
        assert!(store.get("PRJ-202401-001").unwrap().is_none());
        assert!(store
            .links_for_project(ResourceKind::Inspection, "PRJ-202401-001", None)
            .unwrap()
            .is_empty());
        let err = indexer.delete("PRJ-202401-001").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_search_prunes_stale_rows() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        let gone = write_project(lib.path(), "PRJ-202401-001", "Gone", "Acme");
        write_project(lib.path(), "PRJ-202401-002", "Kept", "Acme");
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let indexer = Indexer::new(&library, &store);
        indexer.rebuild(false, |_, _| {}).unwrap();

        fs::remove_dir_all(&gone).unwrap();
        let results = indexer.search("", 100, false).unwrap();
        let ids: Vec<_> = results.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["PRJ-202401-002"]);
        assert!(store.get("PRJ-202401-001").unwrap().is_none());
    }

    #[test]
    fn test_search_rebuilds_empty_catalog_once() {
        let lib = tempdir().unwrap();
        write_project(lib.path(), "PRJ-202401-001", "Front Beam", "Acme");
        let library = Library::init(lib.path()).unwrap();
        let store = CatalogStore::open(&library).unwrap();

        let results = Indexer::new(&library, &store).search("beam", 10, false).unwrap();
        assert_eq!(results.rows.len(), 1);
        assert!(results.full_text);
        assert!(LibraryLease::acquire(&library).is_ok());
    }

    #[test]
    fn test_cancelled_rebuild_keeps_committed_batches() {
        let lib = tempdir().unwrap();
        let db = tempdir().unwrap();
        for seq in 1..=4 {
            write_project(lib.path(), &format!("PRJ-202403-{:03}", seq), "Part", "Acme");
        }
        let library = Library::open(lib.path()).unwrap();
        let store = open_store(db.path(), true);
        let token = CancellationToken::new();

        let err = Indexer::new(&library, &store)
            .batch_size(2)
            .cancel_token(&token)
            .rebuild(false, |_, _| token.cancel())
            .unwrap_err();
        assert!(is_cancelled(&err));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_create_project_rejects_duplicate_part_number() {
        let lib = tempdir().unwrap();
        let library = Library::init(lib.path()).unwrap();
        let store = CatalogStore::open(&library).unwrap();
        let indexer = Indexer::new(&library, &store);
        let now = crate::core::catalog::test_support::ts("2024-05-06T10:00:00");

        let request = NewProject {
            month: "2024-05".to_string(),
            customer: "Acme".to_string(),
            name: "Bracket".to_string(),
            part_number: Some("PN-9".to_string()),
            ..Default::default()
        };
        let entry = indexer.create_project(&request, now).unwrap();
        assert_eq!(entry.project.id, "PRJ-202405-001");
        assert!(store.get("PRJ-202405-001").unwrap().is_some());

        let err = indexer.create_project(&request, now).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LibraryError>(),
            Some(LibraryError::DuplicatePartNumber { .. })
        ));
        assert_eq!(library.next_sequence("2024-05".parse().unwrap()), 2);
    }
}
