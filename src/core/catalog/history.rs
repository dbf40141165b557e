//! Discovery scan-history cache stored in the catalog

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, OptionalExtension};

use super::CatalogStore;
use crate::core::discovery::{Candidate, ScanHistory};
use crate::core::project::iso_datetime;

impl ScanHistory for CatalogStore {
    fn scanned_as_of(&self, dir: &Path) -> Result<Option<NaiveDate>> {
        let as_of: Option<String> = self
            .conn
            .query_row(
                "SELECT scanned_as_of FROM scanned_directories WHERE path = ?1",
                params![dir.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()
            .into_diagnostic()?;
        Ok(as_of.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
    }

    fn cached_children(&self, dir: &Path) -> Result<Vec<Candidate>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT folder_name, full_path, folder_year, folder_date \
                 FROM cached_inspection_folders WHERE parent_path = ?1 ORDER BY full_path",
            )
            .into_diagnostic()?;
        let rows = stmt
            .query_map(params![dir.to_string_lossy()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .into_diagnostic()?
            .filter_map(|r| r.ok())
            .filter_map(|(folder_name, full_path, year, date)| {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
                Some(Candidate {
                    folder_name,
                    full_path: PathBuf::from(full_path),
                    year,
                    date,
                })
            })
            .collect();
        Ok(rows)
    }

    fn record_scanned(&self, dir: &Path, as_of: NaiveDate, children: &[Candidate]) -> Result<()> {
        let parent = dir.to_string_lossy();
        self.in_transaction(|store| {
            store
                .conn
                .execute(
                    "DELETE FROM cached_inspection_folders WHERE parent_path = ?1",
                    params![parent],
                )
                .into_diagnostic()?;
            {
                let mut stmt = store
                    .conn
                    .prepare_cached(
                        "INSERT OR REPLACE INTO cached_inspection_folders(parent_path, full_path, folder_name, folder_year, folder_date) \
                         VALUES(?1, ?2, ?3, ?4, ?5)",
                    )
                    .into_diagnostic()?;
                for child in children {
                    stmt.execute(params![
                        parent,
                        child.full_path.to_string_lossy(),
                        child.folder_name,
                        child.year,
                        child.date_iso()
                    ])
                    .into_diagnostic()?;
                }
            }
            store
                .conn
                .execute(
                    "INSERT INTO scanned_directories(path, scanned_as_of, scanned_at) VALUES(?1, ?2, ?3) \
                     ON CONFLICT(path) DO UPDATE SET scanned_as_of = excluded.scanned_as_of, scanned_at = excluded.scanned_at",
                    params![
                        parent,
                        as_of.format("%Y-%m-%d").to_string(),
                        iso_datetime::format(&Local::now().naive_local())
                    ],
                )
                .into_diagnostic()?;
            Ok(())
        })
    }
}

impl CatalogStore {
    /// Forget the scan history of every directory under `root`, forcing the
    /// next scan to walk it completely. Returns the number of directories forgotten.
    pub fn forget_scan_history(&self, root: &Path) -> Result<usize> {
        let root = root.to_string_lossy().trim_end_matches(['/', '\\']).to_string();
        let prefix = format!("{}{}%", escape_like(&root), std::path::MAIN_SEPARATOR);
        self.conn
            .execute(
                "DELETE FROM cached_inspection_folders WHERE parent_path = ?1 OR parent_path LIKE ?2 ESCAPE '\\'",
                params![root, prefix],
            )
            .into_diagnostic()?;
        let forgotten = self
            .conn
            .execute(
                "DELETE FROM scanned_directories WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
                params![root, prefix],
            )
            .into_diagnostic()?;
        Ok(forgotten)
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_store;
    use super::*;
    use crate::core::discovery::DiscoveryScanner;
    use std::fs;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_record_and_replay_children() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let dir = Path::new("/share/2023-01-10");
        let child = Candidate {
            folder_name: "ACME01_Beam".to_string(),
            full_path: dir.join("ACME01_Beam"),
            year: 2023,
            date: d(2023, 1, 10),
        };

        assert_eq!(store.scanned_as_of(dir).unwrap(), None);
        store.record_scanned(dir, d(2023, 1, 10), &[child.clone()]).unwrap();
        assert_eq!(store.scanned_as_of(dir).unwrap(), Some(d(2023, 1, 10)));
        assert_eq!(store.cached_children(dir).unwrap(), vec![child]);

        // Re-recording replaces the child list
        store.record_scanned(dir, d(2023, 1, 10), &[]).unwrap();
        assert!(store.cached_children(dir).unwrap().is_empty());
    }

    #[test]
    fn test_forget_scan_history_under_root() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let sep = std::path::MAIN_SEPARATOR;
        let inside = PathBuf::from(format!("{sep}share{sep}a_b"));
        let outside = PathBuf::from(format!("{sep}shareX{sep}c"));
        store.record_scanned(&inside, d(2020, 1, 1), &[]).unwrap();
        store.record_scanned(&outside, d(2020, 1, 1), &[]).unwrap();

        let root = PathBuf::from(format!("{sep}share"));
        assert_eq!(store.forget_scan_history(&root).unwrap(), 1);
        assert_eq!(store.scanned_as_of(&inside).unwrap(), None);
        assert!(store.scanned_as_of(&outside).unwrap().is_some());
    }

    #[test]
    fn test_scanner_uses_catalog_history() {
        let tmp = tempdir().unwrap();
        let store = open_store(tmp.path(), true);
        let share = tmp.path().join("share");
        fs::create_dir_all(share.join("2022-05-06/ACME01_Beam/raw")).unwrap();

        let today = d(2099, 1, 1);
        let first = DiscoveryScanner::new(&share, &store).today(today).scan().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            store.scanned_as_of(&share.join("2022-05-06")).unwrap(),
            Some(d(2022, 5, 6))
        );

        fs::create_dir_all(share.join("2022-05-06/ACME02_Late/raw")).unwrap();
        let mut scanner = DiscoveryScanner::new(&share, &store).today(today);
        let second = scanner.scan().unwrap();
        assert_eq!(second.len(), 2);
        assert!(scanner.stats().dirs_replayed >= 1);
    }
}
