//! Link orchestration: discovery + scoring + the link tables
//!
//! A [`Linker`] works on one resource family. Full scans score every
//! discovered folder against every project; single-project scans only
//! score against one project and never take a folder away from a project
//! that scored it at least as well.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use miette::Result;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::catalog::{
    CatalogStore, ClaimPolicy, FolderAggregate, LinkCandidate, LinkStats, LinkStatus,
    ResourceKind, ResourceLink, UpsertOutcome,
};
use crate::core::discovery::{
    has_subdirs, infer_date_from_name, modified_date, Candidate, DiscoveryScanner, ScanStats,
};
use crate::core::error::LibraryError;
use crate::core::jobs::CancellationToken;
use crate::core::project::{iso_datetime, Project};
use crate::core::scoring;

/// What a scan did to the link table
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub roots: usize,
    /// Folders reported by discovery
    pub discovered: usize,
    /// Folders that reached the threshold for some project
    pub matched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Matches left with the project already holding them
    pub kept: usize,
    /// Pending links moved to ignored
    pub demoted: usize,
    pub dirs_read: usize,
    pub dirs_replayed: usize,
    pub read_errors: usize,
}

impl LinkReport {
    fn add_scan(&mut self, stats: &ScanStats) {
        self.roots += 1;
        self.discovered += stats.candidates;
        self.dirs_read += stats.dirs_read;
        self.dirs_replayed += stats.dirs_replayed;
        self.read_errors += stats.read_errors;
    }

    fn add_outcome(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted(_) => self.inserted += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Kept(_) => self.kept += 1,
        }
    }
}

/// Maintains the links of one resource family
pub struct Linker<'a> {
    store: &'a CatalogStore,
    kind: ResourceKind,
    today: NaiveDate,
    cancel: Option<&'a CancellationToken>,
    full_rescan: bool,
}

impl<'a> Linker<'a> {
    pub fn new(store: &'a CatalogStore, kind: ResourceKind) -> Self {
        Self {
            store,
            kind,
            today: Local::now().date_naive(),
            cancel: None,
            full_rescan: false,
        }
    }

    /// Override the current date used by discovery
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn cancel_token(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Forget the scan history of each root before walking it
    pub fn full_rescan(mut self, full: bool) -> Self {
        self.full_rescan = full;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Demote pending links whose folder vanished or no longer has
    /// subdirectories. Returns the number demoted.
    pub fn sweep(&self) -> Result<usize> {
        let mut demoted = 0;
        for link in self.store.links_with_status(self.kind, LinkStatus::Pending)? {
            self.check_cancel()?;
            let valid = link.full_path.is_dir() && has_subdirs(&link.full_path).unwrap_or(false);
            if !valid {
                debug!("demoting stale {} link {}", self.kind, link.full_path.display());
                self.store.set_link_status(self.kind, link.id, LinkStatus::Ignored)?;
                demoted += 1;
            }
        }
        if demoted > 0 {
            info!("demoted {} stale {} links", demoted, self.kind);
        }
        Ok(demoted)
    }

    /// Sweep, then scan every root and link each folder to its best
    /// scoring project. `progress` receives `(roots done, roots total)`.
    pub fn scan_and_link_all(
        &self,
        roots: &[PathBuf],
        projects: &[Project],
        mut progress: impl FnMut(usize, usize),
    ) -> Result<LinkReport> {
        let mut report = LinkReport {
            demoted: self.sweep()?,
            ..Default::default()
        };
        let projects: Vec<&Project> = projects.iter().filter(|p| !p.special).collect();
        let now = self.now();

        for (i, root) in roots.iter().enumerate() {
            let candidates = self.discover(root, &mut report)?;
            self.store.in_transaction(|store| {
                for candidate in &candidates {
                    self.check_cancel()?;
                    let best = projects
                        .iter()
                        .map(|p| (scoring::score(p, &candidate.folder_name), *p))
                        .fold(None, |best: Option<(u8, &Project)>, (s, p)| match best {
                            Some((top, _)) if top >= s => best,
                            _ => Some((s, p)),
                        });
                    let Some((score, project)) = best.filter(|(s, _)| *s >= self.kind.threshold()) else {
                        continue;
                    };
                    report.matched += 1;
                    let link = self.link_candidate(root, candidate, &project.id, score);
                    report.add_outcome(store.upsert_link(&link, &now, ClaimPolicy::Reassign)?);
                }
                Ok(())
            })?;
            progress(i + 1, roots.len());
        }

        info!(
            "{} scan: {} discovered, {} matched, {} new, {} demoted",
            self.kind, report.discovered, report.matched, report.inserted, report.demoted
        );
        Ok(report)
    }

    /// Re-score one project's pending links, then scan the roots for
    /// folders matching it alone
    pub fn scan_and_link_one(&self, roots: &[PathBuf], project: &Project) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        if project.special {
            debug!("{} is special, not linking", project.id);
            return Ok(report);
        }
        let now = self.now();
        let threshold = self.kind.threshold();

        for link in self
            .store
            .links_for_project(self.kind, &project.id, Some(LinkStatus::Pending))?
        {
            let score = scoring::score(project, &link.folder_name);
            if score < threshold {
                debug!("demoting {} link {} ({} < {})", self.kind, link.full_path.display(), score, threshold);
                self.store.set_link_status(self.kind, link.id, LinkStatus::Ignored)?;
                report.demoted += 1;
            } else if score != link.match_score {
                report.add_outcome(self.store.upsert_link(&link.rescored(score), &now, ClaimPolicy::Reassign)?);
            }
        }

        for root in roots {
            let candidates = self.discover(root, &mut report)?;
            self.store.in_transaction(|store| {
                for candidate in &candidates {
                    self.check_cancel()?;
                    let score = scoring::score(project, &candidate.folder_name);
                    if score < threshold {
                        continue;
                    }
                    report.matched += 1;
                    let link = self.link_candidate(root, candidate, &project.id, score);
                    report.add_outcome(store.upsert_link(&link, &now, ClaimPolicy::IfBetter)?);
                }
                Ok(())
            })?;
        }
        Ok(report)
    }

    /// Accept a link; confirming twice is a no-op
    pub fn confirm(&self, id: i64) -> Result<()> {
        self.store.set_link_status(self.kind, id, LinkStatus::Confirmed)
    }

    /// Reject a link
    pub fn remove(&self, id: i64) -> Result<()> {
        self.store.set_link_status(self.kind, id, LinkStatus::Ignored)
    }

    /// Return a decided folder link to pending
    pub fn unconfirm(&self, id: i64) -> Result<()> {
        if self.kind == ResourceKind::Inspection {
            return Err(LibraryError::UnconfirmUnsupported.into());
        }
        self.store.set_link_status(self.kind, id, LinkStatus::Pending)
    }

    /// Link a user-chosen folder to a project as confirmed
    pub fn add_manual_link(&self, project_id: &str, folder: &Path) -> Result<i64> {
        if self.store.get(project_id)?.is_none() {
            return Err(LibraryError::project_not_found(project_id).into());
        }
        if !folder.is_dir() {
            return Err(miette::miette!("{} is not a directory", folder.display()));
        }
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let date = infer_date_from_name(&folder_name, None).unwrap_or_else(|| modified_date(folder));
        let candidate = Candidate {
            folder_name,
            full_path: folder.to_path_buf(),
            year: date.year(),
            date,
        };
        let root = folder.parent().unwrap_or(folder);
        let link = self.link_candidate(root, &candidate, project_id, scoring::MAX_SCORE);
        self.store.add_manual_link(&link, &self.now())
    }

    /// Delete every link discovered under `root`
    pub fn clear(&self, root: &Path) -> Result<usize> {
        let removed = self.store.clear_links_by_root(self.kind, root)?;
        info!("cleared {} {} links under {}", removed, self.kind, root.display());
        Ok(removed)
    }

    pub fn links_for_project(&self, project_id: &str, status: Option<LinkStatus>) -> Result<Vec<ResourceLink>> {
        self.store.links_for_project(self.kind, project_id, status)
    }

    pub fn stats(&self, project_id: &str) -> Result<LinkStats> {
        self.store.link_stats(self.kind, project_id)
    }

    fn discover(&self, root: &Path, report: &mut LinkReport) -> Result<Vec<Candidate>> {
        if self.full_rescan {
            let forgotten = self.store.forget_scan_history(root)?;
            debug!("forgot scan history of {} directories under {}", forgotten, root.display());
        }
        let mut scanner = DiscoveryScanner::new(root, self.store).today(self.today);
        if let Some(token) = self.cancel {
            scanner = scanner.cancel_token(token);
        }
        let candidates = scanner.scan()?;
        report.add_scan(scanner.stats());
        Ok(candidates)
    }

    fn link_candidate(&self, root: &Path, candidate: &Candidate, project_id: &str, score: u8) -> LinkCandidate {
        let aggregate = match self.kind {
            ResourceKind::Inspection => None,
            ResourceKind::SharedFolder => Some(folder_aggregate(&candidate.full_path)),
        };
        LinkCandidate {
            kind: self.kind,
            project_id: project_id.to_string(),
            root_path: root.to_path_buf(),
            full_path: candidate.full_path.clone(),
            folder_name: candidate.folder_name.clone(),
            folder_year: candidate.year,
            folder_date: candidate.date_iso(),
            match_score: score,
            aggregate,
        }
    }

    fn check_cancel(&self) -> Result<()> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    fn now(&self) -> String {
        iso_datetime::format(&Local::now().naive_local())
    }
}

/// File count, total size and latest modification time below a folder
pub fn folder_aggregate(folder: &Path) -> FolderAggregate {
    let mut agg = FolderAggregate::default();
    let mut latest: Option<SystemTime> = None;
    for entry in WalkDir::new(folder).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            agg.file_count += 1;
            agg.total_size += meta.len();
            latest = latest.max(meta.modified().ok());
        }
    }
    let latest = latest.or_else(|| fs::metadata(folder).and_then(|m| m.modified()).ok());
    agg.modified_time = latest
        .map(local_naive)
        .map(|t| iso_datetime::format(&t))
        .unwrap_or_default();
    agg
}

fn local_naive(t: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(t).naive_local()
}
