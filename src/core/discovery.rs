//! Discovery of candidate resource folders on shared drives
//!
//! A scan walks a root recursively and reports every directory that has
//! subdirectories of its own, together with a date inferred from its name.
//! Leaf directories are content folders and are never reported.
//!
//! Directories whose inferred date lies strictly in the past are recorded in
//! a [`ScanHistory`] once fully walked. Later scans replay their cached child
//! list instead of reading them again, so after the first pass over an
//! archive tree only new or present-dated directories cost I/O.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Local, NaiveDate};
use miette::Result;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::jobs::CancellationToken;

/// Directory names never descended into
const SKIP_NAMES: &[&str] = &["System Volume Information", "$RECYCLE.BIN"];

static FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(\d{4})[-._](\d{2})[-._](\d{2})(?:[^0-9]|$)").expect("valid regex")
});

static COMPACT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(20\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])(?:[^0-9]|$)")
        .expect("valid regex")
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(0[1-9]|1[0-2])[-._](0[1-9]|[12]\d|3[01])(?:[^0-9]|$)")
        .expect("valid regex")
});

static BARE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").expect("valid regex"));

/// A directory reported by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub folder_name: String,
    pub full_path: PathBuf,
    pub year: i32,
    pub date: NaiveDate,
}

impl Candidate {
    /// Inferred date as `YYYY-MM-DD`
    pub fn date_iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Persistent memory of directories already walked
pub trait ScanHistory {
    /// Date a directory was recorded as fully scanned for, if any
    fn scanned_as_of(&self, dir: &Path) -> Result<Option<NaiveDate>>;

    /// Candidate children recorded for a directory
    fn cached_children(&self, dir: &Path) -> Result<Vec<Candidate>>;

    /// Record a directory's candidate children and mark it scanned as of `as_of`
    fn record_scanned(&self, dir: &Path, as_of: NaiveDate, children: &[Candidate]) -> Result<()>;
}

/// History that remembers nothing; every scan walks the whole tree
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl ScanHistory for NoHistory {
    fn scanned_as_of(&self, _dir: &Path) -> Result<Option<NaiveDate>> {
        Ok(None)
    }

    fn cached_children(&self, _dir: &Path) -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    fn record_scanned(&self, _dir: &Path, _as_of: NaiveDate, _children: &[Candidate]) -> Result<()> {
        Ok(())
    }
}

/// Counters from one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub candidates: usize,
    pub dirs_read: usize,
    pub dirs_replayed: usize,
    pub dirs_recorded: usize,
    pub read_errors: usize,
}

/// Recursive scanner over one root
pub struct DiscoveryScanner<'a, H: ScanHistory> {
    root: PathBuf,
    history: &'a H,
    today: NaiveDate,
    cancel: Option<&'a CancellationToken>,
    stats: ScanStats,
}

impl<'a, H: ScanHistory> DiscoveryScanner<'a, H> {
    pub fn new(root: &Path, history: &'a H) -> Self {
        Self {
            root: root.to_path_buf(),
            history,
            today: Local::now().date_naive(),
            cancel: None,
            stats: ScanStats::default(),
        }
    }

    /// Override the current date used for cache eligibility
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn cancel_token(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Walk the root and hand every candidate to `visit`.
    ///
    /// A missing root yields nothing. Fails only on cancellation.
    pub fn scan_with(&mut self, mut visit: impl FnMut(&Candidate)) -> Result<ScanStats> {
        self.stats = ScanStats::default();
        if !self.root.is_dir() {
            debug!("scan root {} is not a directory", self.root.display());
            return Ok(self.stats.clone());
        }
        let root = self.root.clone();
        self.visit_dir(&root, None, None, &mut visit)?;
        debug!(
            "scanned {}: {} candidates, {} read, {} replayed",
            root.display(),
            self.stats.candidates,
            self.stats.dirs_read,
            self.stats.dirs_replayed
        );
        Ok(self.stats.clone())
    }

    /// Collect every candidate of the root
    pub fn scan(&mut self) -> Result<Vec<Candidate>> {
        let mut out = Vec::new();
        self.scan_with(|c| out.push(c.clone()))?;
        Ok(out)
    }

    /// Visit one directory. Returns true when its whole subtree was walked
    /// (or replayed) without read errors.
    fn visit_dir(
        &mut self,
        dir: &Path,
        own_date: Option<NaiveDate>,
        year_hint: Option<i32>,
        visit: &mut dyn FnMut(&Candidate),
    ) -> Result<bool> {
        if let Some(token) = self.cancel {
            token.check()?;
        }

        // A directory dated today or later is walked even when recorded: an
        // undated directory takes its modification time, which moves forward
        // whenever a child is added
        let replay = match own_date {
            Some(date) if date >= self.today => None,
            _ => self.replayable_children(dir),
        };
        if let Some(children) = replay {
            self.stats.dirs_replayed += 1;
            let mut complete = true;
            for mut child in children {
                if infer_date_from_name(&child.folder_name, year_hint).is_none() {
                    child.date = modified_date(&child.full_path);
                    child.year = child.date.year();
                }
                self.emit(&child, visit);
                let hint = child_year_hint(&child.folder_name, year_hint);
                complete &= self.visit_dir(&child.full_path, Some(child.date), hint, visit)?;
            }
            return Ok(complete);
        }

        let subdirs = match list_subdirs(dir) {
            Ok(subdirs) => subdirs,
            Err(e) => {
                debug!("cannot read {}: {}", dir.display(), e);
                self.stats.read_errors += 1;
                return Ok(false);
            }
        };
        self.stats.dirs_read += 1;

        let mut complete = true;
        let mut children = Vec::new();
        for child_path in subdirs {
            match has_subdirs(&child_path) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("cannot read {}: {}", child_path.display(), e);
                    self.stats.read_errors += 1;
                    complete = false;
                    continue;
                }
            }

            let folder_name = file_name(&child_path);
            let date = infer_date_from_name(&folder_name, year_hint)
                .unwrap_or_else(|| modified_date(&child_path));
            let child_hint = child_year_hint(&folder_name, year_hint);

            let candidate = Candidate {
                folder_name,
                full_path: child_path,
                year: date.year(),
                date,
            };
            self.emit(&candidate, visit);
            complete &= self.visit_dir(&candidate.full_path, Some(date), child_hint, visit)?;
            children.push(candidate);
        }

        // Only a past-dated directory whose children are all past-dated can
        // no longer change
        if let Some(as_of) = own_date.filter(|d| *d < self.today) {
            if complete && children.iter().all(|c| c.date < self.today) {
                match self.history.record_scanned(dir, as_of, &children) {
                    Ok(()) => self.stats.dirs_recorded += 1,
                    Err(e) => warn!("could not record scan of {}: {}", dir.display(), e),
                }
            }
        }

        Ok(complete)
    }

    /// Cached children when `dir` was recorded as of a date before today
    fn replayable_children(&self, dir: &Path) -> Option<Vec<Candidate>> {
        let as_of = match self.history.scanned_as_of(dir) {
            Ok(Some(as_of)) => as_of,
            Ok(None) => return None,
            Err(e) => {
                debug!("scan history lookup failed for {}: {}", dir.display(), e);
                return None;
            }
        };
        if as_of >= self.today {
            return None;
        }
        match self.history.cached_children(dir) {
            Ok(children) => Some(children),
            Err(e) => {
                debug!("cached children unavailable for {}: {}", dir.display(), e);
                None
            }
        }
    }

    fn emit(&mut self, candidate: &Candidate, visit: &mut dyn FnMut(&Candidate)) {
        self.stats.candidates += 1;
        visit(candidate);
    }
}

/// Date encoded in a folder name.
///
/// Tried in order: `YYYY-MM-DD` (separators `-`, `.`, `_`), compact
/// `20YYMMDD`, then `MM-DD` completed with `year_hint`.
pub fn infer_date_from_name(name: &str, year_hint: Option<i32>) -> Option<NaiveDate> {
    for caps in FULL_DATE.captures_iter(name) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    for caps in COMPACT_DATE.captures_iter(name) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    let year = year_hint?;
    for caps in MONTH_DAY.captures_iter(name) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    None
}

/// True when a directory contains at least one subdirectory
pub fn has_subdirs(dir: &Path) -> std::io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && !is_skipped(&entry.file_name().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Year passed down to the children of a folder: its own named date's year,
/// a bare `YYYY` name, or the inherited hint
fn child_year_hint(name: &str, inherited: Option<i32>) -> Option<i32> {
    infer_date_from_name(name, inherited)
        .map(|d| d.year())
        .or_else(|| bare_year(name))
        .or(inherited)
}

fn bare_year(name: &str) -> Option<i32> {
    if BARE_YEAR.is_match(name) {
        name.parse().ok()
    } else {
        None
    }
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIP_NAMES.contains(&name)
}

fn list_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| !is_skipped(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

pub(crate) fn modified_date(path: &Path) -> NaiveDate {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).date_naive())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
