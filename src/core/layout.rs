//! Library layout on disk and ground-truth enumeration
//!
//! A library root holds one `YYYY-MM` directory per month, each containing
//! one directory per project. Archived projects are moved under the archive
//! directory. The reserved `.pm_system` directory holds the catalog file,
//! the job lock and library-local configuration.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use miette::{IntoDiagnostic, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::core::error::LibraryError;
use crate::core::identity::{MonthKey, ProjectId, ProjectStatus};
use crate::core::project::{self, Project, ProjectEntry, ProjectUpdate};

/// Reserved system directory inside the library root
pub const SYSTEM_DIR: &str = ".pm_system";

/// Catalog file inside the system directory
pub const INDEX_FILE: &str = "index.sqlite";

/// Top-level directory that archived projects are moved into
pub const ARCHIVE_DIR: &str = "归档项目";

/// Directory names never indexed as project content
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    ".svn",
    ".hg",
    ".venv",
    "venv",
    ".env",
    "env",
    "dist",
    "build",
    "target",
    ".idea",
    ".vscode",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    ".pm_cover",
];

/// Standard sub-folders created for every new project
pub const PROJECT_SUBFOLDERS: &[&str] = &[
    "01_3D文件",
    "02_模流报告",
    "03_试模数据",
    "04_项目文件",
    "05_问题",
    "06_其它",
];

/// A project library rooted at a directory
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Open an existing library root
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(LibraryError::LibraryRootMissing(root.to_path_buf()).into());
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create the library root and its system directory if missing
    pub fn init(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).into_diagnostic()?;
        let library = Self {
            root: root.to_path_buf(),
        };
        library.ensure_system_dir()?;
        Ok(library)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn system_dir(&self) -> PathBuf {
        self.root.join(SYSTEM_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.system_dir().join(INDEX_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.system_dir().join("job.lock")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn ensure_system_dir(&self) -> Result<PathBuf> {
        let dir = self.system_dir();
        fs::create_dir_all(dir.join("cache")).into_diagnostic()?;
        Ok(dir)
    }

    /// Enumerate every project with a readable ground-truth file.
    ///
    /// Month directories are visited newest first; unreadable or malformed
    /// projects are skipped. Archived projects (by status or by living in the
    /// archive directory) are only returned when `include_archived` is set.
    pub fn list_projects(&self, include_archived: bool) -> Vec<ProjectEntry> {
        let mut entries = Vec::new();

        for month_dir in sorted_child_dirs(&self.root).into_iter().rev() {
            let name = dir_name(&month_dir);
            if name == SYSTEM_DIR || name == ARCHIVE_DIR || !MonthKey::is_month_dir(&name) {
                continue;
            }

            for project_dir in sorted_child_dirs(&month_dir).into_iter().rev() {
                let Some(project) = load_project(&project_dir) else {
                    continue;
                };
                if !include_archived && project.is_archived() {
                    continue;
                }
                entries.push(ProjectEntry::new(project, project_dir));
            }
        }

        if include_archived {
            let archive = self.archive_dir();
            if archive.is_dir() {
                for entry in WalkDir::new(&archive)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| e.file_name() == project::METADATA_FILE)
                {
                    let Some(project_dir) = entry.path().parent() else {
                        continue;
                    };
                    if let Some(project) = load_project(project_dir) {
                        entries.push(ProjectEntry::new(project, project_dir.to_path_buf()));
                    }
                }
            }
        }

        entries.sort_by(|a, b| b.project.create_time.cmp(&a.project.create_time));
        entries
    }

    /// Locate one project by id, looking in its month directory first
    pub fn find_project(&self, id: &str) -> Option<ProjectEntry> {
        if let Ok(pid) = ProjectId::parse(id) {
            let month_dir = self.root.join(pid.month_key().to_string());
            for project_dir in sorted_child_dirs(&month_dir) {
                if !dir_name(&project_dir).starts_with(id) {
                    continue;
                }
                if let Some(project) = load_project(&project_dir) {
                    if project.id == id {
                        return Some(ProjectEntry::new(project, project_dir));
                    }
                }
            }
        }

        self.list_projects(true)
            .into_iter()
            .find(|e| e.project.id == id)
    }

    /// Next free sequence number in a month directory
    pub fn next_sequence(&self, month: MonthKey) -> u32 {
        let prefix = ProjectId::month_prefix(month);
        let month_dir = self.root.join(month.to_string());

        sorted_child_dirs(&month_dir)
            .iter()
            .filter_map(|dir| {
                let name = dir_name(dir);
                let rest = name.strip_prefix(&prefix)?;
                let digits: String = rest.chars().take(3).collect();
                if digits.len() == 3 {
                    digits.parse::<u32>().ok()
                } else {
                    None
                }
            })
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Request to create a new project on disk
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub month: String,
    pub customer: String,
    pub name: String,
    pub tags: Vec<String>,
    pub customer_code: Option<String>,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub special: bool,
}

/// Create the project directory, its standard sub-folders and ground-truth file.
///
/// The folder is named `<id>_<customer>_<name>`. When that name is taken, the
/// next free sequence number is used.
pub fn create_project(
    library: &Library,
    request: &NewProject,
    now: NaiveDateTime,
) -> Result<ProjectEntry> {
    let month: MonthKey = request
        .month
        .trim()
        .parse()
        .map_err(|_| LibraryError::InvalidMonth(request.month.clone()))?;

    let customer = sanitize_folder_component(&request.customer);
    let name = sanitize_folder_component(&request.name);
    let month_dir = library.root().join(month.to_string());

    let mut seq = library.next_sequence(month);
    let (id, project_dir) = loop {
        let id = ProjectId::new(month.year, month.month, seq)
            .map_err(|_| LibraryError::InvalidProjectId(format!("{}{:03}", ProjectId::month_prefix(month), seq)))?;
        let dir = month_dir.join(format!("{}_{}_{}", id, customer, name));
        if !dir.exists() {
            break (id, dir);
        }
        seq += 1;
    };

    for sub in PROJECT_SUBFOLDERS {
        fs::create_dir_all(project_dir.join(sub)).into_diagnostic()?;
    }

    let project = Project {
        id: id.to_string(),
        name: request.name.trim().to_string(),
        customer: request.customer.trim().to_string(),
        create_time: now,
        status: ProjectStatus::Ongoing,
        tags: request.tags.clone(),
        item_tags: Default::default(),
        customer_code: request.customer_code.clone().filter(|s| !s.trim().is_empty()),
        part_number: request.part_number.clone().filter(|s| !s.trim().is_empty()),
        description: request.description.clone(),
        cover_image: None,
        special: request.special,
        extra: Default::default(),
    };
    project::write_metadata(&Project::metadata_path(&project_dir), &project)
        .map_err(|e| miette::miette!("{}", e))?;

    Ok(ProjectEntry::new(project, project_dir))
}

/// Move a project directory into the archive directory and mark it archived.
///
/// When the archive already holds a directory of that name, a `_N` suffix is
/// appended.
pub fn archive_project(library: &Library, entry: &ProjectEntry) -> Result<ProjectEntry> {
    relocate_project(entry, &library.archive_dir(), ProjectStatus::Archived)
}

/// Move an archived project back to its month directory with `status`
pub fn unarchive_project(
    library: &Library,
    entry: &ProjectEntry,
    status: ProjectStatus,
) -> Result<ProjectEntry> {
    let id = ProjectId::parse(&entry.project.id)
        .map_err(|_| LibraryError::InvalidProjectId(entry.project.id.clone()))?;
    let month_dir = library.root().join(id.month_key().to_string());
    relocate_project(entry, &month_dir, status)
}

/// Remove a project directory and everything in it
pub fn delete_project_dir(entry: &ProjectEntry) -> Result<()> {
    if entry.project_dir.exists() {
        fs::remove_dir_all(&entry.project_dir).into_diagnostic()?;
    }
    debug!("deleted {}", entry.project_dir.display());
    Ok(())
}

fn relocate_project(entry: &ProjectEntry, dest_root: &Path, status: ProjectStatus) -> Result<ProjectEntry> {
    let dest = if entry.project_dir.parent() == Some(dest_root) {
        entry.project_dir.clone()
    } else {
        fs::create_dir_all(dest_root).into_diagnostic()?;
        let name = dir_name(&entry.project_dir);
        let dest = free_destination(dest_root, &name).ok_or_else(|| {
            miette::miette!("too many projects named '{}' in {}", name, dest_root.display())
        })?;
        fs::rename(&entry.project_dir, &dest).into_diagnostic()?;
        debug!("moved {} to {}", entry.project_dir.display(), dest.display());
        dest
    };

    let update = ProjectUpdate {
        status: Some(status),
        ..Default::default()
    };
    let project = project::update_metadata(&Project::metadata_path(&dest), update)
        .map_err(|e| miette::miette!("{}", e))?;
    Ok(ProjectEntry::new(project, dest))
}

fn free_destination(dest_root: &Path, name: &str) -> Option<PathBuf> {
    let dest = dest_root.join(name);
    if !dest.exists() {
        return Some(dest);
    }
    (1..1000)
        .map(|i| dest_root.join(format!("{}_{}", name, i)))
        .find(|p| !p.exists())
}

/// Replace characters that are invalid in folder names and collapse whitespace
pub fn sanitize_folder_component(value: &str) -> String {
    let replaced: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every non-hidden file under a project directory as `(rel_path, file_name)`.
///
/// Hidden entries and [`SKIP_DIRS`] subtrees are excluded; paths use `/`.
pub fn walk_project_files(project_dir: &Path) -> Vec<(String, String)> {
    WalkDir::new(project_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if name.starts_with('.') {
                return false;
            }
            !(e.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(project_dir).ok()?;
            let rel_path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((rel_path, e.file_name().to_string_lossy().to_string()))
        })
        .collect()
}

fn load_project(project_dir: &Path) -> Option<Project> {
    let meta = Project::metadata_path(project_dir);
    if !meta.is_file() {
        return None;
    }
    match project::read_metadata(&meta) {
        Ok(p) => Some(p),
        Err(e) => {
            debug!("skipping project at {}: {}", project_dir.display(), e);
            None
        }
    }
}

fn sorted_child_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = read
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
