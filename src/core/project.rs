//! Ground-truth project metadata stored as `.project.json` in each project directory

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::core::identity::ProjectStatus;

/// Name of the ground-truth file inside a project directory
pub const METADATA_FILE: &str = ".project.json";

/// A project as recorded by its ground-truth file.
///
/// This is the single source of truth; the catalog only mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// `PRJ-YYYYMM-NNN`
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub customer: String,

    #[serde(with = "iso_datetime")]
    pub create_time: NaiveDateTime,

    #[serde(default)]
    pub status: ProjectStatus,

    /// Free-form tags, order irrelevant
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub tags: Vec<String>,

    /// Project-relative path -> tags
    #[serde(default, deserialize_with = "lenient_item_tags")]
    pub item_tags: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub customer_code: Option<String>,

    /// Globally unique when non-empty
    #[serde(default)]
    pub part_number: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub cover_image: Option<String>,

    /// Special projects never take part in resource matching
    #[serde(default, alias = "is_special")]
    pub special: bool,

    /// Keys this version does not know, written back unchanged
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Project {
    /// Path of the ground-truth file for a project directory
    pub fn metadata_path(project_dir: &Path) -> PathBuf {
        project_dir.join(METADATA_FILE)
    }

    /// Part number with surrounding whitespace removed, `None` when blank
    pub fn part_number(&self) -> Option<&str> {
        non_blank(self.part_number.as_deref())
    }

    /// Customer code with surrounding whitespace removed, `None` when blank
    pub fn customer_code(&self) -> Option<&str> {
        non_blank(self.customer_code.as_deref())
    }

    /// `YYYY-MM` bucket derived from the creation time
    pub fn month(&self) -> String {
        self.create_time.format("%Y-%m").to_string()
    }

    pub fn is_archived(&self) -> bool {
        self.status == ProjectStatus::Archived
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// A project located on disk, enriched with index-only fields
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    pub project: Project,
    pub project_dir: PathBuf,
    pub pinned: bool,
    pub last_open_time: Option<NaiveDateTime>,
    pub open_count: u32,
}

impl ProjectEntry {
    pub fn new(project: Project, project_dir: PathBuf) -> Self {
        Self {
            project,
            project_dir,
            pinned: false,
            last_open_time: None,
            open_count: 0,
        }
    }

    /// Directory name, used by full-text search
    pub fn dir_name(&self) -> String {
        self.project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// True when the directory and its ground-truth file still exist
    pub fn exists_on_disk(&self) -> bool {
        ground_truth_exists(&self.project_dir)
    }
}

/// True when `project_dir` is a directory holding a ground-truth file
pub fn ground_truth_exists(project_dir: &Path) -> bool {
    project_dir.is_dir() && Project::metadata_path(project_dir).is_file()
}

/// Read a ground-truth file
pub fn read_metadata(path: &Path) -> Result<Project, ProjectError> {
    let content = fs::read_to_string(path).map_err(|e| ProjectError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ProjectError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Write a ground-truth file, creating the directory if needed
pub fn write_metadata(path: &Path, project: &Project) -> Result<(), ProjectError> {
    let io_err = |e: std::io::Error| ProjectError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(project).map_err(|e| ProjectError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, json).map_err(io_err)
}

/// Fields a metadata edit may change; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub tags: Option<Vec<String>>,
    pub status: Option<ProjectStatus>,
    pub description: Option<String>,
    /// `Some("")` clears the cover image
    pub cover_image: Option<String>,
    pub item_tags: Option<BTreeMap<String, Vec<String>>>,
}

/// Apply an edit to a ground-truth file and return the new project
pub fn update_metadata(path: &Path, update: ProjectUpdate) -> Result<Project, ProjectError> {
    let mut project = read_metadata(path)?;
    if let Some(tags) = update.tags {
        project.tags = tags;
    }
    if let Some(status) = update.status {
        project.status = status;
    }
    if let Some(description) = update.description {
        project.description = Some(description);
    }
    if let Some(cover) = update.cover_image {
        let cover = cover.trim().to_string();
        project.cover_image = if cover.is_empty() { None } else { Some(cover) };
    }
    if let Some(item_tags) = update.item_tags {
        project.item_tags = item_tags;
    }
    write_metadata(path, &project)?;
    Ok(project)
}

/// Errors reading or writing ground-truth files
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("cannot access {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid project metadata in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(string_list(&value))
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn lenient_item_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    if let serde_json::Value::Object(map) = value {
        for (path, tags) in map {
            out.insert(path, string_list(&tags));
        }
    }
    Ok(out)
}

/// ISO-8601 timestamps, written with second precision.
///
/// Reads naive timestamps, RFC 3339 timestamps (converted to local time) and
/// bare dates.
pub mod iso_datetime {
    use super::*;

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s)))
    }

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(dt);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Local).naive_local());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }
}
