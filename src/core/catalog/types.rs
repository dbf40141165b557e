//! Row and result types returned by the catalog store

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::core::identity::ProjectStatus;

/// One catalog row mirroring a project's searchable metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRow {
    pub id: String,
    pub customer: String,
    pub name: String,
    pub tags: Vec<String>,
    pub status: ProjectStatus,
    pub create_time: String,
    pub month: String,
    pub project_dir: PathBuf,
    pub description: Option<String>,
    pub part_number: Option<String>,
    pub pinned: bool,
    pub last_open_time: Option<String>,
    pub open_count: u32,
}

/// Ordered project ids from a search, plus whether ranked search was used
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchHits {
    pub ids: Vec<String>,
    pub full_text: bool,
}

/// Dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: u64,
    pub ongoing: u64,
    pub delivered: u64,
    pub archived: u64,
    pub new_this_month: u64,
}

/// What made a project show up in the recent-activity feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Opened,
    Created,
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityAction::Opened => write!(f, "opened"),
            ActivityAction::Created => write!(f, "created"),
        }
    }
}

/// One entry of the recent-activity feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub id: String,
    pub name: String,
    pub customer: String,
    pub status: ProjectStatus,
    pub action: ActivityAction,
    pub time: String,
}

/// Resource family a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Inspection report folders, stored in `external_resources`
    Inspection,
    /// Generic shared-drive folders with file aggregates, stored in `shared_drive_folders`
    SharedFolder,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Inspection, ResourceKind::SharedFolder];

    pub(crate) fn table(&self) -> &'static str {
        match self {
            ResourceKind::Inspection => "external_resources",
            ResourceKind::SharedFolder => "shared_drive_folders",
        }
    }

    /// Column holding the absolute folder path
    pub(crate) fn path_column(&self) -> &'static str {
        match self {
            ResourceKind::Inspection => "full_path",
            ResourceKind::SharedFolder => "folder_path",
        }
    }

    /// Minimum score for a candidate to become a pending link
    pub fn threshold(&self) -> u8 {
        match self {
            ResourceKind::Inspection => 60,
            ResourceKind::SharedFolder => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Inspection => "inspection",
            ResourceKind::SharedFolder => "shared-folder",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inspection" => Ok(ResourceKind::Inspection),
            "shared-folder" | "shared_folder" | "folder" => Ok(ResourceKind::SharedFolder),
            other => Err(format!("unknown resource kind '{}'", other)),
        }
    }
}

/// Review state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Confirmed,
    Ignored,
}

impl LinkStatus {
    /// Stored value; the folder family calls pending links `indexed`
    pub(crate) fn db_value(&self, kind: ResourceKind) -> &'static str {
        match (self, kind) {
            (LinkStatus::Pending, ResourceKind::Inspection) => "pending",
            (LinkStatus::Pending, ResourceKind::SharedFolder) => "indexed",
            (LinkStatus::Confirmed, _) => "confirmed",
            (LinkStatus::Ignored, _) => "ignored",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "confirmed" => LinkStatus::Confirmed,
            "ignored" => LinkStatus::Ignored,
            _ => LinkStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Confirmed => "confirmed",
            LinkStatus::Ignored => "ignored",
        }
    }

    /// True for states that record a user decision
    pub fn is_decided(&self) -> bool {
        matches!(self, LinkStatus::Confirmed | LinkStatus::Ignored)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "indexed" => Ok(LinkStatus::Pending),
            "confirmed" => Ok(LinkStatus::Confirmed),
            "ignored" => Ok(LinkStatus::Ignored),
            other => Err(format!("unknown link status '{}'", other)),
        }
    }
}

/// Extra fields carried by shared-folder links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderAggregate {
    pub file_count: u64,
    pub total_size: u64,
    /// Latest file modification time, `YYYY-MM-DDTHH:MM:SS`
    pub modified_time: String,
}

/// A discovered folder associated with a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceLink {
    pub id: i64,
    pub kind: ResourceKind,
    pub project_id: String,
    pub root_path: PathBuf,
    pub full_path: PathBuf,
    pub folder_name: String,
    pub folder_year: i32,
    pub folder_date: String,
    pub match_score: u8,
    pub status: LinkStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<FolderAggregate>,
}

impl ResourceLink {
    /// The link's fields as an upsert candidate with a new score
    pub fn rescored(&self, match_score: u8) -> LinkCandidate {
        LinkCandidate {
            kind: self.kind,
            project_id: self.project_id.clone(),
            root_path: self.root_path.clone(),
            full_path: self.full_path.clone(),
            folder_name: self.folder_name.clone(),
            folder_year: self.folder_year,
            folder_date: self.folder_date.clone(),
            match_score,
            aggregate: self.aggregate.clone(),
        }
    }
}

/// Link fields supplied by a scan or a manual association
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCandidate {
    pub kind: ResourceKind,
    pub project_id: String,
    pub root_path: PathBuf,
    pub full_path: PathBuf,
    pub folder_name: String,
    pub folder_year: i32,
    pub folder_date: String,
    pub match_score: u8,
    pub aggregate: Option<FolderAggregate>,
}

/// What an upsert did to the link table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    /// The path is held by another project and was left alone
    Kept(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) | UpsertOutcome::Kept(id) => {
                *id
            }
        }
    }
}

/// Per-project link counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub ignored: u64,
    pub total_size: u64,
}

/// Statistics from a rebuild
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub projects: usize,
    pub files: usize,
    pub item_tags: usize,
    pub pruned: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_values() {
        assert_eq!(LinkStatus::Pending.db_value(ResourceKind::Inspection), "pending");
        assert_eq!(LinkStatus::Pending.db_value(ResourceKind::SharedFolder), "indexed");
        assert_eq!(LinkStatus::from_db("indexed"), LinkStatus::Pending);
        assert_eq!(LinkStatus::from_db("confirmed"), LinkStatus::Confirmed);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("inspection".parse::<ResourceKind>(), Ok(ResourceKind::Inspection));
        assert_eq!("folder".parse::<ResourceKind>(), Ok(ResourceKind::SharedFolder));
        assert!("video".parse::<ResourceKind>().is_err());
    }
}
