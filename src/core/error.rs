//! Domain errors surfaced by the library engine

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors the engine reports to its callers.
///
/// Stale catalog rows and per-entry filesystem failures during scans are
/// recovered locally and never show up here.
#[derive(Debug, Error, Diagnostic)]
pub enum LibraryError {
    #[error("{kind} not found: {id}")]
    #[diagnostic(code(prjindex::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("part number '{part_number}' is already used by {existing}")]
    #[diagnostic(
        code(prjindex::duplicate_part_number),
        help("part numbers must be unique across the library")
    )]
    DuplicatePartNumber {
        part_number: String,
        existing: String,
    },

    #[error("a link for {path:?} already exists (id {existing_id})")]
    #[diagnostic(code(prjindex::duplicate_link))]
    DuplicateLink { path: PathBuf, existing_id: i64 },

    #[error("inspection links cannot be unconfirmed")]
    #[diagnostic(
        code(prjindex::unconfirm_unsupported),
        help("use `link remove` to reject an inspection link")
    )]
    UnconfirmUnsupported,

    #[error("another scan or rebuild is already running for {root:?}")]
    #[diagnostic(
        code(prjindex::busy),
        help("wait for it to finish, or delete {lock:?} if it was abandoned")
    )]
    Busy { root: PathBuf, lock: PathBuf },

    #[error("operation cancelled")]
    #[diagnostic(code(prjindex::cancelled))]
    Cancelled,

    #[error("invalid project id '{0}', expected PRJ-YYYYMM-NNN")]
    #[diagnostic(code(prjindex::invalid_project_id))]
    InvalidProjectId(String),

    #[error("invalid month '{0}', expected YYYY-MM")]
    #[diagnostic(code(prjindex::invalid_month))]
    InvalidMonth(String),

    #[error("library root {0:?} does not exist or is not a directory")]
    #[diagnostic(
        code(prjindex::library_root_missing),
        help("pass --library or run `prjindex config set-library <path>`")
    )]
    LibraryRootMissing(PathBuf),
}

impl LibraryError {
    pub fn project_not_found(id: impl Into<String>) -> Self {
        LibraryError::NotFound {
            kind: "project",
            id: id.into(),
        }
    }

    pub fn link_not_found(id: i64) -> Self {
        LibraryError::NotFound {
            kind: "link",
            id: id.to_string(),
        }
    }
}

/// True when a report wraps the given library error variant.
pub fn is_cancelled(report: &miette::Report) -> bool {
    matches!(
        report.downcast_ref::<LibraryError>(),
        Some(LibraryError::Cancelled)
    )
}
