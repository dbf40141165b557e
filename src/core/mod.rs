//! Core engine: ground truth, catalog, resource discovery and linking

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod jobs;
pub mod layout;
pub mod linker;
pub mod project;
pub mod scoring;

pub use catalog::{
    CatalogRow, CatalogStore, ClaimPolicy, LinkStats, LinkStatus, ResourceKind, ResourceLink,
    SyncStats,
};
pub use config::Config;
pub use discovery::{Candidate, DiscoveryScanner, NoHistory, ScanHistory};
pub use error::LibraryError;
pub use identity::{IdParseError, MonthKey, ProjectId, ProjectStatus};
pub use indexer::{Indexer, SearchResults};
pub use jobs::{submit, CancellationToken, JobHandle, LibraryLease, Progress};
pub use layout::{Library, NewProject};
pub use linker::{LinkReport, Linker};
pub use project::{Project, ProjectEntry, ProjectError};
