//! prjindex: project library index and resource linker
//!
//! Keeps a searchable SQLite catalog of a filesystem project library and
//! links projects to report folders discovered on shared drives.

pub mod cli;
pub mod core;
