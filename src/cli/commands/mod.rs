//! CLI command implementations

pub mod archive;
pub mod completions;
pub mod config;
pub mod edit;
pub mod init;
pub mod link;
pub mod new;
pub mod pin;
pub mod rebuild;
pub mod search;
pub mod show;
pub mod stats;
