//! `prjindex archive`, `unarchive` and `delete` commands - Project lifecycle
//!
//! Archiving moves the project directory under the archive directory;
//! unarchiving moves it back to its month directory. Both re-sync the
//! catalog row. Deleting removes the directory, the row and its links.

use console::style;
use dialoguer::Confirm;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::edit::parse_status;
use crate::cli::commands::pin::IdArgs;
use crate::cli::helpers::{print_json, LibraryContext};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ProjectStatus;
use crate::core::project::ProjectEntry;

#[derive(clap::Args, Debug)]
pub struct UnarchiveArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Status after unarchiving (ongoing, delivered)
    #[arg(long, short = 's', default_value = "ongoing", value_parser = parse_status)]
    pub status: ProjectStatus,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run_archive(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.indexer().archive(&args.id)?;
    report("Archived", &entry, global)
}

pub fn run_unarchive(args: UnarchiveArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.indexer().unarchive(&args.id, args.status)?;
    report("Unarchived", &entry, global)
}

pub fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.project_entry(&args.id)?;

    if !args.yes {
        let prompt = format!(
            "Delete {} and everything in {}?",
            entry.project.id,
            entry.project_dir.display()
        );
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let deleted = ctx.indexer().delete(&entry.project.id)?;
    report("Deleted", &deleted, global)
}

fn report(verb: &str, entry: &ProjectEntry, global: &GlobalOpts) -> Result<()> {
    if global.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "id": entry.project.id,
            "status": entry.project.status,
            "project_dir": entry.project_dir,
        }));
    }
    if !global.quiet {
        println!(
            "{} {} {} {} {}",
            style("✓").green(),
            verb,
            style(&entry.project.id).cyan(),
            style("→").dim(),
            style(entry.project_dir.display()).yellow()
        );
    }
    Ok(())
}
