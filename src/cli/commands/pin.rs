//! `prjindex pin`, `unpin` and `open` commands - Index-only project state

use chrono::Local;
use console::style;
use miette::Result;

use crate::cli::helpers::{print_json, LibraryContext};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::error::LibraryError;

#[derive(clap::Args, Debug)]
pub struct IdArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct OpenArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Only print the directory, without counting it as an open
    #[arg(long)]
    pub no_record: bool,
}

pub fn run_pin(args: IdArgs, global: &GlobalOpts, pinned: bool) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let id = args.id.trim();
    ctx.store.set_pinned(id, pinned)?;
    if !global.quiet {
        let verb = if pinned { "Pinned" } else { "Unpinned" };
        println!("{} {} {}", style("✓").green(), verb, style(id).cyan());
    }
    Ok(())
}

pub fn run_open(args: OpenArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let id = args.id.trim();
    let row = ctx
        .indexer()
        .get(id)?
        .ok_or_else(|| LibraryError::project_not_found(id))?;

    if !args.no_record {
        ctx.store.mark_opened(id, Local::now().naive_local())?;
    }

    if global.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "id": row.id,
            "project_dir": row.project_dir,
        }));
    }
    println!("{}", row.project_dir.display());
    Ok(())
}
