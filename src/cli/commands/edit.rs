//! `prjindex edit` command - Change a project's ground-truth metadata

use console::style;
use miette::Result;

use crate::cli::helpers::LibraryContext;
use crate::cli::GlobalOpts;
use crate::core::identity::ProjectStatus;
use crate::core::project::{update_metadata, Project, ProjectEntry, ProjectUpdate};

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// New status (ongoing, delivered, archived)
    #[arg(long, short = 's', value_parser = parse_status)]
    pub status: Option<ProjectStatus>,

    /// Tag to add (repeatable)
    #[arg(long = "add-tag")]
    pub add_tags: Vec<String>,

    /// Tag to remove (repeatable)
    #[arg(long = "remove-tag")]
    pub remove_tags: Vec<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Cover image path relative to the project; empty clears it
    #[arg(long)]
    pub cover_image: Option<String>,
}

pub(crate) fn parse_status(s: &str) -> Result<ProjectStatus, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "ongoing" | "delivered" | "archived" => Ok(ProjectStatus::from_lenient(s)),
        other => Err(format!(
            "unknown status '{}' (expected ongoing, delivered or archived)",
            other
        )),
    }
}

pub fn run(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.project_entry(&args.id)?;

    let tags = if args.add_tags.is_empty() && args.remove_tags.is_empty() {
        None
    } else {
        let mut tags = entry.project.tags.clone();
        for tag in args.add_tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags.retain(|t| !args.remove_tags.iter().any(|r| r.trim() == t));
        Some(tags)
    };

    // Entering or leaving the archived status also moves the directory
    let was_archived = entry.project.is_archived();
    let relocate = args
        .status
        .filter(|s| (*s == ProjectStatus::Archived) != was_archived);
    let update = ProjectUpdate {
        tags,
        status: if relocate.is_some() { None } else { args.status },
        description: args.description,
        cover_image: args.cover_image,
        item_tags: None,
    };
    let project = update_metadata(&Project::metadata_path(&entry.project_dir), update)
        .map_err(|e| miette::miette!("{}", e))?;

    let indexer = ctx.indexer();
    let updated = match relocate {
        Some(ProjectStatus::Archived) => indexer.archive(&project.id)?,
        Some(status) => indexer.unarchive(&project.id, status)?,
        None => {
            let updated = ProjectEntry::new(project, entry.project_dir);
            indexer.sync_one(&updated)?;
            updated
        }
    };

    if !global.quiet {
        println!(
            "{} Updated {} ({})",
            style("✓").green(),
            style(&updated.project.id).cyan(),
            updated.project.status
        );
    }
    Ok(())
}
