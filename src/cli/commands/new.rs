//! `prjindex new` command - Create a project and link its resources

use chrono::Local;
use console::style;
use miette::Result;
use tracing::warn;

use crate::cli::helpers::{print_json, LibraryContext};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::ResourceKind;
use crate::core::error::LibraryError;
use crate::core::jobs::LibraryLease;
use crate::core::layout::NewProject;
use crate::core::linker::{LinkReport, Linker};

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Project name
    pub name: String,

    /// Customer name
    #[arg(long, short = 'c')]
    pub customer: String,

    /// Month bucket YYYY-MM (default: current month)
    #[arg(long, short = 'm')]
    pub month: Option<String>,

    /// Tag (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,

    /// Customer code used when matching report folders
    #[arg(long)]
    pub customer_code: Option<String>,

    /// Part number, unique across the library
    #[arg(long, short = 'p')]
    pub part_number: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Exclude the project from resource matching
    #[arg(long)]
    pub special: bool,

    /// Skip the resource scan after creating the project
    #[arg(long)]
    pub no_link: bool,
}

pub fn run(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let now = Local::now().naive_local();

    let request = NewProject {
        month: args
            .month
            .unwrap_or_else(|| now.format("%Y-%m").to_string()),
        customer: args.customer,
        name: args.name,
        tags: args.tags,
        customer_code: args.customer_code,
        part_number: args.part_number,
        description: args.description,
        special: args.special,
    };
    let entry = ctx.indexer().create_project(&request, now)?;

    let mut reports: Vec<(ResourceKind, LinkReport)> = Vec::new();
    if !args.no_link && !entry.project.special {
        match LibraryLease::acquire(&ctx.library) {
            Ok(_lease) => {
                for kind in ResourceKind::ALL {
                    let roots = ctx.config.roots_for(kind);
                    if roots.is_empty() {
                        continue;
                    }
                    let report = Linker::new(&ctx.store, kind).scan_and_link_one(roots, &entry.project)?;
                    reports.push((kind, report));
                }
            }
            Err(e) if matches!(e.downcast_ref::<LibraryError>(), Some(LibraryError::Busy { .. })) => {
                warn!("library busy, skipping resource scan for {}", entry.project.id);
            }
            Err(e) => return Err(e),
        }
    }

    if global.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "id": entry.project.id,
            "project_dir": entry.project_dir,
            "links": reports
                .iter()
                .map(|(kind, report)| (kind.as_str(), report))
                .collect::<std::collections::BTreeMap<_, _>>(),
        }));
    }
    if global.format == OutputFormat::Id {
        println!("{}", entry.project.id);
        return Ok(());
    }

    println!(
        "{} Created project {}",
        style("✓").green(),
        style(&entry.project.id).cyan()
    );
    println!("   {}", style(entry.project_dir.display()).dim());
    if !global.quiet {
        for (kind, report) in &reports {
            if report.inserted > 0 {
                println!(
                    "   {} {} new {} link(s) awaiting review",
                    style("→").dim(),
                    style(report.inserted).yellow(),
                    kind
                );
            }
        }
    }
    Ok(())
}
