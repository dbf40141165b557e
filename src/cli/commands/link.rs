//! `prjindex link` command - Discover and review resource links

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::commands::show::{link_row, LINK_COLUMNS};
use crate::cli::helpers::{effective_format, open_library, print_json, LibraryContext};
use crate::cli::table::{ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::{CatalogStore, LinkStatus, ResourceKind, ResourceLink};
use crate::core::jobs::{self, LibraryLease};
use crate::core::linker::{LinkReport, Linker};
use crate::core::project::Project;

#[derive(clap::Subcommand, Debug)]
pub enum LinkCommands {
    /// Scan the configured roots and link folders to their best project
    Scan(ScanArgs),

    /// Scan the configured roots for one project only
    ScanOne(ScanOneArgs),

    /// List links by status or by project
    List(ListArgs),

    /// Accept links
    Confirm(StatusArgs),

    /// Reject links
    Remove(StatusArgs),

    /// Return shared-folder links to pending
    Unconfirm(StatusArgs),

    /// Link a folder to a project by hand
    Add(AddArgs),

    /// Walk through pending links interactively
    Review(ReviewArgs),

    /// Delete every link discovered under a root
    Clear(ClearArgs),
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Resource family (default: both)
    #[arg(long, short = 'k')]
    pub kind: Option<ResourceKind>,

    /// Ignore the scan-history cache and walk every directory
    #[arg(long)]
    pub full: bool,

    /// Also match archived projects
    #[arg(long, short = 'a')]
    pub archived: bool,
}

#[derive(clap::Args, Debug)]
pub struct ScanOneArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Resource family (default: both)
    #[arg(long, short = 'k')]
    pub kind: Option<ResourceKind>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[arg(long, short = 'k', default_value = "inspection")]
    pub kind: ResourceKind,

    /// Only links with this status (pending, confirmed, ignored)
    #[arg(long, short = 's')]
    pub status: Option<LinkStatus>,

    /// Only links of this project
    #[arg(long, short = 'p')]
    pub project: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Link ids
    #[arg(required = true)]
    pub ids: Vec<i64>,

    /// Resource family the ids belong to
    #[arg(long, short = 'k', default_value = "inspection")]
    pub kind: ResourceKind,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub project: String,

    /// Folder to link
    pub folder: PathBuf,

    #[arg(long, short = 'k', default_value = "inspection")]
    pub kind: ResourceKind,
}

#[derive(clap::Args, Debug)]
pub struct ReviewArgs {
    #[arg(long, short = 'k', default_value = "inspection")]
    pub kind: ResourceKind,

    /// Only review links of this project
    #[arg(long, short = 'p')]
    pub project: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ClearArgs {
    /// Scan root whose links are deleted
    pub root: PathBuf,

    #[arg(long, short = 'k', default_value = "inspection")]
    pub kind: ResourceKind,
}

/// Run a link subcommand
pub fn run(cmd: LinkCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        LinkCommands::Scan(args) => run_scan(args, global),
        LinkCommands::ScanOne(args) => run_scan_one(args, global),
        LinkCommands::List(args) => run_list(args, global),
        LinkCommands::Confirm(args) => run_set_status(args, global, LinkStatus::Confirmed),
        LinkCommands::Remove(args) => run_set_status(args, global, LinkStatus::Ignored),
        LinkCommands::Unconfirm(args) => run_set_status(args, global, LinkStatus::Pending),
        LinkCommands::Add(args) => run_add(args, global),
        LinkCommands::Review(args) => run_review(args, global),
        LinkCommands::Clear(args) => run_clear(args, global),
    }
}

fn kinds(kind: Option<ResourceKind>) -> Vec<ResourceKind> {
    match kind {
        Some(kind) => vec![kind],
        None => ResourceKind::ALL.to_vec(),
    }
}

fn run_scan(args: ScanArgs, global: &GlobalOpts) -> Result<()> {
    let (config, library) = open_library(global)?;
    let plan: Vec<(ResourceKind, Vec<PathBuf>)> = kinds(args.kind)
        .into_iter()
        .map(|kind| (kind, config.roots_for(kind).to_vec()))
        .filter(|(_, roots)| !roots.is_empty())
        .collect();
    if plan.is_empty() {
        println!(
            "{} No scan roots configured. Add one with {}",
            style("!").yellow(),
            style("prjindex config add-root <kind> <path>").yellow()
        );
        return Ok(());
    }

    let lease = LibraryLease::acquire(&library)?;
    let projects: Vec<Project> = library
        .list_projects(args.archived)
        .into_iter()
        .map(|e| e.project)
        .collect();
    let total_roots: usize = plan.iter().map(|(_, roots)| roots.len()).sum();
    let full = args.full;

    let handle = jobs::submit(lease, move |job| {
        let store = CatalogStore::open(&library)?;
        let mut reports = Vec::new();
        let mut offset = 0;
        for (kind, roots) in &plan {
            let report = Linker::new(&store, *kind)
                .cancel_token(job.cancel_token())
                .full_rescan(full)
                .scan_and_link_all(roots, &projects, |done, _| job.report(offset + done, total_roots))?;
            offset += roots.len();
            reports.push((*kind, report));
        }
        Ok(reports)
    });

    let term = Term::stderr();
    let show_progress = !global.quiet && term.is_term();
    for progress in handle.progress_iter() {
        if show_progress {
            term.clear_line().into_diagnostic()?;
            term.write_str(&format!(
                "{} {}/{} roots",
                style("scanning").dim(),
                progress.done,
                progress.total
            ))
            .into_diagnostic()?;
        }
    }
    if show_progress {
        term.clear_line().into_diagnostic()?;
    }
    let reports = handle.wait()?;
    print_reports(&reports, global)
}

fn run_scan_one(args: ScanOneArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.project_entry(&args.id)?;
    let _lease = LibraryLease::acquire(&ctx.library)?;

    let mut reports = Vec::new();
    for kind in kinds(args.kind) {
        let roots = ctx.config.roots_for(kind);
        if roots.is_empty() {
            continue;
        }
        let report = Linker::new(&ctx.store, kind).scan_and_link_one(roots, &entry.project)?;
        reports.push((kind, report));
    }
    print_reports(&reports, global)
}

fn print_reports(reports: &[(ResourceKind, LinkReport)], global: &GlobalOpts) -> Result<()> {
    if global.format == OutputFormat::Json {
        let map: std::collections::BTreeMap<&str, &LinkReport> =
            reports.iter().map(|(kind, r)| (kind.as_str(), r)).collect();
        return print_json(&map);
    }
    for (kind, report) in reports {
        println!(
            "{} {}: {} folder(s) discovered, {} matched",
            style("✓").green(),
            style(kind).cyan(),
            report.discovered,
            report.matched
        );
        if global.quiet {
            continue;
        }
        println!(
            "   {} new, {} updated, {} kept, {} demoted",
            style(report.inserted).yellow(),
            report.updated,
            report.kept,
            report.demoted
        );
        println!(
            "   {} director(ies) read, {} from cache, {} unreadable",
            report.dirs_read,
            report.dirs_replayed,
            report.read_errors
        );
    }
    Ok(())
}

const PROJECT_LINK_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "LINK", 6),
    ColumnDef::new("project", "PROJECT", 16),
    ColumnDef::new("status", "STATUS", 11),
    ColumnDef::new("score", "SCORE", 6),
    ColumnDef::new("date", "DATE", 12),
    ColumnDef::new("size", "SIZE", 10),
    ColumnDef::new("path", "PATH", 60),
];

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let linker = Linker::new(&ctx.store, args.kind);

    let links: Vec<ResourceLink> = match &args.project {
        Some(project) => linker.links_for_project(project.trim(), args.status)?,
        None => ctx
            .store
            .links_with_status(args.kind, args.status.unwrap_or(LinkStatus::Pending))?,
    };

    let format = effective_format(global.format, OutputFormat::Tsv);
    if format == OutputFormat::Json {
        return print_json(&links);
    }
    let rows: Vec<TableRow> = links.iter().map(link_row).collect();
    let columns = if args.project.is_some() {
        LINK_COLUMNS
    } else {
        PROJECT_LINK_COLUMNS
    };
    TableFormatter::new(columns, "link").output(&rows, format)
}

fn run_set_status(args: StatusArgs, global: &GlobalOpts, status: LinkStatus) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let linker = Linker::new(&ctx.store, args.kind);
    for id in &args.ids {
        match status {
            LinkStatus::Confirmed => linker.confirm(*id)?,
            LinkStatus::Ignored => linker.remove(*id)?,
            LinkStatus::Pending => linker.unconfirm(*id)?,
        }
        if !global.quiet {
            println!(
                "{} {} link {} {} {}",
                style("✓").green(),
                args.kind,
                style(id).cyan(),
                style("→").dim(),
                style(status).yellow()
            );
        }
    }
    Ok(())
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let folder = std::fs::canonicalize(&args.folder).unwrap_or_else(|_| args.folder.clone());
    let id = Linker::new(&ctx.store, args.kind).add_manual_link(args.project.trim(), &folder)?;
    if global.format == OutputFormat::Id {
        println!("{}", id);
        return Ok(());
    }
    println!(
        "{} Linked {} {} {} ({} link {})",
        style("✓").green(),
        style(args.project.trim()).cyan(),
        style("→").dim(),
        folder.display(),
        args.kind,
        id
    );
    Ok(())
}

fn run_review(args: ReviewArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let linker = Linker::new(&ctx.store, args.kind);
    let pending = match &args.project {
        Some(project) => linker.links_for_project(project.trim(), Some(LinkStatus::Pending))?,
        None => ctx.store.links_with_status(args.kind, LinkStatus::Pending)?,
    };
    if pending.is_empty() {
        println!("{} No pending {} links", style("✓").green(), args.kind);
        return Ok(());
    }

    let theme = ColorfulTheme::default();
    let choices = ["confirm", "remove", "skip", "quit"];
    let (mut confirmed, mut removed) = (0, 0);
    for (i, link) in pending.iter().enumerate() {
        let project_name = ctx
            .store
            .get(&link.project_id)?
            .map(|row| row.name)
            .unwrap_or_default();
        println!();
        println!(
            "{} [{}/{}] {} {}",
            style("◆").cyan(),
            i + 1,
            pending.len(),
            style(&link.project_id).cyan(),
            project_name
        );
        println!("   {}", link.full_path.display());
        println!("   score {}, dated {}", link.match_score, link.folder_date);

        let selection = Select::with_theme(&theme)
            .with_prompt("Link")
            .items(&choices)
            .default(0)
            .interact()
            .into_diagnostic()?;
        match choices[selection] {
            "confirm" => {
                linker.confirm(link.id)?;
                confirmed += 1;
            }
            "remove" => {
                linker.remove(link.id)?;
                removed += 1;
            }
            "quit" => break,
            _ => {}
        }
    }

    println!();
    println!(
        "{} {} confirmed, {} removed",
        style("✓").green(),
        style(confirmed).cyan(),
        style(removed).cyan()
    );
    Ok(())
}

fn run_clear(args: ClearArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let _lease = LibraryLease::acquire(&ctx.library)?;
    let removed = Linker::new(&ctx.store, args.kind).clear(&args.root)?;
    if global.quiet {
        return Ok(());
    }
    println!(
        "{} Cleared {} {} link(s) under {}",
        style("✓").green(),
        style(removed).cyan(),
        args.kind,
        args.root.display()
    );
    Ok(())
}
