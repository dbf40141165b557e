//! `prjindex rebuild` and `prjindex sync` commands - Mirror ground truth into the catalog

use console::{style, Term};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{open_library, print_json, LibraryContext};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::{CatalogStore, ResourceKind};
use crate::core::indexer::Indexer;
use crate::core::jobs::{self, LibraryLease, Progress};
use crate::core::linker::Linker;

#[derive(clap::Args, Debug)]
pub struct RebuildArgs {
    /// Also index projects in the archive directory
    #[arg(long, short = 'a')]
    pub archived: bool,
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Also scan the configured roots for this project's resources
    #[arg(long)]
    pub link: bool,
}

pub fn run(args: RebuildArgs, global: &GlobalOpts) -> Result<()> {
    let (config, library) = open_library(global)?;
    let lease = LibraryLease::acquire(&library)?;
    let batch_size = config.rebuild_batch_size;
    let archived = args.archived;

    let job_library = library.clone();
    let handle = jobs::submit(lease, move |job| {
        let store = CatalogStore::open(&job_library)?;
        Indexer::new(&job_library, &store)
            .batch_size(batch_size)
            .cancel_token(job.cancel_token())
            .rebuild(archived, |done, total| job.report(done, total))
    });

    let term = Term::stderr();
    let show_progress = !global.quiet && term.is_term();
    for progress in handle.progress_iter() {
        if show_progress {
            draw_progress(&term, progress)?;
        }
    }
    if show_progress {
        term.clear_line().into_diagnostic()?;
    }
    let stats = handle.wait()?;

    if global.format == OutputFormat::Json {
        return print_json(&stats);
    }
    println!(
        "{} Indexed {} project(s) from {}",
        style("✓").green(),
        style(stats.projects).cyan(),
        style(library.root().display()).dim()
    );
    if !global.quiet {
        println!(
            "   {} file(s), {} item tag(s), {} stale row(s) pruned in {} ms",
            stats.files, stats.item_tags, stats.pruned, stats.duration_ms
        );
    }
    Ok(())
}

fn draw_progress(term: &Term, progress: Progress) -> Result<()> {
    term.clear_line().into_diagnostic()?;
    term.write_str(&format!(
        "{} {}/{} projects",
        style("indexing").dim(),
        progress.done,
        progress.total
    ))
    .into_diagnostic()
}

pub fn run_sync(args: SyncArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let entry = ctx.project_entry(&args.id)?;
    ctx.indexer().sync_one(&entry)?;
    println!(
        "{} Synced {}",
        style("✓").green(),
        style(&entry.project.id).cyan()
    );

    if args.link {
        let _lease = LibraryLease::acquire(&ctx.library)?;
        for kind in ResourceKind::ALL {
            let roots = ctx.config.roots_for(kind);
            if roots.is_empty() {
                continue;
            }
            let report = Linker::new(&ctx.store, kind).scan_and_link_one(roots, &entry.project)?;
            println!(
                "   {} {}: {} matched, {} new, {} demoted",
                style("→").dim(),
                kind,
                report.matched,
                report.inserted,
                report.demoted
            );
        }
    }
    Ok(())
}
