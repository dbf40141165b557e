//! `prjindex show` command - One project with its resource links

use std::collections::BTreeMap;

use console::style;
use miette::Result;

use crate::cli::helpers::{effective_format, format_size, print_json, LibraryContext};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::{LinkStats, LinkStatus, ResourceKind, ResourceLink};
use crate::core::error::LibraryError;
use crate::core::linker::Linker;

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Project id (PRJ-YYYYMM-NNN)
    pub id: String,

    /// Include ignored links
    #[arg(long)]
    pub all_links: bool,
}

pub(crate) const LINK_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "LINK", 6),
    ColumnDef::new("status", "STATUS", 11),
    ColumnDef::new("score", "SCORE", 6),
    ColumnDef::new("date", "DATE", 12),
    ColumnDef::new("size", "SIZE", 10),
    ColumnDef::new("path", "PATH", 60),
];

pub(crate) fn link_row(link: &ResourceLink) -> TableRow {
    TableRow::new(link.id.to_string())
        .cell("id", CellValue::Number(link.id))
        .cell("project", CellValue::Id(link.project_id.clone()))
        .cell("status", CellValue::LinkStatus(link.status))
        .cell("score", CellValue::Score(link.match_score))
        .cell("date", CellValue::Text(link.folder_date.clone()))
        .cell(
            "size",
            match &link.aggregate {
                Some(agg) => CellValue::Size(agg.total_size),
                None => CellValue::Empty,
            },
        )
        .cell("path", CellValue::Text(link.full_path.display().to_string()))
}

pub fn run(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let id = args.id.trim();
    let row = ctx
        .indexer()
        .get(id)?
        .ok_or_else(|| LibraryError::project_not_found(id))?;

    let mut links: BTreeMap<&'static str, Vec<ResourceLink>> = BTreeMap::new();
    let mut stats: BTreeMap<&'static str, LinkStats> = BTreeMap::new();
    for kind in ResourceKind::ALL {
        let linker = Linker::new(&ctx.store, kind);
        let mut kind_links = linker.links_for_project(id, None)?;
        if !args.all_links {
            kind_links.retain(|l| l.status != LinkStatus::Ignored);
        }
        stats.insert(kind.as_str(), linker.stats(id)?);
        links.insert(kind.as_str(), kind_links);
    }

    match effective_format(global.format, OutputFormat::Auto) {
        OutputFormat::Json => {
            return print_json(&serde_json::json!({
                "project": row,
                "links": links,
                "link_stats": stats,
            }));
        }
        OutputFormat::Id => {
            println!("{}", row.id);
            return Ok(());
        }
        _ => {}
    }

    println!("{} {}", style(&row.id).cyan().bold(), style(&row.name).bold());
    print_field("Customer", &row.customer);
    print_field("Status", row.status.as_str());
    print_field("Created", &row.create_time);
    print_field("Directory", &row.project_dir.display().to_string());
    if let Some(pn) = &row.part_number {
        print_field("Part number", pn);
    }
    if !row.tags.is_empty() {
        print_field("Tags", &row.tags.join(", "));
    }
    if let Some(desc) = row.description.as_deref().filter(|d| !d.trim().is_empty()) {
        print_field("Description", desc);
    }
    if row.pinned {
        print_field("Pinned", "yes");
    }
    print_field(
        "Opened",
        &match &row.last_open_time {
            Some(at) => format!("{} time(s), last {}", row.open_count, at),
            None => "never".to_string(),
        },
    );

    for kind in ResourceKind::ALL {
        let kind_links = &links[kind.as_str()];
        let kind_stats = &stats[kind.as_str()];
        println!();
        let mut heading = format!(
            "{} links: {} confirmed, {} pending",
            kind, kind_stats.confirmed, kind_stats.pending
        );
        if kind == ResourceKind::SharedFolder && kind_stats.total_size > 0 {
            heading.push_str(&format!(", {}", format_size(kind_stats.total_size)));
        }
        println!("{}", style(heading).bold());
        if kind_links.is_empty() {
            println!("  {}", style("none").dim());
            continue;
        }
        let rows: Vec<TableRow> = kind_links.iter().map(link_row).collect();
        TableFormatter::new(LINK_COLUMNS, "link")
            .without_summary()
            .output(&rows, OutputFormat::Tsv)?;
    }
    Ok(())
}

fn print_field(label: &str, value: &str) {
    println!("  {:<12} {}", style(label).dim(), value);
}
