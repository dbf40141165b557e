//! `prjindex stats` and `prjindex recent` commands - Dashboard views

use chrono::Local;
use console::style;
use miette::Result;

use crate::cli::helpers::{effective_format, print_json, LibraryContext};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(clap::Args, Debug)]
pub struct RecentArgs {
    /// Number of entries
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,
}

const POPULAR_TAGS: usize = 10;

pub fn run(global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let today = Local::now().date_naive();
    let stats = ctx.store.dashboard_stats(today)?;
    let tags = ctx.store.popular_tags(POPULAR_TAGS)?;
    let months = ctx.store.month_counts()?;

    if global.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "projects": stats,
            "popular_tags": tags,
            "months": months,
            "full_text": ctx.store.full_text(),
        }));
    }

    println!("{}", style("Projects").bold().underlined());
    println!("  {:<16} {}", "total", style(stats.total).cyan());
    println!("  {:<16} {}", "ongoing", style(stats.ongoing).yellow());
    println!("  {:<16} {}", "delivered", style(stats.delivered).green());
    println!("  {:<16} {}", "archived", style(stats.archived).dim());
    println!("  {:<16} {}", "new this month", stats.new_this_month);

    if !tags.is_empty() {
        println!();
        println!("{}", style("Popular tags").bold().underlined());
        for (tag, count) in &tags {
            println!("  {:<16} {}", tag, count);
        }
    }

    if !months.is_empty() && !global.quiet {
        println!();
        println!("{}", style("By month").bold().underlined());
        for (month, count) in &months {
            println!("  {:<16} {}", month, count);
        }
    }

    if !ctx.store.full_text() {
        println!();
        println!(
            "{} full-text search unavailable, using substring search",
            style("!").yellow()
        );
    }
    Ok(())
}

const RECENT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "ID", 16),
    ColumnDef::new("action", "ACTION", 9),
    ColumnDef::new("time", "TIME", 21),
    ColumnDef::new("name", "NAME", 32),
    ColumnDef::new("customer", "CUSTOMER", 20),
    ColumnDef::new("status", "STATUS", 11),
];

pub fn run_recent(args: RecentArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let items = ctx.indexer().recent_activity(args.limit.max(1))?;

    let format = effective_format(global.format, OutputFormat::Tsv);
    if format == OutputFormat::Json {
        return print_json(&items);
    }

    let rows: Vec<TableRow> = items
        .iter()
        .map(|item| {
            TableRow::new(&item.id)
                .cell("id", CellValue::Id(item.id.clone()))
                .cell("action", CellValue::Text(item.action.to_string()))
                .cell("time", CellValue::Text(item.time.clone()))
                .cell("name", CellValue::Text(item.name.clone()))
                .cell("customer", CellValue::Text(item.customer.clone()))
                .cell("status", CellValue::Status(item.status))
        })
        .collect();
    TableFormatter::new(RECENT_COLUMNS, "project")
        .without_summary()
        .output(&rows, format)
}
