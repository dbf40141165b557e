//! `prjindex search` command - Search projects in the catalog

use console::style;
use miette::Result;

use crate::cli::helpers::{effective_format, print_json, LibraryContext};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::CatalogRow;

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Search words; empty lists every project
    pub query: Vec<String>,

    /// Maximum number of results (default: configured search_limit)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Include archived projects
    #[arg(long, short = 'a')]
    pub archived: bool,
}

pub(crate) const PROJECT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("pin", "", 2),
    ColumnDef::new("id", "ID", 16),
    ColumnDef::new("name", "NAME", 32),
    ColumnDef::new("customer", "CUSTOMER", 20),
    ColumnDef::new("status", "STATUS", 11),
    ColumnDef::new("month", "MONTH", 9),
    ColumnDef::new("tags", "TAGS", 28),
];

pub(crate) fn project_row(row: &CatalogRow) -> TableRow {
    TableRow::new(&row.id)
        .cell("pin", CellValue::Flag(row.pinned))
        .cell("id", CellValue::Id(row.id.clone()))
        .cell("name", CellValue::Text(row.name.clone()))
        .cell("customer", CellValue::Text(row.customer.clone()))
        .cell("status", CellValue::Status(row.status))
        .cell("month", CellValue::Text(row.month.clone()))
        .cell(
            "tags",
            if row.tags.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Tags(row.tags.clone())
            },
        )
}

pub fn run(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = LibraryContext::open(global)?;
    let query = args.query.join(" ");
    let limit = args.limit.unwrap_or(ctx.config.search_limit).max(1);

    let results = ctx.indexer().search(&query, limit, args.archived)?;

    let format = effective_format(global.format, OutputFormat::Tsv);
    if format == OutputFormat::Json {
        return print_json(&results);
    }

    let rows: Vec<TableRow> = results.rows.iter().map(project_row).collect();
    let formatter = TableFormatter::new(PROJECT_COLUMNS, "project");
    if global.quiet {
        formatter.without_summary().output(&rows, format)?;
    } else {
        formatter.output(&rows, format)?;
    }

    if !results.full_text && !global.quiet && format == OutputFormat::Tsv {
        println!(
            "{}",
            style("(full-text search unavailable, substring matches shown)").dim()
        );
    }
    Ok(())
}
