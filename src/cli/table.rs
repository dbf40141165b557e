//! Table formatting utilities for CLI list commands
//!
//! Rows are built from typed cells so every list command renders the same
//! way: an aligned, colored table for terminals, CSV through the `csv`
//! writer, or bare ids for piping into other commands.

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{format_size, truncate_str};
use crate::cli::OutputFormat;
use crate::core::catalog::LinkStatus;
use crate::core::identity::ProjectStatus;

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Project or link id, cyan
    Id(String),
    /// Plain text, truncated to the column width
    Text(String),
    /// Project status with color coding
    Status(ProjectStatus),
    /// Link review state with color coding
    LinkStatus(LinkStatus),
    /// Match score, green at or above 80, yellow at or above 60
    Score(u8),
    /// Byte count shown human-readable
    Size(u64),
    Number(i64),
    /// Tags as comma-separated
    Tags(Vec<String>),
    /// Marker shown as `*` when set
    Flag(bool),
    Empty,
}

impl CellValue {
    /// Format for the aligned table (with colors if terminal)
    pub fn format_tsv(&self, width: usize) -> String {
        match self {
            CellValue::Id(id) => format!("{:<width$}", style(id).cyan(), width = width),
            CellValue::Text(s) => {
                let truncated = truncate_str(s, width.saturating_sub(2));
                pad(&truncated, width)
            }
            CellValue::Status(status) => {
                let s = status.to_string();
                let styled = match status {
                    ProjectStatus::Ongoing => style(&s).yellow(),
                    ProjectStatus::Delivered => style(&s).green(),
                    ProjectStatus::Archived => style(&s).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::LinkStatus(status) => {
                let s = status.to_string();
                let styled = match status {
                    LinkStatus::Pending => style(&s).yellow(),
                    LinkStatus::Confirmed => style(&s).green(),
                    LinkStatus::Ignored => style(&s).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::Score(score) => {
                let s = score.to_string();
                let styled = if *score >= 80 {
                    style(s).green()
                } else if *score >= 60 {
                    style(s).yellow()
                } else {
                    style(s).dim()
                };
                format!("{:>width$}", styled, width = width)
            }
            CellValue::Size(bytes) => format!("{:>width$}", format_size(*bytes), width = width),
            CellValue::Number(n) => format!("{:>width$}", n, width = width),
            CellValue::Tags(tags) => {
                let joined = tags.join(", ");
                pad(&truncate_str(&joined, width.saturating_sub(2)), width)
            }
            CellValue::Flag(set) => {
                let mark = if *set { "*" } else { "" };
                format!("{:<width$}", style(mark).magenta(), width = width)
            }
            CellValue::Empty => format!("{:<width$}", "-", width = width),
        }
    }

    /// Raw string value (no formatting, for CSV output)
    pub fn raw(&self) -> String {
        match self {
            CellValue::Id(s) | CellValue::Text(s) => s.clone(),
            CellValue::Status(status) => status.to_string(),
            CellValue::LinkStatus(status) => status.to_string(),
            CellValue::Score(score) => score.to_string(),
            CellValue::Size(bytes) => bytes.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Tags(tags) => tags.join(", "),
            CellValue::Flag(set) => if *set { "yes" } else { "no" }.to_string(),
            CellValue::Empty => String::new(),
        }
    }

    /// Display width of this cell's content (for dynamic column sizing)
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Size(bytes) => format_size(*bytes).len(),
            CellValue::Flag(_) => 1,
            CellValue::Empty => 1,
            other => other.raw().chars().count(),
        }
    }
}

/// Left-align by character count; `{:<w$}` counts bytes for CJK text
fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
}

/// Column definition with header label and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: &'static str,
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, width: usize) -> Self {
        Self { key, header, width }
    }
}

/// A row of cell values for table output
pub struct TableRow {
    pub id: String,
    pub cells: Vec<(&'static str, CellValue)>,
}

impl TableRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, key: &'static str, value: CellValue) -> Self {
        self.cells.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Table formatter that outputs rows in various formats
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
    noun: &'static str,
    show_summary: bool,
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef], noun: &'static str) -> Self {
        Self {
            columns,
            noun,
            show_summary: true,
        }
    }

    /// Hide the "N found" line
    pub fn without_summary(mut self) -> Self {
        self.show_summary = false;
        self
    }

    /// Output rows in the specified format. JSON is rendered by the caller
    /// from its own serializable data.
    pub fn output(&self, rows: &[TableRow], format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Csv => self.output_csv(rows),
            OutputFormat::Id => {
                for row in rows {
                    println!("{}", row.id);
                }
                Ok(())
            }
            _ => {
                self.output_table(rows);
                Ok(())
            }
        }
    }

    /// Column widths from the content, capped at each column's width
    fn calculate_widths(&self, rows: &[TableRow]) -> Vec<usize> {
        self.columns
            .iter()
            .map(|col| {
                let max_content = rows
                    .iter()
                    .filter_map(|r| r.get(col.key))
                    .map(|v| v.display_width())
                    .max()
                    .unwrap_or(0);
                col.header
                    .len()
                    .max(max_content.saturating_add(2))
                    .min(col.width)
            })
            .collect()
    }

    fn output_table(&self, rows: &[TableRow]) {
        let widths = self.calculate_widths(rows);

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<width$}", style(col.header).bold(), width = *w))
            .collect();
        println!("{}", header.join(" "));
        let total_width: usize = widths.iter().sum::<usize>() + widths.len().saturating_sub(1);
        println!("{}", "-".repeat(total_width));

        for row in rows {
            let parts: Vec<String> = self
                .columns
                .iter()
                .zip(&widths)
                .map(|(col, w)| match row.get(col.key) {
                    Some(value) => value.format_tsv(*w),
                    None => format!("{:<width$}", "-", width = *w),
                })
                .collect();
            println!("{}", parts.join(" ").trim_end());
        }

        if self.show_summary {
            println!();
            println!("{} {}(s) found", style(rows.len()).cyan(), self.noun);
        }
    }

    fn output_csv(&self, rows: &[TableRow]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        writer
            .write_record(self.columns.iter().map(|c| c.key))
            .into_diagnostic()?;
        for row in rows {
            writer
                .write_record(
                    self.columns
                        .iter()
                        .map(|col| row.get(col.key).map(CellValue::raw).unwrap_or_default()),
                )
                .into_diagnostic()?;
        }
        writer.flush().into_diagnostic()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_raw_values() {
        assert_eq!(CellValue::Score(87).raw(), "87");
        assert_eq!(CellValue::Size(2048).raw(), "2048");
        assert_eq!(
            CellValue::Tags(vec!["a".into(), "b".into()]).raw(),
            "a, b"
        );
        assert_eq!(CellValue::LinkStatus(LinkStatus::Pending).raw(), "pending");
    }

    #[test]
    fn test_widths_follow_content() {
        let columns = [
            ColumnDef::new("id", "ID", 16),
            ColumnDef::new("name", "NAME", 12),
        ];
        let rows = vec![TableRow::new("PRJ-202401-001")
            .cell("id", CellValue::Id("PRJ-202401-001".into()))
            .cell("name", CellValue::Text("a very long project name".into()))];
        let widths = TableFormatter::new(&columns, "project").calculate_widths(&rows);
        assert_eq!(widths, vec![16, 12]);
    }

    #[test]
    fn test_pad_counts_characters() {
        assert_eq!(pad("前梁", 4), "前梁  ");
    }
}
