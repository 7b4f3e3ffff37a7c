//! Report tables using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use occubench_core::StatsRow;

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    if super::no_color() {
        table.force_no_tty();
    }
    table
}

fn header(columns: &[&str]) -> Vec<Cell> {
    columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect()
}

fn number(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

/// One row per query type with latency percentiles in milliseconds.
pub fn stats_table(rows: &[StatsRow]) -> Table {
    let mut table = base_table();
    table.set_header(header(&[
        "Query", "Count", "Mean ms", "Stdev ms", "QPS", "p50", "p95", "p99", "p99.9",
    ]));
    for row in rows {
        table.add_row(vec![
            Cell::new(row.kind.to_string()),
            number(row.count),
            number(format!("{:.3}", row.mean_ms)),
            number(format!("{:.3}", row.stdev_ms)),
            number(format!("{:.1}", row.qps)),
            number(format!("{:.3}", row.p50_ms)),
            number(format!("{:.3}", row.p95_ms)),
            number(format!("{:.3}", row.p99_ms)),
            number(format!("{:.3}", row.p999_ms)),
        ]);
    }
    table
}

/// Generic table with a styled header.
pub fn grid(columns: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = base_table();
    table.set_header(header(columns));
    for row in rows {
        table.add_row(row);
    }
    table
}

/// Two columns: key and value.
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = base_table();
    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}
