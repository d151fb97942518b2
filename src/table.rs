use std::borrow::Cow;
use std::fmt::Write as _;

use crate::export::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders an aligned text table; columns whose every non-empty cell is numeric are right-aligned.
pub fn render_table(table: &Table) -> String {
    let column_count = table.headers.len();
    let mut widths = table
        .headers
        .iter()
        .map(|h| display_width(h))
        .collect::<Vec<_>>();

    for row in &table.rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    for width in &mut widths {
        *width = (*width).max(1);
    }

    let aligns = (0..column_count)
        .map(|idx| column_alignment(table, idx))
        .collect::<Vec<_>>();

    let mut output = String::new();

    let header_aligns = vec![Align::Left; column_count];
    let _ = writeln!(output, "{}", format_row(&table.headers, &widths, &header_aligns));

    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let _ = writeln!(
        output,
        "{}",
        format_row(&separator_cells, &separator_widths, &header_aligns)
    );

    for row in &table.rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }

    output
}

pub fn print_table(table: &Table) {
    print!("{}", render_table(table));
}

/// Prints a titled table, or a notice when it has no rows.
pub fn print_section(title: &str, table: &Table) {
    println!("{title}");
    if table.is_empty() {
        println!("(no rows)");
    } else {
        print_table(table);
    }
    println!();
}

fn column_alignment(table: &Table, idx: usize) -> Align {
    let mut cells = table
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .peekable();
    if cells.peek().is_none() {
        return Align::Left;
    }
    if cells.all(|cell| cell.parse::<f64>().is_ok()) {
        Align::Right
    } else {
        Align::Left
    }
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        if idx >= widths.len() {
            break;
        }
        let sanitized = sanitize_cell(value);
        let display = display_width(sanitized.as_ref());
        let padding = " ".repeat(widths[idx].saturating_sub(display));
        let cell = match aligns.get(idx).copied().unwrap_or(Align::Left) {
            Align::Left => format!("{sanitized}{padding}"),
            Align::Right => format!("{padding}{sanitized}"),
        };
        cells.push(cell);
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
