use std::fmt::Write as _;

use crate::{data::Value, parser::ParsedTable, schema::TableDefinition};

const NULL_MARKER: &str = "NULL";

/// Renders the first `limit` rows the way they would land in the table: the
/// generated key (the row's position) followed by every text column.
pub fn render_preview(definition: &TableDefinition, table: &ParsedTable, limit: usize) -> String {
    let headers = std::iter::once(definition.primary_key.name.clone())
        .chain(definition.columns.iter().map(|c| c.name.clone()))
        .collect::<Vec<_>>();
    let rows = table
        .rows
        .iter()
        .take(limit)
        .enumerate()
        .map(|(idx, row)| {
            std::iter::once((idx + 1).to_string())
                .chain(table.ordered_values(row).map(cell_text))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => NULL_MARKER.to_string(),
        other => other.as_display(),
    }
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(&sanitize_cell(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &separator_widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse_csv};

    #[test]
    fn render_table_aligns_columns() {
        let headers = vec!["name".to_string(), "age".to_string()];
        let rows = vec![
            vec!["Alice".to_string(), "30".to_string()],
            vec!["Bob".to_string(), "25".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "name   age");
        assert_eq!(lines[1], "-----  ---");
        assert_eq!(lines[2], "Alice  30");
        assert_eq!(lines[3], "Bob    25");
    }

    #[test]
    fn preview_numbers_rows_and_marks_nulls() {
        let table = parse_csv(b"name,age\nAlice,\nBob,25\n", &ParseOptions::default()).unwrap();
        let definition =
            TableDefinition::derive("public", "people", "id", &table.columns).unwrap();
        let rendered = render_preview(&definition, &table, 1);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id"));
        assert!(lines[2].starts_with("1"));
        assert!(lines[2].ends_with("NULL"));
    }
}
