//! Renderings of a reconstructed table
//!
//! JSON (one object per row), flat CSV and a markdown pipe table. JSON and
//! CSV carry the same cell texts, so either can be read back into the other.

use crate::cells::Table;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Key under which a numeric cell's parsed value is stored
pub fn value_key(column_id: &str) -> String {
    format!("{}_value", column_id)
}

/// One JSON object per row: column id to cell text, plus `<id>_value` for
/// cells of numeric columns that parsed. Empty cells map to "".
pub fn json_rows(table: &Table) -> Vec<Map<String, Value>> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, cell) in table.columns.iter().zip(&row.cells) {
                object.insert(column.id.clone(), Value::String(cell.text.clone()));
                if column.numeric {
                    if let Some(value) = cell.value {
                        object.insert(value_key(&column.id), serde_json::json!(value));
                    }
                }
            }
            object
        })
        .collect()
}

/// Serialize `json_rows` as a JSON array
pub fn to_json_rows(table: &Table) -> Result<String, RenderError> {
    Ok(serde_json::to_string_pretty(&json_rows(table))?)
}

/// Flat CSV: header record of column ids, then one record per row
pub fn to_csv(table: &Table) -> Result<String, RenderError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(table.columns.iter().map(|c| c.id.as_str()))?;
    for row in &table.rows {
        writer.write_record(row.cells.iter().map(|c| c.text.as_str()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| RenderError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}

static LINE_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\r\n]+\s*").unwrap());

fn markdown_cell(text: &str) -> String {
    LINE_BREAK_RE.replace_all(text, " ").replace('|', "\\|")
}

/// Markdown pipe table with the column ids as header row
pub fn to_markdown(table: &Table) -> String {
    if table.columns.is_empty() {
        return String::new();
    }

    let header: Vec<String> = table.columns.iter().map(|c| markdown_cell(&c.id)).collect();
    let body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.cells.iter().map(|c| markdown_cell(&c.text)).collect())
        .collect();

    // Calculate column widths for alignment
    let col_widths: Vec<usize> = (0..header.len())
        .map(|col| {
            std::iter::once(&header)
                .chain(&body)
                .map(|row| row.get(col).map(|c| c.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(3)
                .max(3)
        })
        .collect();

    let mut output = String::new();
    let mut push_row = |cells: &[String]| {
        output.push('|');
        for (col_idx, cell) in cells.iter().enumerate() {
            let pad = col_widths[col_idx].saturating_sub(cell.chars().count());
            output.push_str(&format!(" {}{} |", cell, " ".repeat(pad)));
        }
        output.push('\n');
    };

    push_row(&header);
    let separator: Vec<String> = col_widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&separator);
    for row in &body {
        push_row(row);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::{Cell, TableColumn, TableRow};

    fn column(id: &str, numeric: bool) -> TableColumn {
        TableColumn {
            id: id.to_string(),
            left: 0.0,
            right: 0.0,
            anchor_governed: false,
            numeric,
        }
    }

    fn cell(text: &str, value: Option<f64>) -> Cell {
        Cell {
            text: text.to_string(),
            value,
            spans: if text.is_empty() { vec![] } else { vec![0] },
        }
    }

    fn sample() -> Table {
        Table {
            columns: vec![column("Date", false), column("Opération", false), column("Débit", true)],
            rows: vec![
                TableRow {
                    y_center: 20.0,
                    anchored: true,
                    cells: vec![
                        cell("12/01", None),
                        cell("CB SHOP, \"PARIS\"", None),
                        cell("45,50", Some(45.5)),
                    ],
                },
                TableRow {
                    y_center: 40.0,
                    anchored: false,
                    cells: vec![cell("13/01", None), cell("VIR | SEPA", None), cell("", None)],
                },
            ],
        }
    }

    #[test]
    fn test_json_rows() {
        let rows = json_rows(&sample());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Date"], "12/01");
        assert_eq!(rows[0]["Débit_value"], 45.5);
        assert_eq!(rows[1]["Débit"], "");
        assert!(rows[1].get("Débit_value").is_none());
        assert!(rows[0].get("Date_value").is_none());
    }

    #[test]
    fn test_csv_and_json_agree() {
        let table = sample();
        let csv_text = to_csv(&table).unwrap();
        let json_text = to_json_rows(&table).unwrap();
        let parsed: Vec<Map<String, Value>> = serde_json::from_str(&json_text).unwrap();

        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), table.column_ids());

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), parsed.len());
        for (record, object) in records.iter().zip(&parsed) {
            for (id, text) in headers.iter().zip(record.iter()) {
                assert_eq!(object[id], text);
            }
        }
    }

    #[test]
    fn test_markdown() {
        let md = to_markdown(&sample());
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("| Date  | Opération"));
        assert!(lines[1].starts_with("| ----- |"));
        assert!(lines[3].contains("VIR \\| SEPA"));
    }

    #[test]
    fn test_markdown_empty() {
        assert_eq!(to_markdown(&Table::default()), "");
    }
}
