//! Cell assignment
//!
//! Places every body span into the column whose range holds its horizontal
//! center, within the row fixed by row grouping, and builds the final table.

use crate::anchors::{parse_amount, AmountParse, AnchorScan};
use crate::columns::Column;
use crate::config::Locale;
use crate::rows::Row;
use crate::span::Span;
use serde::Serialize;

/// Column descriptor of an output table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    pub id: String,
    pub left: f32,
    pub right: f32,
    /// Synthesized from an anchor cluster rather than a header
    pub anchor_governed: bool,
    /// Cells carry parsed numeric values
    pub numeric: bool,
}

/// Text of one (row, column) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cell {
    /// Member texts, left to right, joined by one space
    pub text: String,
    /// Numeric value for cells of numeric columns
    pub value: Option<f64>,
    /// Contributing span indices, left to right
    pub spans: Vec<usize>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// One table record; `cells` is aligned with `Table::columns`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub y_center: f32,
    /// At least one member is an anchor value
    pub anchored: bool,
    pub cells: Vec<Cell>,
}

/// Reconstructed table of one page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

impl Table {
    /// An empty table means "no table detected"
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_ids(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    /// Non-empty cell of `row` under column `id`
    pub fn cell(&self, row: usize, id: &str) -> Option<&Cell> {
        let col = self.column_index(id)?;
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(col))
            .filter(|c| !c.is_empty())
    }

    /// Row as `(column id, cell)` pairs, skipping empty cells
    pub fn row_entries(&self, row: usize) -> Vec<(&str, &Cell)> {
        match self.rows.get(row) {
            Some(r) => self
                .columns
                .iter()
                .zip(&r.cells)
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(col, cell)| (col.id.as_str(), cell))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Post-pass switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignOptions {
    pub trim_trailing_rows: bool,
    pub merge_continuation_rows: bool,
}

/// Result of cell assignment with its diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assignment {
    pub table: Table,
    /// Body spans whose center fell in no column
    pub unassigned: Vec<usize>,
    /// Spans of rows dropped after the last anchored row
    pub trimmed: Vec<usize>,
    /// Number of continuation rows folded into the row above
    pub merged_rows: usize,
}

/// Column whose half-open range holds `x`. `columns` are sorted and disjoint.
pub fn column_for(columns: &[Column], x: f32) -> Option<usize> {
    let idx = columns.partition_point(|c| c.right <= x);
    columns.get(idx).filter(|c| c.contains(x)).map(|_| idx)
}

/// Build the table from fixed rows and columns
pub fn assign_cells(
    spans: &[Span],
    rows: &[Row],
    columns: &[Column],
    anchors: &AnchorScan,
    locale: &Locale,
    options: AssignOptions,
) -> Assignment {
    let mut unassigned = Vec::new();
    let mut grid: Vec<(f32, Vec<Vec<usize>>)> = Vec::with_capacity(rows.len());

    for row in rows {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); columns.len()];
        let mut any = false;
        // Members are already left to right, so buckets stay ordered
        for &idx in &row.members {
            match column_for(columns, spans[idx].bbox.x_center()) {
                Some(col) => {
                    buckets[col].push(idx);
                    any = true;
                }
                None => {
                    log::trace!("unassigned span {:?}", spans[idx].text);
                    unassigned.push(idx);
                }
            }
        }
        if any {
            grid.push((row.y_center, buckets));
        }
    }

    let numeric = numeric_columns(columns, &grid, anchors);

    let mut table_rows: Vec<TableRow> = grid
        .into_iter()
        .map(|(y_center, buckets)| {
            let anchored = buckets.iter().flatten().any(|&i| anchors.for_span(i).is_some());
            let cells = buckets
                .into_iter()
                .enumerate()
                .map(|(col, members)| build_cell(spans, members, numeric[col], anchors, locale))
                .collect();
            TableRow {
                y_center,
                anchored,
                cells,
            }
        })
        .collect();

    let mut trimmed = Vec::new();
    if options.trim_trailing_rows {
        if let Some(last) = table_rows.iter().rposition(|r| r.anchored) {
            for row in table_rows.drain(last + 1..) {
                trimmed.extend(row.cells.iter().flat_map(|c| c.spans.iter().copied()));
            }
        }
    }

    let merged_rows = if options.merge_continuation_rows {
        merge_continuations(&mut table_rows, &numeric)
    } else {
        0
    };

    let table_columns = columns
        .iter()
        .zip(&numeric)
        .map(|(c, &numeric)| TableColumn {
            id: c.id.clone(),
            left: c.left,
            right: c.right,
            anchor_governed: c.is_anchor_governed(),
            numeric,
        })
        .collect();

    Assignment {
        table: Table {
            columns: table_columns,
            rows: table_rows,
        },
        unassigned,
        trimmed,
        merged_rows,
    }
}

/// Anchor-governed columns are numeric; so are header columns where at
/// least half of the non-empty cells are a single anchor value.
fn numeric_columns(
    columns: &[Column],
    grid: &[(f32, Vec<Vec<usize>>)],
    anchors: &AnchorScan,
) -> Vec<bool> {
    columns
        .iter()
        .enumerate()
        .map(|(col, column)| {
            if column.is_anchor_governed() {
                return true;
            }
            let mut filled = 0usize;
            let mut single_anchor = 0usize;
            for (_, buckets) in grid {
                let members = &buckets[col];
                if members.is_empty() {
                    continue;
                }
                filled += 1;
                if members.len() == 1 && anchors.for_span(members[0]).is_some() {
                    single_anchor += 1;
                }
            }
            filled > 0 && single_anchor * 2 >= filled
        })
        .collect()
}

fn build_cell(
    spans: &[Span],
    members: Vec<usize>,
    numeric: bool,
    anchors: &AnchorScan,
    locale: &Locale,
) -> Cell {
    let text = members
        .iter()
        .map(|&i| spans[i].text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let value = if !numeric || members.is_empty() {
        None
    } else if let [only] = members.as_slice() {
        anchors.for_span(*only).map(|a| a.value)
    } else {
        match parse_amount(&text, locale) {
            AmountParse::Value(parsed) => Some(parsed.value),
            _ => None,
        }
    };

    Cell {
        text,
        value,
        spans: members,
    }
}

/// Fold wrapped lines into the row above. A continuation row has no
/// anchor, an empty first column, and text only in non-numeric columns.
/// Returns the number of rows merged away.
fn merge_continuations(rows: &mut Vec<TableRow>, numeric: &[bool]) -> usize {
    let mut merged: Vec<TableRow> = Vec::with_capacity(rows.len());
    let mut count = 0;

    for row in rows.drain(..) {
        let is_continuation = !merged.is_empty()
            && !row.anchored
            && row.cells.first().map_or(false, Cell::is_empty)
            && row
                .cells
                .iter()
                .zip(numeric)
                .all(|(cell, &is_numeric)| cell.is_empty() || !is_numeric);

        match merged.last_mut() {
            Some(prev) if is_continuation => {
                for (target, cell) in prev.cells.iter_mut().zip(row.cells) {
                    if cell.is_empty() {
                        continue;
                    }
                    if !target.text.is_empty() && !cell.text.is_empty() {
                        target.text.push(' ');
                    }
                    target.text.push_str(&cell.text);
                    target.spans.extend(cell.spans);
                }
                count += 1;
            }
            _ => merged.push(row),
        }
    }

    *rows = merged;
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::detect_anchors;
    use crate::columns::ColumnSource;
    use crate::span::BBox;

    fn make_span(text: &str, x: f32, y: f32) -> Span {
        let width = text.chars().count() as f32 * 5.0;
        Span::new(text, BBox::new(x, y, x + width, y + 10.0), "F1", 10.0, 0)
    }

    fn header_column(id: &str, left: f32, right: f32) -> Column {
        Column {
            id: id.to_string(),
            left,
            right,
            source: ColumnSource::Header { span: 0 },
        }
    }

    fn run(spans: &[Span], rows: &[Row], columns: &[Column], options: AssignOptions) -> Assignment {
        let locale = Locale::comma_decimal();
        let anchors = detect_anchors(spans, &locale);
        assign_cells(spans, rows, columns, &anchors, &locale, options)
    }

    #[test]
    fn test_column_for_half_open() {
        let columns = vec![header_column("A", 0.0, 50.0), header_column("B", 50.0, 100.0)];
        assert_eq!(column_for(&columns, 0.0), Some(0));
        assert_eq!(column_for(&columns, 49.9), Some(0));
        assert_eq!(column_for(&columns, 50.0), Some(1));
        assert_eq!(column_for(&columns, 100.0), None);
        assert_eq!(column_for(&columns, -1.0), None);
    }

    #[test]
    fn test_cells_joined_left_to_right() {
        let spans = vec![
            make_span("CB", 60.0, 20.0),
            make_span("12/01", 5.0, 20.0),
            make_span("CARREFOUR", 75.0, 20.0),
            make_span("45,50", 210.0, 20.0),
        ];
        let rows = vec![Row {
            y_center: 25.0,
            members: vec![1, 0, 2, 3],
        }];
        let columns = vec![
            header_column("Date", 0.0, 50.0),
            header_column("Opération", 50.0, 200.0),
            header_column("Débit", 200.0, 300.0),
        ];
        let result = run(&spans, &rows, &columns, AssignOptions::default());
        let table = &result.table;

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.cell(0, "Date").unwrap().text, "12/01");
        assert_eq!(table.cell(0, "Opération").unwrap().text, "CB CARREFOUR");
        assert_eq!(table.cell(0, "Débit").unwrap().value, Some(45.5));
        assert_eq!(table.cell(0, "Date").unwrap().value, None);
        assert!(table.columns[2].numeric);
        assert!(!table.columns[0].numeric);
        assert!(table.rows[0].anchored);
        assert!(result.unassigned.is_empty());
    }

    #[test]
    fn test_unassigned_spans_recorded() {
        let spans = vec![make_span("Page 1/3", 400.0, 20.0), make_span("x", 10.0, 20.0)];
        let rows = vec![Row {
            y_center: 25.0,
            members: vec![1, 0],
        }];
        let columns = vec![header_column("A", 0.0, 100.0)];
        let result = run(&spans, &rows, &columns, AssignOptions::default());
        assert_eq!(result.unassigned, vec![0]);
        assert_eq!(result.table.row_entries(0).len(), 1);
    }

    #[test]
    fn test_row_with_only_unassigned_spans_dropped() {
        let spans = vec![make_span("footer", 400.0, 300.0)];
        let rows = vec![Row {
            y_center: 305.0,
            members: vec![0],
        }];
        let columns = vec![header_column("A", 0.0, 100.0)];
        let result = run(&spans, &rows, &columns, AssignOptions::default());
        assert!(result.table.is_empty());
        assert_eq!(result.unassigned, vec![0]);
    }

    #[test]
    fn test_trailing_rows_trimmed() {
        let spans = vec![
            make_span("12/01", 5.0, 20.0),
            make_span("10,00", 210.0, 20.0),
            make_span("Total", 5.0, 40.0),
            make_span("Merci", 5.0, 60.0),
        ];
        let rows = vec![
            Row { y_center: 25.0, members: vec![0, 1] },
            Row { y_center: 45.0, members: vec![2] },
            Row { y_center: 65.0, members: vec![3] },
        ];
        let columns = vec![header_column("Date", 0.0, 200.0), header_column("Débit", 200.0, 300.0)];
        let options = AssignOptions {
            trim_trailing_rows: true,
            merge_continuation_rows: false,
        };
        let result = run(&spans, &rows, &columns, options);
        assert_eq!(result.table.rows.len(), 1);
        assert_eq!(result.trimmed, vec![2, 3]);

        let kept = run(&spans, &rows, &columns, AssignOptions::default());
        assert_eq!(kept.table.rows.len(), 3);
    }

    #[test]
    fn test_continuation_rows_merged() {
        let spans = vec![
            make_span("12/01", 5.0, 20.0),
            make_span("VIR SEPA", 60.0, 20.0),
            make_span("10,00", 210.0, 20.0),
            make_span("LOYER JANVIER", 60.0, 34.0),
            make_span("13/01", 5.0, 50.0),
            make_span("CB", 60.0, 50.0),
            make_span("5,00", 210.0, 50.0),
        ];
        let rows = vec![
            Row { y_center: 25.0, members: vec![0, 1, 2] },
            Row { y_center: 39.0, members: vec![3] },
            Row { y_center: 55.0, members: vec![4, 5, 6] },
        ];
        let columns = vec![
            header_column("Date", 0.0, 50.0),
            header_column("Opération", 50.0, 200.0),
            header_column("Débit", 200.0, 300.0),
        ];
        let options = AssignOptions {
            trim_trailing_rows: true,
            merge_continuation_rows: true,
        };
        let result = run(&spans, &rows, &columns, options);
        assert_eq!(result.merged_rows, 1);
        assert_eq!(result.table.rows.len(), 2);
        assert_eq!(
            result.table.cell(0, "Opération").unwrap().text,
            "VIR SEPA LOYER JANVIER"
        );
        assert_eq!(result.table.cell(0, "Opération").unwrap().spans, vec![1, 3]);
    }
}
