//! Per-page pipeline and document driver
//!
//! Each page runs the same linear sequence: detect headers and anchors,
//! infer columns, group rows, assign cells. Pages share nothing except the
//! compiled configuration, so a document is processed one rayon task per
//! page and a failing page never affects the others.

use crate::anchors::{detect_anchors, AnchorRejection, AnchorScan, AnchorValue};
use crate::cells::{assign_cells, AssignOptions, Table};
use crate::columns::{infer_columns, well_separated, Column};
use crate::config::{CompiledConfig, ConfigError, LayoutConfig};
use crate::headers::{detect_headers, Header};
use crate::rows::{group_rows, row_tolerance, Row};
use crate::span::Page;
use crate::LayoutError;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pipeline stage, reported with page failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DetectHeaders,
    DetectAnchors,
    InferColumns,
    GroupRows,
    AssignCells,
}

/// A page that produced no table, with enough context to debug it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("page {page}: {stage:?} failed: {kind} [{snapshot}]")]
pub struct PageError {
    pub page: usize,
    pub stage: Stage,
    pub kind: LayoutError,
    /// Summary of the stage inputs
    pub snapshot: String,
}

/// Output of the detection and column inference stages
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub page: usize,
    pub headers: Vec<Header>,
    pub anchors: AnchorScan,
    /// Indices of spans forming the table body
    pub body: Vec<usize>,
    pub row_tolerance: f32,
    pub columns: Result<Vec<Column>, LayoutError>,
}

impl PageAnalysis {
    fn snapshot(&self, span_count: usize) -> String {
        let columns = match &self.columns {
            Ok(columns) => columns
                .iter()
                .map(|c| format!("{}:{:.1}-{:.1}", c.id, c.left, c.right))
                .collect::<Vec<_>>()
                .join(", "),
            Err(_) => String::from("-"),
        };
        format!(
            "spans={} headers={} anchors={} body={} columns=[{}]",
            span_count,
            self.headers.len(),
            self.anchors.values.len(),
            self.body.len(),
            columns
        )
    }
}

/// Reconstructed table of one page plus diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageTable {
    pub page: usize,
    pub headers: Vec<Header>,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub table: Table,
    /// Body spans outside every column
    pub unassigned: Vec<usize>,
    /// Spans of trailing rows after the last anchored row
    pub trimmed: Vec<usize>,
    pub merged_rows: usize,
    /// Numeric-looking spans that failed the locale grammar
    pub rejected_anchors: Vec<AnchorRejection>,
    /// Columns were taken from an earlier page
    pub inherited_columns: bool,
}

/// Outcome for one page of a document
#[derive(Debug, Clone, PartialEq)]
pub struct PageReport {
    pub page: usize,
    pub outcome: Result<PageTable, PageError>,
}

impl PageReport {
    /// The page's table; `None` means no table was detected
    pub fn table(&self) -> Option<&Table> {
        self.outcome.as_ref().ok().map(|p| &p.table)
    }
}

/// Table reconstruction entry point, holding the run's configuration
#[derive(Debug, Clone)]
pub struct TableExtractor {
    config: Arc<CompiledConfig>,
}

impl TableExtractor {
    /// Validate and compile `config` for a run
    pub fn new(config: &LayoutConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_compiled(config.compile()?))
    }

    pub fn from_compiled(config: CompiledConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config.layout
    }

    /// Header and anchor detection, table body selection and column
    /// inference for one page
    pub fn analyze_page(&self, page: &Page) -> PageAnalysis {
        let layout = &self.config.layout;
        let spans = &page.spans;

        // Only headers that can govern a column are reported
        let headers = well_separated(&detect_headers(spans, &self.config));
        let anchors = detect_anchors(spans, &layout.locale);

        let visible: Vec<usize> = (0..spans.len())
            .filter(|&i| !spans[i].text.trim().is_empty())
            .collect();
        let tolerance = row_tolerance(
            visible.iter().map(|&i| &spans[i]),
            layout.row_tolerance_factor,
        );

        let header_line = headers.iter().map(|h| h.anchor_y).reduce(f32::min);
        let body: Vec<usize> = visible
            .into_iter()
            .filter(|&i| {
                if headers.iter().any(|h| h.span == i) {
                    return false;
                }
                let y = spans[i].bbox.y_center();
                let in_header_band = headers.iter().any(|h| (y - h.anchor_y).abs() <= tolerance);
                let above_header =
                    layout.skip_above_header && header_line.map_or(false, |line| y < line);
                !in_header_band && !above_header
            })
            .collect();

        let mut in_body = vec![false; spans.len()];
        for &i in &body {
            in_body[i] = true;
        }
        let body_anchors: Vec<&AnchorValue> =
            anchors.values.iter().filter(|a| in_body[a.span]).collect();

        let columns = infer_columns(page.width, &headers, &body_anchors, spans, layout);

        log::debug!(
            "page {}: {} headers, {} anchors ({} in body), {} body spans",
            page.index,
            headers.len(),
            anchors.values.len(),
            body_anchors.len(),
            body.len()
        );

        PageAnalysis {
            page: page.index,
            headers,
            anchors,
            body,
            row_tolerance: tolerance,
            columns,
        }
    }

    /// Run the full pipeline on one page
    pub fn extract_page(&self, page: &Page) -> Result<PageTable, PageError> {
        let analysis = self.analyze_page(page);
        self.finish_page(page, analysis, None)
    }

    /// Run every page in parallel. Reports are in page order.
    pub fn extract_document(&self, pages: &[Page]) -> Vec<PageReport> {
        let never = AtomicBool::new(false);
        self.extract_document_with_cancel(pages, &never)
    }

    /// Like [`extract_document`](Self::extract_document), but pages observe
    /// `cancel`: once it is set, unfinished pages report
    /// [`LayoutError::Cancelled`] and their partial results are discarded.
    pub fn extract_document_with_cancel(
        &self,
        pages: &[Page],
        cancel: &AtomicBool,
    ) -> Vec<PageReport> {
        let analyses: Vec<Option<PageAnalysis>> = pages
            .par_iter()
            .map(|page| (!cancel.load(Ordering::Relaxed)).then(|| self.analyze_page(page)))
            .collect();

        // Columns of the first page that has headers, for pages without any
        let template: Option<Vec<Column>> = if self.config.layout.inherit_columns {
            analyses
                .iter()
                .flatten()
                .filter(|a| !a.headers.is_empty())
                .find_map(|a| a.columns.as_ref().ok().cloned())
        } else {
            None
        };

        analyses
            .into_par_iter()
            .zip(pages.par_iter())
            .map(|(analysis, page)| {
                let outcome = match analysis {
                    Some(analysis) if !cancel.load(Ordering::Relaxed) => {
                        let inherited = if analysis.headers.is_empty() {
                            template.clone()
                        } else {
                            None
                        };
                        let result = self.finish_page(page, analysis, inherited);
                        if cancel.load(Ordering::Relaxed) {
                            Err(cancelled(page.index, Stage::AssignCells))
                        } else {
                            result
                        }
                    }
                    Some(_) => Err(cancelled(page.index, Stage::GroupRows)),
                    None => Err(cancelled(page.index, Stage::DetectHeaders)),
                };

                if let Err(e) = &outcome {
                    match e.kind {
                        LayoutError::NoHeadersAndNoAnchors => {
                            log::debug!("page {}: no table detected", page.index)
                        }
                        _ => log::warn!("{}", e),
                    }
                }

                PageReport {
                    page: page.index,
                    outcome,
                }
            })
            .collect()
    }

    /// Row grouping and cell assignment over analysed columns
    fn finish_page(
        &self,
        page: &Page,
        analysis: PageAnalysis,
        inherited: Option<Vec<Column>>,
    ) -> Result<PageTable, PageError> {
        let layout = &self.config.layout;
        let inherited_columns = inherited.is_some();

        let columns = match (inherited, &analysis.columns) {
            (Some(columns), _) => columns,
            (None, Ok(columns)) => columns.clone(),
            (None, Err(kind)) => {
                return Err(PageError {
                    page: page.index,
                    stage: Stage::InferColumns,
                    kind: kind.clone(),
                    snapshot: analysis.snapshot(page.spans.len()),
                })
            }
        };

        log::debug!(
            "page {}: columns {}",
            page.index,
            columns
                .iter()
                .map(|c| format!("{}[{:.1},{:.1})", c.id, c.left, c.right))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let rows = group_rows(&page.spans, &analysis.body, analysis.row_tolerance);

        let options = AssignOptions {
            trim_trailing_rows: layout.trim_trailing_rows,
            merge_continuation_rows: layout.merge_continuation_rows,
        };
        let assignment = assign_cells(
            &page.spans,
            &rows,
            &columns,
            &analysis.anchors,
            &layout.locale,
            options,
        );

        log::debug!(
            "page {}: {} rows, {} unassigned, {} trimmed, {} merged",
            page.index,
            assignment.table.rows.len(),
            assignment.unassigned.len(),
            assignment.trimmed.len(),
            assignment.merged_rows
        );

        Ok(PageTable {
            page: page.index,
            headers: analysis.headers,
            columns,
            rows,
            table: assignment.table,
            unassigned: assignment.unassigned,
            trimmed: assignment.trimmed,
            merged_rows: assignment.merged_rows,
            rejected_anchors: analysis.anchors.rejections,
            inherited_columns,
        })
    }
}

fn cancelled(page: usize, stage: Stage) -> PageError {
    PageError {
        page,
        stage,
        kind: LayoutError::Cancelled,
        snapshot: String::new(),
    }
}
