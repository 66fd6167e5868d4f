//! Table reconstruction from positioned PDF text
//!
//! This crate provides:
//! - Span extraction from text-based PDFs (position, font, size, colour)
//! - Header keyword detection and monetary anchor value detection
//! - Column inference, row grouping and cell assignment into per-page tables
//! - JSON, CSV and markdown renderings of the tables

pub mod anchors;
pub mod cells;
pub mod columns;
pub mod config;
pub mod extractor;
pub mod headers;
pub mod pipeline;
pub mod render;
pub mod rows;
pub mod span;

pub use anchors::{parse_amount, AmountParse, AnchorValue};
pub use cells::{Cell, Table, TableColumn, TableRow};
pub use columns::Column;
pub use config::{ConfigError, HeaderRule, LayoutConfig, Locale, MatchRule};
pub use extractor::{extract_pages, extract_pages_mem};
pub use pipeline::{PageError, PageReport, PageTable, Stage, TableExtractor};
pub use span::{BBox, Page, Span};

use std::path::Path;

/// Tables of a whole document
#[derive(Debug)]
pub struct DocumentResult {
    /// One report per page, in page order
    pub pages: Vec<PageReport>,
    /// Page count
    pub page_count: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl DocumentResult {
    /// Pages that produced a non-empty table
    pub fn tables(&self) -> impl Iterator<Item = (usize, &Table)> + '_ {
        self.pages
            .iter()
            .filter_map(|r| r.table().map(|t| (r.page, t)))
            .filter(|(_, t)| !t.is_empty())
    }
}

/// Extract spans from a PDF file and reconstruct the table of every page
pub fn process_pdf<P: AsRef<Path>>(
    path: P,
    extractor: &TableExtractor,
) -> Result<DocumentResult, PdfError> {
    let start = std::time::Instant::now();
    let pages = extract_pages(&path)?;
    Ok(run_pages(&pages, extractor, start))
}

/// Process PDF from memory buffer
pub fn process_pdf_mem(
    buffer: &[u8],
    extractor: &TableExtractor,
) -> Result<DocumentResult, PdfError> {
    let start = std::time::Instant::now();
    let pages = extract_pages_mem(buffer)?;
    Ok(run_pages(&pages, extractor, start))
}

fn run_pages(
    pages: &[Page],
    extractor: &TableExtractor,
    start: std::time::Instant,
) -> DocumentResult {
    let reports = extractor.extract_document(pages);
    DocumentResult {
        pages: reports,
        page_count: pages.len(),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}

/// Per-page layout failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    /// Neither a header nor an anchor cluster was found; the page has no table
    #[error("no header keywords and no anchor value clusters")]
    NoHeadersAndNoAnchors,
    /// Column inference produced overlapping ranges. Indicates a bug.
    #[error("columns '{left}' and '{right}' overlap")]
    OverlappingColumns { left: String, right: String },
    #[error("processing cancelled")]
    Cancelled,
}
