//! Positioned text fragments and the page-level geometry helpers shared by
//! every stage.
//!
//! Coordinates are in page space with y increasing downward.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Axis-aligned rectangle `(x0, y0, x1, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Build a box, reordering the corners so that `x0 <= x1` and `y0 <= y1`
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn x_center(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn y_center(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }
}

/// One text fragment as produced by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// The text content (never empty for spans the pipeline considers)
    pub text: String,
    /// Bounding box in page space
    pub bbox: BBox,
    /// Font name
    pub font: String,
    /// Font size in points
    pub size: f32,
    /// Fill colour packed as 0xRRGGBB
    pub color: u32,
}

impl Span {
    pub fn new(
        text: impl Into<String>,
        bbox: BBox,
        font: impl Into<String>,
        size: f32,
        color: u32,
    ) -> Self {
        Self {
            text: text.into(),
            bbox,
            font: font.into(),
            size,
            color,
        }
    }

    /// Split the packed colour into its RGB components
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.color >> 16) & 0xFF) as u8,
            ((self.color >> 8) & 0xFF) as u8,
            (self.color & 0xFF) as u8,
        )
    }
}

/// All spans of one page, in extraction order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page index (0-based)
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub spans: Vec<Span>,
}

impl Page {
    pub fn new(index: usize, width: f32, height: f32, spans: Vec<Span>) -> Self {
        Self {
            index,
            width,
            height,
            spans,
        }
    }
}

/// Total order on floats for sort keys. NaN sorts last.
pub(crate) fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

/// Case- and accent-insensitive form of a string: NFD, combining marks
/// removed, lowercased, inner whitespace collapsed.
pub fn fold_text(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Most common font size among the given spans, bucketed to 0.1pt.
/// Falls back to 12pt when there is nothing to measure.
pub fn dominant_font_size<'a, I>(spans: I) -> f32
where
    I: IntoIterator<Item = &'a Span>,
{
    let mut size_counts: HashMap<i32, usize> = HashMap::new();

    for span in spans {
        if span.size > 0.0 {
            let size_key = (span.size * 10.0).round() as i32;
            *size_counts.entry(size_key).or_insert(0) += 1;
        }
    }

    // Ties go to the larger size so the result does not depend on map order
    size_counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)))
        .map(|(size, _)| *size as f32 / 10.0)
        .unwrap_or(12.0)
}

/// Horizontal content extent `(left, right)` of a set of spans
pub fn content_extent<'a, I>(spans: I) -> Option<(f32, f32)>
where
    I: IntoIterator<Item = &'a Span>,
{
    spans.into_iter().fold(None, |acc, span| match acc {
        None => Some((span.bbox.x0, span.bbox.x1)),
        Some((l, r)) => Some((l.min(span.bbox.x0), r.max(span.bbox.x1))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, size: f32) -> Span {
        Span::new(text, BBox::new(0.0, 0.0, 10.0, size), "F1", size, 0)
    }

    #[test]
    fn test_bbox_normalizes_corners() {
        let b = BBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(b.x0, 0.0);
        assert_eq!(b.x1, 10.0);
        assert_eq!(b.y0, 5.0);
        assert_eq!(b.y1, 20.0);
        assert_eq!(b.x_center(), 5.0);
        assert_eq!(b.y_center(), 12.5);
    }

    #[test]
    fn test_fold_text() {
        assert_eq!(fold_text("Opération"), "operation");
        assert_eq!(fold_text("  DÉBIT "), "debit");
        assert_eq!(fold_text("Date   de\tValeur"), "date de valeur");
        assert_eq!(fold_text("Crédit"), fold_text("CREDIT"));
    }

    #[test]
    fn test_rgb() {
        let mut s = span("x", 10.0);
        s.color = 0x12_34_56;
        assert_eq!(s.rgb(), (0x12, 0x34, 0x56));
    }

    #[test]
    fn test_dominant_font_size() {
        let spans = vec![span("a", 9.0), span("b", 9.0), span("c", 14.0)];
        assert_eq!(dominant_font_size(&spans), 9.0);
        assert_eq!(dominant_font_size(&Vec::<Span>::new()), 12.0);
    }

    #[test]
    fn test_content_extent() {
        let mut a = span("a", 10.0);
        a.bbox = BBox::new(30.0, 0.0, 60.0, 10.0);
        let mut b = span("b", 10.0);
        b.bbox = BBox::new(5.0, 0.0, 20.0, 10.0);
        assert_eq!(content_extent(&[a, b]), Some((5.0, 60.0)));
        assert_eq!(content_extent(&Vec::<Span>::new()), None);
    }
}
