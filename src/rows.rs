//! Row grouping by vertical proximity
//!
//! Rows are built without looking at columns: spans are visited top to
//! bottom and join the current row while their y-center stays within the
//! tolerance of the row's running centroid.

use crate::span::{cmp_f32, dominant_font_size, Span};
use serde::Serialize;

/// A horizontal cluster of body spans
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// Mean y-center of the members
    pub y_center: f32,
    /// Span indices, left to right
    pub members: Vec<usize>,
}

/// Vertical clustering tolerance for a page: `factor` times the dominant
/// font size of the given spans, since row pitch scales with text size.
pub fn row_tolerance<'a, I>(spans: I, factor: f32) -> f32
where
    I: IntoIterator<Item = &'a Span>,
{
    dominant_font_size(spans) * factor
}

/// Group the spans listed in `body` (indices into `spans`) into rows,
/// ordered top to bottom. Each body span lands in exactly one row.
///
/// Wrapped continuation lines further than `tolerance` from the row above
/// are left as rows of their own.
pub fn group_rows(spans: &[Span], body: &[usize], tolerance: f32) -> Vec<Row> {
    let mut order: Vec<usize> = body.to_vec();
    order.sort_by(|&a, &b| {
        cmp_f32(spans[a].bbox.y0, spans[b].bbox.y0)
            .then(cmp_f32(spans[a].bbox.x0, spans[b].bbox.x0))
            .then(a.cmp(&b))
    });

    let mut rows: Vec<Row> = Vec::new();
    let mut center_sum = 0.0f32;

    for idx in order {
        let y = spans[idx].bbox.y_center();
        let joins = rows
            .last()
            .map_or(false, |row| (y - row.y_center).abs() <= tolerance);

        if joins {
            if let Some(row) = rows.last_mut() {
                row.members.push(idx);
                center_sum += y;
                row.y_center = center_sum / row.members.len() as f32;
            }
        } else {
            center_sum = y;
            rows.push(Row {
                y_center: y,
                members: vec![idx],
            });
        }
    }

    for row in &mut rows {
        row.members.sort_by(|&a, &b| {
            cmp_f32(spans[a].bbox.x0, spans[b].bbox.x0).then(a.cmp(&b))
        });
    }

    log::trace!("grouped {} spans into {} rows", body.len(), rows.len());
    rows
}
