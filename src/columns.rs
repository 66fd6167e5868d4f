//! Column inference
//!
//! Turns located headers and anchor values into an ordered list of
//! non-overlapping horizontal bands. Header centers seed columns whose
//! boundaries are the midpoints between neighbours; clusters of anchor values
//! that no header sits over become synthetic columns.

use crate::anchors::AnchorValue;
use crate::config::LayoutConfig;
use crate::headers::Header;
use crate::span::{cmp_f32, content_extent, Span};
use crate::LayoutError;
use serde::Serialize;

/// Headers closer than this (in points) cannot both govern a column
const MIN_HEADER_GAP: f32 = 1.0;

/// Padding added past the rightmost content so the half-open range includes it
const EDGE_PAD: f32 = 1.0;

/// What a column's identity comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSource {
    /// A header keyword; `span` is the header span index
    Header { span: usize },
    /// A cluster of anchor values; `members` are their span indices
    Anchor { members: Vec<usize> },
}

/// An inferred vertical band `[left, right)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub id: String,
    pub left: f32,
    pub right: f32,
    pub source: ColumnSource,
}

impl Column {
    pub fn contains(&self, x: f32) -> bool {
        self.left <= x && x < self.right
    }

    pub fn is_anchor_governed(&self) -> bool {
        matches!(self.source, ColumnSource::Anchor { .. })
    }
}

/// Anchors whose x-positions chain together within the cluster tolerance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorCluster {
    /// Span indices, ordered by position
    pub members: Vec<usize>,
    /// Mean x-position of the members
    pub position: f32,
    /// Member extent expanded by the tolerance
    pub left: f32,
    pub right: f32,
}

/// Group anchors into clusters of at least `config.min_anchor_cluster_size`.
///
/// Neighbouring anchors (sorted by x-position, then span order) closer than
/// `config.anchor_cluster_tolerance` belong to the same cluster.
pub fn cluster_anchors(anchors: &[&AnchorValue], config: &LayoutConfig) -> Vec<AnchorCluster> {
    let tolerance = config.anchor_cluster_tolerance;
    let mut sorted: Vec<(f32, &AnchorValue)> = anchors
        .iter()
        .map(|a| (a.x_position(config.anchor_alignment), *a))
        .collect();
    sorted.sort_by(|a, b| cmp_f32(a.0, b.0).then(a.1.span.cmp(&b.1.span)));

    let mut groups: Vec<Vec<(f32, &AnchorValue)>> = Vec::new();
    for entry in sorted {
        let chained = groups
            .last()
            .and_then(|group| group.last())
            .map_or(false, |last| entry.0 - last.0 <= tolerance);
        match groups.last_mut() {
            Some(group) if chained => group.push(entry),
            _ => groups.push(vec![entry]),
        }
    }

    groups
        .into_iter()
        .filter(|g| g.len() >= config.min_anchor_cluster_size)
        .map(|group| {
            let position = group.iter().map(|(x, _)| *x).sum::<f32>() / group.len() as f32;
            let left = group
                .iter()
                .map(|(_, a)| a.bbox.x0)
                .fold(f32::INFINITY, f32::min);
            let right = group
                .iter()
                .map(|(_, a)| a.bbox.x1)
                .fold(f32::NEG_INFINITY, f32::max);
            AnchorCluster {
                members: group.iter().map(|(_, a)| a.span).collect(),
                position,
                left: left - tolerance,
                right: right + tolerance,
            }
        })
        .collect()
}

/// A column seed, ordered left to right by `position`
enum Signal<'a> {
    Header(&'a Header),
    Cluster(AnchorCluster),
}

impl Signal<'_> {
    fn position(&self) -> f32 {
        match self {
            Signal::Header(h) => h.anchor_x,
            Signal::Cluster(c) => c.position,
        }
    }

    fn order_key(&self) -> usize {
        match self {
            Signal::Header(h) => h.span,
            Signal::Cluster(c) => c.members.first().copied().unwrap_or(usize::MAX),
        }
    }
}

/// Infer the columns of a page.
///
/// `spans` are all spans of the page and only bound the content margins;
/// `anchors` should be the anchors of the table body.
pub fn infer_columns(
    page_width: f32,
    headers: &[Header],
    anchors: &[&AnchorValue],
    spans: &[Span],
    config: &LayoutConfig,
) -> Result<Vec<Column>, LayoutError> {
    let headers = well_separated(headers);
    let clusters = cluster_anchors(anchors, config);

    if headers.is_empty() && clusters.is_empty() {
        return Err(LayoutError::NoHeadersAndNoAnchors);
    }

    // A cluster with a header over it is governed by that header
    let mut signals: Vec<Signal> = headers.iter().map(|h| Signal::Header(h)).collect();
    for cluster in clusters {
        let covered = headers
            .iter()
            .any(|h| cluster.left <= h.anchor_x && h.anchor_x <= cluster.right);
        if covered {
            log::trace!("anchor cluster at x={:.1} is under a header", cluster.position);
        } else {
            signals.push(Signal::Cluster(cluster));
        }
    }
    signals.sort_by(|a, b| {
        cmp_f32(a.position(), b.position()).then(a.order_key().cmp(&b.order_key()))
    });

    let boundaries: Vec<f32> = signals
        .windows(2)
        .map(|pair| boundary_between(&pair[0], &pair[1]))
        .collect();

    let (left_margin, right_margin) = if headers.is_empty() {
        // Anchor-only pages keep each cluster's own extent
        (f32::NAN, f32::NAN)
    } else {
        let (content_left, content_right) =
            content_extent(spans).unwrap_or((0.0, page_width.max(0.0)));
        let first = signal_left(&signals[0]);
        let last = signal_right(&signals[signals.len() - 1]);
        let mut right = content_right.max(last) + EDGE_PAD;
        if page_width > last {
            right = right.min(page_width);
        }
        (content_left.min(first), right)
    };

    let count = signals.len();
    let mut columns = Vec::with_capacity(count);
    for (i, signal) in signals.into_iter().enumerate() {
        let mut left = if i == 0 {
            left_margin
        } else {
            boundaries[i - 1]
        };
        let mut right = if i + 1 == count {
            right_margin
        } else {
            boundaries[i]
        };

        let (id, source) = match signal {
            Signal::Header(h) => (h.keyword.clone(), ColumnSource::Header { span: h.span }),
            Signal::Cluster(c) => {
                // Anchor-only pages end at the outer clusters' own extent
                if headers.is_empty() {
                    if i == 0 {
                        left = c.left;
                    }
                    if i + 1 == count {
                        right = c.right;
                    }
                }
                (
                    format!("Column_{}", i + 1),
                    ColumnSource::Anchor { members: c.members },
                )
            }
        };

        columns.push(Column {
            id,
            left,
            right,
            source,
        });
    }

    check_columns(&columns)?;
    Ok(columns)
}

/// Drop headers sitting on top of an already kept header.
/// Keeps the leftmost, then topmost.
pub(crate) fn well_separated(headers: &[Header]) -> Vec<Header> {
    let mut sorted: Vec<&Header> = headers.iter().collect();
    sorted.sort_by(|a, b| {
        cmp_f32(a.anchor_x, b.anchor_x)
            .then(cmp_f32(a.anchor_y, b.anchor_y))
            .then(a.span.cmp(&b.span))
    });

    let mut kept: Vec<Header> = Vec::with_capacity(sorted.len());
    for header in sorted {
        if let Some(prev) = kept.last() {
            if header.anchor_x - prev.anchor_x < MIN_HEADER_GAP {
                log::warn!(
                    "dropping header '{}': centered on header '{}'",
                    header.keyword,
                    prev.keyword
                );
                continue;
            }
        }
        kept.push(header.clone());
    }
    kept
}

fn signal_left(signal: &Signal) -> f32 {
    match signal {
        Signal::Header(h) => h.bbox.x0.min(h.anchor_x),
        Signal::Cluster(c) => c.left,
    }
}

fn signal_right(signal: &Signal) -> f32 {
    match signal {
        Signal::Header(h) => h.bbox.x1.max(h.anchor_x),
        Signal::Cluster(c) => c.right,
    }
}

/// Boundary between two neighbouring signals. Always strictly between their
/// positions, which are strictly increasing.
fn boundary_between(a: &Signal, b: &Signal) -> f32 {
    let raw = match (a, b) {
        (Signal::Header(x), Signal::Header(y)) => (x.anchor_x + y.anchor_x) / 2.0,
        (Signal::Header(_), Signal::Cluster(c)) => c.left,
        (Signal::Cluster(c), Signal::Header(_)) => c.right,
        (Signal::Cluster(c1), Signal::Cluster(c2)) => (c1.right + c2.left) / 2.0,
    };

    let (lo, hi) = (a.position(), b.position());
    if raw > lo && raw < hi {
        raw
    } else {
        (lo + hi) / 2.0
    }
}

/// Every column must be non-empty and strictly left of the next one
fn check_columns(columns: &[Column]) -> Result<(), LayoutError> {
    for column in columns {
        if !(column.left < column.right) {
            return Err(LayoutError::OverlappingColumns {
                left: column.id.clone(),
                right: column.id.clone(),
            });
        }
    }
    for pair in columns.windows(2) {
        if pair[0].right > pair[1].left {
            return Err(LayoutError::OverlappingColumns {
                left: pair[0].id.clone(),
                right: pair[1].id.clone(),
            });
        }
    }
    Ok(())
}
