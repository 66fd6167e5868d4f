//! Header detection
//!
//! Scans a page's spans for the configured header keywords. Every keyword
//! yields at most one `Header` per page.

use crate::config::CompiledConfig;
use crate::span::{cmp_f32, fold_text, BBox, Span};
use regex::Regex;
use serde::Serialize;

/// Keyword recogniser. `text` is already folded (see [`fold_text`]).
pub trait TextMatcher: Send + Sync {
    fn is_match(&self, text: &str) -> bool;
}

/// Whole-text equality
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    needle: String,
}

impl ExactMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            needle: fold_text(pattern),
        }
    }
}

impl TextMatcher for ExactMatcher {
    fn is_match(&self, text: &str) -> bool {
        text == self.needle
    }
}

/// Keyword contained anywhere in the text
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    needle: String,
}

impl SubstringMatcher {
    pub fn new(pattern: &str) -> Self {
        Self {
            needle: fold_text(pattern),
        }
    }
}

impl TextMatcher for SubstringMatcher {
    fn is_match(&self, text: &str) -> bool {
        !self.needle.is_empty() && text.contains(&self.needle)
    }
}

/// Regular expression, matched case-insensitively
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    re: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(&format!("(?i){}", pattern))?,
        })
    }
}

impl TextMatcher for RegexMatcher {
    fn is_match(&self, text: &str) -> bool {
        self.re.is_match(text)
    }
}

/// A located header keyword
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    /// Configured keyword, used as the column id
    pub keyword: String,
    /// Index of the matched span within the page
    pub span: usize,
    /// Horizontal center of the matched span
    pub anchor_x: f32,
    /// Vertical center of the matched span
    pub anchor_y: f32,
    pub bbox: BBox,
}

/// Find the headers of one page.
///
/// When a keyword matches several spans the topmost wins, then the leftmost,
/// then the earliest in extraction order. A span is claimed by at most one
/// keyword (the first vocabulary entry that matches it). Result is sorted
/// left to right.
pub fn detect_headers(spans: &[Span], config: &CompiledConfig) -> Vec<Header> {
    let folded: Vec<String> = spans.iter().map(|s| fold_text(&s.text)).collect();
    let mut claimed = vec![false; spans.len()];
    let mut headers = Vec::new();

    for entry in &config.vocabulary {
        let best = spans
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed[*idx] && !folded[*idx].is_empty())
            .filter(|(idx, _)| entry.matcher.is_match(&folded[*idx]))
            .min_by(|(ia, a), (ib, b)| {
                cmp_f32(a.bbox.y0, b.bbox.y0)
                    .then(cmp_f32(a.bbox.x0, b.bbox.x0))
                    .then(ia.cmp(ib))
            });

        if let Some((idx, span)) = best {
            claimed[idx] = true;
            log::trace!(
                "header '{}' matched {:?} at x={:.1} y={:.1}",
                entry.keyword,
                span.text,
                span.bbox.x_center(),
                span.bbox.y_center()
            );
            headers.push(Header {
                keyword: entry.keyword.clone(),
                span: idx,
                anchor_x: span.bbox.x_center(),
                anchor_y: span.bbox.y_center(),
                bbox: span.bbox,
            });
        }
    }

    headers.sort_by(|a, b| cmp_f32(a.anchor_x, b.anchor_x).then(a.span.cmp(&b.span)));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderRule, LayoutConfig};

    fn make_span(text: &str, x: f32, y: f32) -> Span {
        let width = text.chars().count() as f32 * 5.0;
        Span::new(text, BBox::new(x, y, x + width, y + 10.0), "F1", 10.0, 0)
    }

    fn compiled(rules: Vec<HeaderRule>) -> CompiledConfig {
        LayoutConfig {
            header_vocabulary: rules,
            ..Default::default()
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_matchers() {
        assert!(ExactMatcher::new("Débit").is_match("debit"));
        assert!(!ExactMatcher::new("Débit").is_match("debit total"));
        assert!(SubstringMatcher::new("Crédit").is_match("total credit"));
        assert!(RegexMatcher::new(r"^date( de valeur)?$")
            .unwrap()
            .is_match("date de valeur"));
    }

    #[test]
    fn test_detect_default_vocabulary_accent_insensitive() {
        let config = LayoutConfig::default().compile().unwrap();
        let spans = vec![
            make_span("DATE", 10.0, 100.0),
            make_span("Operation", 80.0, 100.0),
            make_span("debit", 300.0, 100.0),
            make_span("CRÉDIT", 380.0, 100.0),
            make_span("Relevé de compte", 10.0, 20.0),
        ];
        let headers = detect_headers(&spans, &config);
        let keywords: Vec<&str> = headers.iter().map(|h| h.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["Date", "Opération", "Débit", "Crédit"]);
        assert_eq!(headers[0].span, 0);
        assert_eq!(headers[0].anchor_x, 20.0);
        assert_eq!(headers[0].anchor_y, 105.0);
    }

    #[test]
    fn test_duplicate_match_prefers_topmost_then_leftmost() {
        let config = compiled(vec![HeaderRule::exact("Date")]);
        let spans = vec![
            make_span("Date", 200.0, 300.0),
            make_span("Date", 150.0, 100.0),
            make_span("Date", 50.0, 100.0),
        ];
        let headers = detect_headers(&spans, &config);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].span, 2);
    }

    #[test]
    fn test_span_claimed_once() {
        // "Date de Valeur" must not be taken by a substring "Date" rule too
        let config = compiled(vec![
            HeaderRule::exact("Date de Valeur"),
            HeaderRule::substring("Date"),
        ]);
        let spans = vec![
            make_span("Date de valeur", 100.0, 50.0),
            make_span("Date", 10.0, 50.0),
        ];
        let headers = detect_headers(&spans, &config);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].keyword, "Date");
        assert_eq!(headers[0].span, 1);
        assert_eq!(headers[1].keyword, "Date de Valeur");
    }

    #[test]
    fn test_no_headers_is_not_an_error() {
        let config = LayoutConfig::default().compile().unwrap();
        let spans = vec![make_span("12/01", 10.0, 10.0), make_span("45,50", 100.0, 10.0)];
        assert!(detect_headers(&spans, &config).is_empty());
    }
}
