//! Anchor value detection
//!
//! Recognises monetary/numeric tokens such as `1.234,56 €` or `-45.50`
//! using the configured locale. Detection is permissive: every plausible
//! number becomes an anchor and column inference narrows them down by
//! geometry. Parsing fails closed: numeric-looking text with an inconsistent
//! separator pattern is rejected and reported, never guessed.

use crate::config::{AnchorAlignment, Locale};
use crate::span::{BBox, Span};
use serde::Serialize;

/// Punctuation that can appear inside a number in some locale. Text made of
/// digits and these characters "looks numeric"; if it then fails the active
/// locale's grammar it is reported as ambiguous.
const NUMERIC_PUNCTUATION: &[char] = &['.', ',', ' ', '\u{a0}', '\u{202f}', '\''];

/// A span recognised as a number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorValue {
    /// Index of the span within the page
    pub span: usize,
    /// Parsed, signed magnitude
    pub value: f64,
    /// Original text, kept for output fidelity
    pub raw_text: String,
    /// Digits after the decimal separator in `raw_text`
    pub fraction_digits: usize,
    pub bbox: BBox,
}

impl AnchorValue {
    /// Horizontal position used for clustering
    pub fn x_position(&self, alignment: AnchorAlignment) -> f32 {
        match alignment {
            AnchorAlignment::Left => self.bbox.x0,
            AnchorAlignment::Center => self.bbox.x_center(),
            AnchorAlignment::Right => self.bbox.x1,
        }
    }

    /// Render the value back in `locale` form
    pub fn format(&self, locale: &Locale) -> String {
        format_amount(self.value, self.fraction_digits, locale)
    }
}

/// Why numeric-looking text was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Punctuation that is neither the decimal nor the thousands separator
    UnknownSeparator,
    MultipleDecimalSeparators,
    /// Decimal separator with no digits after it
    EmptyFraction,
    /// Grouping separator after the decimal separator
    SeparatorInFraction,
    /// Nothing before the decimal separator
    MissingIntegerPart,
    /// Too many digits for a finite value
    OutOfRange,
    /// Digit groups not of the form d{1,3}(sep d{3})*
    MisplacedGrouping,
}

/// Numeric-looking span that failed the locale grammar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorRejection {
    pub span: usize,
    pub text: String,
    pub reason: RejectReason,
}

/// Successful parse of one token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedAmount {
    pub value: f64,
    pub fraction_digits: usize,
}

/// Outcome of classifying one piece of text
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountParse {
    Value(ParsedAmount),
    Ambiguous(RejectReason),
    NotNumeric,
}

/// Anchors and rejections of one page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnchorScan {
    pub values: Vec<AnchorValue>,
    pub rejections: Vec<AnchorRejection>,
}

impl AnchorScan {
    /// The anchor parsed from span `span`, if any
    pub fn for_span(&self, span: usize) -> Option<&AnchorValue> {
        self.values
            .binary_search_by_key(&span, |a| a.span)
            .ok()
            .map(|idx| &self.values[idx])
    }
}

/// Classify every span of a page. Results are in span order.
pub fn detect_anchors(spans: &[Span], locale: &Locale) -> AnchorScan {
    let mut scan = AnchorScan::default();

    for (idx, span) in spans.iter().enumerate() {
        match parse_amount(&span.text, locale) {
            AmountParse::Value(parsed) => scan.values.push(AnchorValue {
                span: idx,
                value: parsed.value,
                raw_text: span.text.clone(),
                fraction_digits: parsed.fraction_digits,
                bbox: span.bbox,
            }),
            AmountParse::Ambiguous(reason) => {
                log::debug!("rejected anchor {:?}: {:?}", span.text, reason);
                scan.rejections.push(AnchorRejection {
                    span: idx,
                    text: span.text.clone(),
                    reason,
                });
            }
            AmountParse::NotNumeric => {}
        }
    }

    scan
}

/// Parse `[sign] digits[thousands digits]*[decimal digits] [currency]`
pub fn parse_amount(text: &str, locale: &Locale) -> AmountParse {
    let mut body = strip_currency(text.trim(), &locale.currency_markers);

    let mut negative = false;
    if let Some(first) = body.chars().next() {
        if matches!(first, '+' | '-' | '\u{2212}') {
            negative = first != '+';
            body = body[first.len_utf8()..].trim_start();
        }
    }

    let looks_numeric = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| {
            c.is_ascii_digit()
                || NUMERIC_PUNCTUATION.contains(&c)
                || c == locale.decimal_separator
                || Some(c) == locale.thousands_separator
        });
    if !looks_numeric {
        return AmountParse::NotNumeric;
    }

    match parse_body(body, locale) {
        Ok(mut parsed) => {
            if negative {
                parsed.value = -parsed.value;
            }
            AmountParse::Value(parsed)
        }
        Err(reason) => AmountParse::Ambiguous(reason),
    }
}

fn strip_currency<'a>(text: &'a str, markers: &[String]) -> &'a str {
    // Longest marker first so "EUR" is not shadowed by a shorter one
    let mut markers: Vec<&String> = markers.iter().filter(|m| !m.is_empty()).collect();
    markers.sort_by_key(|m| std::cmp::Reverse(m.len()));

    for marker in markers {
        if text.len() >= marker.len() {
            let cut = text.len() - marker.len();
            if text.is_char_boundary(cut) && text[cut..].eq_ignore_ascii_case(marker) {
                return text[..cut].trim_end();
            }
        }
    }
    text
}

fn parse_body(body: &str, locale: &Locale) -> Result<ParsedAmount, RejectReason> {
    let decimal = locale.decimal_separator;
    let thousands = locale.thousands_separator;

    // A space separator also accepts the no-break variants
    let normalized: String;
    let body = if thousands == Some(' ') {
        normalized = body
            .chars()
            .map(|c| if matches!(c, '\u{a0}' | '\u{202f}') { ' ' } else { c })
            .collect();
        normalized.as_str()
    } else {
        body
    };

    if body
        .chars()
        .any(|c| !c.is_ascii_digit() && c != decimal && Some(c) != thousands)
    {
        return Err(RejectReason::UnknownSeparator);
    }

    let mut parts = body.split(decimal);
    let integer = parts.next().unwrap_or("");
    let fraction = parts.next();
    if parts.next().is_some() {
        return Err(RejectReason::MultipleDecimalSeparators);
    }

    if let Some(fraction) = fraction {
        if fraction.is_empty() {
            return Err(RejectReason::EmptyFraction);
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(RejectReason::SeparatorInFraction);
        }
    }
    if integer.is_empty() {
        return Err(RejectReason::MissingIntegerPart);
    }

    let digits: String = match thousands {
        Some(sep) if integer.contains(sep) => {
            let groups: Vec<&str> = integer.split(sep).collect();
            let well_formed = groups.iter().enumerate().all(|(i, group)| {
                let len = group.len();
                if i == 0 {
                    (1..=3).contains(&len)
                } else {
                    len == 3
                }
            });
            if !well_formed {
                return Err(RejectReason::MisplacedGrouping);
            }
            groups.concat()
        }
        _ => integer.to_string(),
    };

    let fraction = fraction.unwrap_or("");
    let literal = if fraction.is_empty() {
        digits
    } else {
        format!("{}.{}", digits, fraction)
    };
    let value: f64 = literal.parse().map_err(|_| RejectReason::OutOfRange)?;
    if !value.is_finite() {
        return Err(RejectReason::OutOfRange);
    }

    Ok(ParsedAmount {
        value,
        fraction_digits: fraction.len(),
    })
}

/// Render a magnitude with `fraction_digits` decimals in locale form,
/// e.g. `1234.5, 2` → `1.234,50` for a comma-decimal locale.
pub fn format_amount(value: f64, fraction_digits: usize, locale: &Locale) -> String {
    let fixed = format!("{:.*}", fraction_digits, value.abs());
    let (integer, fraction) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + integer.len() / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            if let Some(sep) = locale.thousands_separator {
                grouped.push(sep);
            }
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(fraction) = fraction {
        out.push(locale.decimal_separator);
        out.push_str(fraction);
    }
    out
}
