//! Run configuration: header vocabulary, number locale and clustering
//! tolerances.
//!
//! A `LayoutConfig` is plain data (loadable from JSON). Before a run it is
//! validated and compiled once into a `CompiledConfig`, which every page
//! reads but never mutates.

use crate::headers::{ExactMatcher, RegexMatcher, SubstringMatcher, TextMatcher};
use crate::span::fold_text;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// How a header keyword is recognised in span text.
///
/// Patterns are compared against the folded text (lowercase, no accents).
/// An omitted pattern means "the keyword itself".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
    Exact {
        #[serde(default)]
        pattern: Option<String>,
    },
    Substring {
        #[serde(default)]
        pattern: Option<String>,
    },
    Regex {
        pattern: String,
    },
}

/// One entry of the header vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    /// Column id given to the header, e.g. "Débit"
    pub keyword: String,
    #[serde(default = "default_rule")]
    pub rule: MatchRule,
}

fn default_rule() -> MatchRule {
    MatchRule::Exact { pattern: None }
}

impl HeaderRule {
    pub fn exact(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            rule: MatchRule::Exact { pattern: None },
        }
    }

    pub fn substring(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            rule: MatchRule::Substring { pattern: None },
        }
    }

    pub fn regex(keyword: &str, pattern: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            rule: MatchRule::Regex {
                pattern: pattern.to_string(),
            },
        }
    }
}

/// Number formatting conventions for anchor values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub decimal_separator: char,
    /// `None` disables digit grouping entirely
    pub thousands_separator: Option<char>,
    /// Trailing markers such as "€" or "EUR", matched case-insensitively
    pub currency_markers: Vec<String>,
}

impl Locale {
    /// `1.234,56 €`
    pub fn comma_decimal() -> Self {
        Self {
            decimal_separator: ',',
            thousands_separator: Some('.'),
            currency_markers: vec!["€".to_string(), "EUR".to_string()],
        }
    }

    /// `1,234.56 $`
    pub fn dot_decimal() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: Some(','),
            currency_markers: vec!["$".to_string(), "USD".to_string()],
        }
    }

    /// Render a magnitude in this locale, e.g. `1.234,56`
    pub fn format(&self, value: f64, fraction_digits: usize) -> String {
        crate::anchors::format_amount(value, fraction_digits, self)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::comma_decimal()
    }
}

/// Which horizontal position of an anchor span is used for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorAlignment {
    Left,
    Center,
    Right,
}

/// Options for table reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Header keywords and their matchers
    pub header_vocabulary: Vec<HeaderRule>,
    /// Number format used by the anchor detector
    pub locale: Locale,
    /// Row tolerance = factor * dominant font size
    pub row_tolerance_factor: f32,
    /// Minimum anchors needed to synthesize a column
    pub min_anchor_cluster_size: usize,
    /// Maximum horizontal distance between neighbouring anchors of a cluster
    pub anchor_cluster_tolerance: f32,
    /// Edge used as an anchor's x-position
    pub anchor_alignment: AnchorAlignment,
    /// Treat spans above the header line as page furniture
    pub skip_above_header: bool,
    /// Drop rows after the last row holding an anchor value
    pub trim_trailing_rows: bool,
    /// Fold wrapped text lines into the row above
    pub merge_continuation_rows: bool,
    /// Document mode: pages without headers reuse the first header page's columns
    pub inherit_columns: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            header_vocabulary: vec![
                HeaderRule::exact("Date"),
                HeaderRule::exact("Date de Valeur"),
                HeaderRule::exact("Opération"),
                HeaderRule::exact("Débit"),
                HeaderRule::exact("Crédit"),
            ],
            locale: Locale::default(),
            row_tolerance_factor: 0.5,
            min_anchor_cluster_size: 3,
            anchor_cluster_tolerance: 10.0,
            anchor_alignment: AnchorAlignment::Right,
            skip_above_header: true,
            trim_trailing_rows: true,
            merge_continuation_rows: false,
            inherit_columns: false,
        }
    }
}

impl LayoutConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate the options and compile the header matchers
    pub fn compile(&self) -> Result<CompiledConfig, ConfigError> {
        self.validate()?;

        let mut vocabulary = Vec::with_capacity(self.header_vocabulary.len());
        for entry in &self.header_vocabulary {
            let matcher: Box<dyn TextMatcher> = match &entry.rule {
                MatchRule::Exact { pattern } => Box::new(ExactMatcher::new(
                    pattern.as_deref().unwrap_or(&entry.keyword),
                )),
                MatchRule::Substring { pattern } => Box::new(SubstringMatcher::new(
                    pattern.as_deref().unwrap_or(&entry.keyword),
                )),
                MatchRule::Regex { pattern } => Box::new(RegexMatcher::new(pattern).map_err(
                    |source| ConfigError::InvalidRegex {
                        keyword: entry.keyword.clone(),
                        source,
                    },
                )?),
            };
            vocabulary.push(CompiledHeader {
                keyword: entry.keyword.clone(),
                matcher,
            });
        }

        Ok(CompiledConfig {
            vocabulary,
            layout: self.clone(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.header_vocabulary {
            if entry.keyword.trim().is_empty() {
                return Err(ConfigError::Invalid("empty header keyword".into()));
            }
            if !seen.insert(fold_text(&entry.keyword)) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate header keyword '{}'",
                    entry.keyword
                )));
            }
        }

        if self.locale.thousands_separator == Some(self.locale.decimal_separator) {
            return Err(ConfigError::Invalid(
                "decimal and thousands separators must differ".into(),
            ));
        }
        if self.locale.decimal_separator.is_ascii_digit() {
            return Err(ConfigError::Invalid("decimal separator cannot be a digit".into()));
        }
        if !(self.row_tolerance_factor > 0.0) {
            return Err(ConfigError::Invalid(
                "row_tolerance_factor must be positive".into(),
            ));
        }
        if !(self.anchor_cluster_tolerance > 0.0) {
            return Err(ConfigError::Invalid(
                "anchor_cluster_tolerance must be positive".into(),
            ));
        }
        if self.min_anchor_cluster_size == 0 {
            return Err(ConfigError::Invalid(
                "min_anchor_cluster_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A vocabulary entry with its matcher built
pub struct CompiledHeader {
    pub keyword: String,
    pub matcher: Box<dyn TextMatcher>,
}

impl std::fmt::Debug for CompiledHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledHeader")
            .field("keyword", &self.keyword)
            .finish_non_exhaustive()
    }
}

/// Validated, read-only configuration shared by all pages of a run
#[derive(Debug)]
pub struct CompiledConfig {
    pub vocabulary: Vec<CompiledHeader>,
    pub layout: LayoutConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid regex for header '{keyword}': {source}")]
    InvalidRegex {
        keyword: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LayoutConfig::default();
        assert_eq!(config.header_vocabulary.len(), 5);
        assert_eq!(config.locale.decimal_separator, ',');
        assert_eq!(config.min_anchor_cluster_size, 3);
        assert!(config.trim_trailing_rows);
        assert!(!config.merge_continuation_rows);
        assert!(config.compile().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = LayoutConfig::from_json_str(
            r#"{
                "header_vocabulary": [
                    {"keyword": "Amount", "rule": {"kind": "regex", "pattern": "^amount( \\(eur\\))?$"}},
                    {"keyword": "Date"}
                ],
                "locale": {"decimal_separator": ".", "thousands_separator": ",", "currency_markers": ["$"]},
                "min_anchor_cluster_size": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.header_vocabulary.len(), 2);
        assert_eq!(
            config.header_vocabulary[1].rule,
            MatchRule::Exact { pattern: None }
        );
        assert_eq!(config.locale.decimal_separator, '.');
        assert_eq!(config.locale.currency_markers, vec!["$".to_string()]);
        assert_eq!(config.min_anchor_cluster_size, 2);
        assert_eq!(config.row_tolerance_factor, 0.5);

        let compiled = config.compile().unwrap();
        assert!(compiled.vocabulary[0].matcher.is_match("amount (eur)"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let config = LayoutConfig {
            header_vocabulary: vec![HeaderRule::regex("Bad", "(unclosed")],
            ..Default::default()
        };
        match config.compile() {
            Err(ConfigError::InvalidRegex { keyword, .. }) => assert_eq!(keyword, "Bad"),
            other => panic!("expected InvalidRegex, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let same_separators = LayoutConfig {
            locale: Locale {
                decimal_separator: ',',
                thousands_separator: Some(','),
                currency_markers: vec![],
            },
            ..Default::default()
        };
        assert!(matches!(
            same_separators.compile(),
            Err(ConfigError::Invalid(_))
        ));

        let duplicate = LayoutConfig {
            header_vocabulary: vec![HeaderRule::exact("Débit"), HeaderRule::exact("DEBIT")],
            ..Default::default()
        };
        assert!(matches!(duplicate.compile(), Err(ConfigError::Invalid(_))));

        let zero_tolerance = LayoutConfig {
            row_tolerance_factor: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            zero_tolerance.compile(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"row_tolerance_factor": 0.8}}"#).unwrap();
        let config = LayoutConfig::from_path(file.path()).unwrap();
        assert_eq!(config.row_tolerance_factor, 0.8);
        assert_eq!(config.header_vocabulary.len(), 5);

        assert!(matches!(
            LayoutConfig::from_path("/nonexistent/config.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
