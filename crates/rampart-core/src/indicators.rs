//! Indicator extraction from unstructured incident text.
//!
//! Scans free text (typically a ransom note) for cryptocurrency addresses,
//! onion-service URLs, and email addresses. Address formats live in a
//! configuration catalog rather than the extraction logic, so new families
//! can be registered without touching the scanner. This is a best-effort
//! enrichment aid: candidates that fail a format's validator are silently
//! dropped, never reported as errors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Kind of an extracted indicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// A cryptocurrency address, tagged with its format name.
    CryptoAddress(String),
    /// An onion-service URL.
    OnionAddress,
    /// An email address.
    Email,
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndicatorKind::CryptoAddress(format) => write!(f, "crypto_address:{format}"),
            IndicatorKind::OnionAddress => write!(f, "onion_address"),
            IndicatorKind::Email => write!(f, "email"),
        }
    }
}

/// A structured value extracted from incident text.
///
/// Immutable once created; the span gives byte offsets `[start, end)` into
/// the originating text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indicator {
    pub value: String,
    pub kind: IndicatorKind,
    pub span: (usize, usize),
}

/// One entry in the cryptocurrency address format catalog.
#[derive(Debug, Clone)]
pub struct AddressFormat {
    /// Format name reported in the indicator kind (e.g., "bitcoin").
    pub name: String,
    /// Candidate pattern.
    pub pattern: String,
    /// Optional structural validator applied after the regex match.
    pub validator: Option<fn(&str) -> bool>,
}

impl AddressFormat {
    /// Declares a format with no validator beyond the pattern itself.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            validator: None,
        }
    }

    /// Attaches a validator.
    pub fn with_validator(mut self, validator: fn(&str) -> bool) -> Self {
        self.validator = Some(validator);
        self
    }
}

fn monero_length_valid(candidate: &str) -> bool {
    // Standard and integrated addresses
    candidate.len() == 95 || candidate.len() == 106
}

/// Default format catalog: Bitcoin (legacy base58 and bech32), Ethereum,
/// Monero.
pub fn default_address_formats() -> Vec<AddressFormat> {
    vec![
        AddressFormat::new("bitcoin", r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b"),
        AddressFormat::new("bitcoin", r"\bbc1[a-z0-9]{25,59}\b"),
        AddressFormat::new("ethereum", r"\b0x[a-fA-F0-9]{40}\b"),
        AddressFormat::new("monero", r"\b[48][0-9AB][1-9A-HJ-NP-Za-km-z]{93,104}\b")
            .with_validator(monero_length_valid),
    ]
}

struct CompiledFormat {
    kind: IndicatorKind,
    regex: Regex,
    validator: Option<fn(&str) -> bool>,
}

/// Scans text for indicators.
///
/// A pure function of its input: scanning the same text twice yields the
/// same indicators in the same order. Overlapping candidates are resolved by
/// longest-match-wins at each start offset, and no substring is ever
/// reported under two kinds.
pub struct IndicatorExtractor {
    formats: Vec<CompiledFormat>,
}

// Onion-service URLs: v2 identifiers are 16 base32 chars, v3 are 56.
const ONION_PATTERN: &str = r"\bhttps?://[a-z2-7]{16,56}\.onion\b";
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

impl IndicatorExtractor {
    /// Creates an extractor with the default format catalog.
    pub fn new() -> Self {
        Self::with_formats(default_address_formats())
    }

    /// Creates an extractor with a custom cryptocurrency format catalog.
    ///
    /// Formats with invalid patterns are skipped with a warning rather than
    /// failing construction.
    pub fn with_formats(address_formats: Vec<AddressFormat>) -> Self {
        let mut formats = Vec::new();
        for format in address_formats {
            match Regex::new(&format.pattern) {
                Ok(regex) => formats.push(CompiledFormat {
                    kind: IndicatorKind::CryptoAddress(format.name),
                    regex,
                    validator: format.validator,
                }),
                Err(err) => {
                    warn!(format = %format.name, error = %err, "skipping invalid address pattern");
                }
            }
        }
        formats.push(CompiledFormat {
            kind: IndicatorKind::OnionAddress,
            regex: Regex::new(ONION_PATTERN).expect("onion pattern is valid"),
            validator: None,
        });
        formats.push(CompiledFormat {
            kind: IndicatorKind::Email,
            regex: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
            validator: None,
        });
        Self { formats }
    }

    /// Registers an additional address format.
    pub fn with_format(mut self, format: AddressFormat) -> Self {
        match Regex::new(&format.pattern) {
            Ok(regex) => {
                // Custom formats take precedence over the built-in onion and
                // email patterns at equal spans, so insert before them.
                let at = self.formats.len().saturating_sub(2);
                self.formats.insert(
                    at,
                    CompiledFormat {
                        kind: IndicatorKind::CryptoAddress(format.name),
                        regex,
                        validator: format.validator,
                    },
                );
            }
            Err(err) => {
                warn!(format = %format.name, error = %err, "skipping invalid address pattern");
            }
        }
        self
    }

    /// Scans the text, returning indicators ordered by start offset.
    pub fn scan(&self, text: &str) -> IndicatorScan {
        IndicatorScan {
            indicators: self.collect(text).into_iter(),
        }
    }

    /// Scans the text into a vector.
    pub fn extract(&self, text: &str) -> Vec<Indicator> {
        self.collect(text)
    }

    fn collect(&self, text: &str) -> Vec<Indicator> {
        // (start, end, catalog priority, kind)
        let mut candidates: Vec<(usize, usize, usize, &IndicatorKind)> = Vec::new();
        for (priority, format) in self.formats.iter().enumerate() {
            for m in format.regex.find_iter(text) {
                if let Some(validator) = format.validator {
                    if !validator(m.as_str()) {
                        continue;
                    }
                }
                candidates.push((m.start(), m.end(), priority, &format.kind));
            }
        }

        // Longest match wins per start offset; catalog order breaks ties so a
        // substring is never attributed to two kinds.
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        let mut indicators = Vec::new();
        let mut last_start = usize::MAX;
        for (start, end, _, kind) in candidates {
            if start == last_start {
                continue;
            }
            last_start = start;
            indicators.push(Indicator {
                value: text[start..end].to_string(),
                kind: kind.clone(),
                span: (start, end),
            });
        }
        indicators
    }
}

impl Default for IndicatorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over indicators found in a single scan.
pub struct IndicatorScan {
    indicators: std::vec::IntoIter<Indicator>,
}

impl Iterator for IndicatorScan {
    type Item = Indicator;

    fn next(&mut self) -> Option<Indicator> {
        self.indicators.next()
    }
}
