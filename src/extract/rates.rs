//! Finds tracked currency labels in flattened row text and reads the
//! buying/selling quotes that follow them.
//!
//! A row is expected to look like `<label><whitespace><buying><whitespace><selling>...`.
//! Anything after the selling quote is ignored.

use crate::core::error::ExtractionError;
use crate::core::rate::{CurrencyObservation, RatePair, SymbolTable};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do with a label whose quotes can't be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Drop the match.
    #[default]
    Skip,
    /// Keep the match and record unreadable quotes as 0.0.
    Zero,
}

/// A label found in a row, with the outcome of reading each quote.
#[derive(Debug, Clone, PartialEq)]
pub struct RateMatch {
    pub label: String,
    pub code: String,
    pub buying: Result<f64, ExtractionError>,
    pub selling: Result<f64, ExtractionError>,
}

impl RateMatch {
    /// Both quotes, or the first error encountered.
    pub fn rate(&self) -> Result<RatePair, ExtractionError> {
        Ok(RatePair::new(self.buying.clone()?, self.selling.clone()?))
    }

    fn zero_filled(&self) -> RatePair {
        RatePair::new(
            self.buying.clone().unwrap_or_default(),
            self.selling.clone().unwrap_or_default(),
        )
    }
}

/// Observations kept from a run, plus how many label matches were malformed.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub observations: Vec<CurrencyObservation>,
    pub malformed: usize,
}

/// Every label match in `rows`, in row order then symbol-table order.
///
/// Only the first occurrence of a label in a row is considered. A row may
/// match several labels and a label may match several rows.
pub fn scan<S: AsRef<str>>(rows: &[S], symbols: &SymbolTable) -> Vec<RateMatch> {
    let mut matches = Vec::new();
    for row in rows {
        let row = row.as_ref();
        for (label, code) in symbols.iter() {
            let Some(index) = row.find(label) else {
                continue;
            };
            let (buying, selling) = read_quotes(&row[index + label.len()..]);
            matches.push(RateMatch {
                label: label.to_string(),
                code: code.to_string(),
                buying,
                selling,
            });
        }
    }
    matches
}

/// Scans `rows` and turns the matches into observations according to `policy`.
pub fn extract<S: AsRef<str>>(
    rows: &[S],
    symbols: &SymbolTable,
    policy: MalformedPolicy,
    observed_at: DateTime<Local>,
) -> Extraction {
    let mut extraction = Extraction::default();

    for found in scan(rows, symbols) {
        let rate = match (found.rate(), policy) {
            (Ok(rate), _) => rate,
            (Err(e), MalformedPolicy::Skip) => {
                warn!("Skipping {} ({}): {}", found.code, found.label, e);
                extraction.malformed += 1;
                continue;
            }
            (Err(e), MalformedPolicy::Zero) => {
                warn!(
                    "Zero-filling unreadable quote for {} ({}): {}",
                    found.code, found.label, e
                );
                extraction.malformed += 1;
                found.zero_filled()
            }
        };

        debug!(
            "Extracted {}: buying {} selling {}",
            found.code, rate.buying, rate.selling
        );
        extraction.observations.push(CurrencyObservation {
            label: found.label,
            code: found.code,
            rate,
            observed_at,
        });
    }

    extraction
}

type Quote = Result<f64, ExtractionError>;

fn read_quotes(after_label: &str) -> (Quote, Quote) {
    // A label ending the row has no quotes rather than a missing separator.
    if !after_label.is_empty() && !after_label.starts_with(char::is_whitespace) {
        return (
            Err(ExtractionError::MissingSeparator),
            Err(ExtractionError::MissingSeparator),
        );
    }

    let mut tokens = after_label.split_whitespace();
    let buying = parse_quote("buying", tokens.next());
    let selling = parse_quote("selling", tokens.next());
    (buying, selling)
}

fn parse_quote(field: &'static str, token: Option<&str>) -> Quote {
    let token = token.ok_or(ExtractionError::MissingField { field })?;
    let invalid = || ExtractionError::InvalidNumber {
        field,
        token: token.to_string(),
    };

    let value: f64 = token.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    if value < 0.0 {
        return Err(ExtractionError::NegativeQuote { field, value });
    }
    Ok(value)
}
