//! Rate observations and the symbol table that names them

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A buying/selling quote pair. No ordering is enforced between the two.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatePair {
    pub buying: f64,
    pub selling: f64,
}

impl RatePair {
    pub fn new(buying: f64, selling: f64) -> Self {
        Self { buying, selling }
    }
}

/// One extracted (currency, buying, selling) fact tied to an ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyObservation {
    /// Phrase as it appears in the rate document, e.g. "United States Dollars"
    pub label: String,
    /// Normalized symbol, e.g. "USD"
    pub code: String,
    pub rate: RatePair,
    pub observed_at: DateTime<Local>,
}

/// A persisted observation. `id` grows monotonically; the latest rate for a
/// currency is the one with the greatest id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRate {
    pub id: u64,
    pub currency: String,
    pub buying: f64,
    pub selling: f64,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl StoredRate {
    pub fn from_observation(id: u64, observation: &CurrencyObservation) -> Self {
        Self {
            id,
            currency: observation.code.clone(),
            buying: observation.rate.buying,
            selling: observation.rate.selling,
            created_at: observation.observed_at,
            updated_at: observation.observed_at,
        }
    }
}

/// Maps document phrasing to a normalized currency code.
///
/// Entries iterate in label order so extraction output is deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolTable(BTreeMap<String, String>);

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, code: impl Into<String>) {
        self.0.insert(label.into(), code.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(label, code)| (label.as_str(), code.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<L, C> FromIterator<(L, C)> for SymbolTable
where
    L: Into<String>,
    C: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (L, C)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(label, code)| (label.into(), code.into()))
                .collect(),
        )
    }
}
