//! Rate storage abstraction

use crate::core::error::StoreError;
use crate::core::rate::{CurrencyObservation, StoredRate};
use async_trait::async_trait;

/// Append-only log of rate observations.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Appends an observation and returns the stored row with its new id.
    async fn insert(&self, observation: CurrencyObservation) -> Result<StoredRate, StoreError>;

    /// Row with the greatest id for `code`, or [`StoreError::NotFound`].
    async fn latest(&self, code: &str) -> Result<StoredRate, StoreError>;

    /// Every stored row in id order.
    async fn all(&self) -> Result<Vec<StoredRate>, StoreError>;
}
