use crate::core::error::StoreError;
use crate::core::rate::{CurrencyObservation, StoredRate};
use crate::core::store::RateStore;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// In-process rate store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryRateStore {
    rows: Mutex<Vec<StoredRate>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn insert(&self, observation: CurrencyObservation) -> Result<StoredRate, StoreError> {
        let mut rows = self.rows.lock().await;
        let id = rows.last().map_or(1, |row| row.id + 1);
        let stored = StoredRate::from_observation(id, &observation);
        rows.push(stored.clone());
        debug!("Stored rate {} for {}", stored.id, stored.currency);
        Ok(stored)
    }

    async fn latest(&self, code: &str) -> Result<StoredRate, StoreError> {
        let rows = self.rows.lock().await;
        rows.iter()
            .rev()
            .find(|row| row.currency == code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                code: code.to_string(),
            })
    }

    async fn all(&self) -> Result<Vec<StoredRate>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }
}
