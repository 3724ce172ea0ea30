use crate::core::error::StoreError;
use crate::core::rate::{CurrencyObservation, StoredRate};
use crate::core::store::RateStore;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const RATES_PARTITION: &str = "rates";

/// Rate store backed by a fjall keyspace.
///
/// Rows live in the `rates` partition keyed by big-endian id, so key order is
/// id order and the last key holds the highest id.
pub struct DiskRateStore {
    keyspace: Keyspace,
    rates: PartitionHandle,
    next_id: Mutex<u64>,
}

impl DiskRateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Backend(e.to_string()))?;

        let keyspace = fjall::Config::new(path).open()?;
        let rates = keyspace.open_partition(RATES_PARTITION, PartitionCreateOptions::default())?;

        let next_id = match rates.last_key_value()? {
            Some((key, _)) => decode_id(&key)? + 1,
            None => 1,
        };
        debug!(
            "Opened rate store at {} (next id {})",
            path.display(),
            next_id
        );

        Ok(Self {
            keyspace,
            rates,
            next_id: Mutex::new(next_id),
        })
    }

    fn decode(value: &[u8]) -> Result<StoredRate, StoreError> {
        Ok(serde_json::from_slice(value)?)
    }
}

fn decode_id(key: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Backend(format!("invalid rate key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Runs fjall I/O on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
}

#[async_trait]
impl RateStore for DiskRateStore {
    async fn insert(&self, observation: CurrencyObservation) -> Result<StoredRate, StoreError> {
        let mut next_id = self.next_id.lock().await;
        let stored = StoredRate::from_observation(*next_id, &observation);

        let key = stored.id.to_be_bytes().to_vec();
        let value = serde_json::to_vec(&stored)?;
        let keyspace = self.keyspace.clone();
        let rates = self.rates.clone();
        blocking(move || {
            rates.insert(key, value)?;
            keyspace.persist(PersistMode::SyncAll)?;
            Ok(())
        })
        .await?;
        *next_id += 1;

        debug!("Stored rate {} for {}", stored.id, stored.currency);
        Ok(stored)
    }

    async fn latest(&self, code: &str) -> Result<StoredRate, StoreError> {
        let rates = self.rates.clone();
        let code = code.to_string();
        blocking(move || {
            for item in rates.iter().rev() {
                let (_, value) = item?;
                let rate = Self::decode(&value)?;
                if rate.currency == code {
                    return Ok(rate);
                }
            }
            Err(StoreError::NotFound { code })
        })
        .await
    }

    async fn all(&self) -> Result<Vec<StoredRate>, StoreError> {
        let rates = self.rates.clone();
        blocking(move || {
            rates
                .iter()
                .map(|item| {
                    let (_, value) = item?;
                    Self::decode(&value)
                })
                .collect()
        })
        .await
    }
}
