//! Rate document source abstraction

use crate::core::error::FetchError;
use crate::providers::document::FetchOutcome;
use async_trait::async_trait;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Retrieves the current rate document into its local cache file.
    async fn fetch(&self, updated_today: bool) -> Result<FetchOutcome, FetchError>;
}
