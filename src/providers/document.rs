use crate::core::error::FetchError;
use crate::core::source::DocumentSource;
use crate::providers::util::with_retry;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Result of retrieving the remote rate document.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub path: PathBuf,
    /// `None` when the server sent no usable `Last-Modified` header.
    pub last_modified: Option<DateTime<FixedOffset>>,
    pub is_new_for_today: bool,
    pub bytes_written: usize,
}

/// Downloads the rate document and keeps a local copy of it.
pub struct DocumentFetcher {
    url: String,
    cache_path: PathBuf,
    client: reqwest::Client,
    retries: usize,
}

impl DocumentFetcher {
    pub fn new(
        url: &str,
        cache_path: impl Into<PathBuf>,
        timeout: Duration,
        retries: usize,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxrates/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            cache_path: cache_path.into(),
            client,
            retries,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Retrieves the document and overwrites the cached copy, judging
    /// freshness against `today`.
    ///
    /// The cache file is rewritten on every call, including when the document
    /// is not new for today; `is_new_for_today` is informational only.
    #[instrument(name = "DocumentFetch", skip(self), fields(url = %self.url))]
    pub async fn fetch_on(
        &self,
        updated_today: bool,
        today: NaiveDate,
    ) -> Result<FetchOutcome, FetchError> {
        debug!("Requesting rate document");
        let response = with_retry(
            || async { self.client.get(&self.url).send().await },
            self.retries,
            500,
        )
        .await
        .map_err(|source| FetchError::Request {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_last_modified);
        if last_modified.is_none() {
            warn!("No usable Last-Modified header, freshness unknown");
        }

        let is_new_for_today = last_modified
            .as_ref()
            .is_some_and(|modified| same_calendar_day(modified, today));
        if is_new_for_today {
            info!("Rate document is new for today");
            if updated_today {
                info!("Rates were already updated today");
            }
        }

        let body = response.bytes().await.map_err(|source| FetchError::Body {
            url: self.url.clone(),
            source,
        })?;

        replace_file(&self.cache_path, &body)
            .await
            .map_err(|source| FetchError::CacheWrite {
                path: self.cache_path.display().to_string(),
                source,
            })?;
        debug!(
            "Cached {} bytes at {}",
            body.len(),
            self.cache_path.display()
        );

        Ok(FetchOutcome {
            path: self.cache_path.clone(),
            last_modified,
            is_new_for_today,
            bytes_written: body.len(),
        })
    }
}

#[async_trait]
impl DocumentSource for DocumentFetcher {
    async fn fetch(&self, updated_today: bool) -> Result<FetchOutcome, FetchError> {
        self.fetch_on(updated_today, Local::now().date_naive()).await
    }
}

/// Parses an RFC-1123 `Last-Modified` value. Unparsable values are unknown.
pub fn parse_last_modified(value: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc2822(value.trim()) {
        Ok(modified) => Some(modified),
        Err(e) => {
            debug!("Could not parse Last-Modified '{}': {}", value, e);
            None
        }
    }
}

/// True when the remote timestamp falls on `today`, ignoring time of day.
///
/// The remote date is read in the header's own zone and compared with the
/// local calendar date as is. Near midnight the two can disagree about what
/// "today" is.
pub fn same_calendar_day(remote: &DateTime<FixedOffset>, today: NaiveDate) -> bool {
    remote.date_naive() == today
}

async fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, contents).await?;
    tokio::fs::rename(&partial, path).await
}
