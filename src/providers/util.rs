use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `operation` up to `retries + 1` times, sleeping `delay_ms` between
/// attempts, and returns the first success or the last error.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<anyhow::Error> + Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err.into());
                }
                warn!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt,
                    retries + 1,
                    err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
