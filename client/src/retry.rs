use std::future::Future;
use std::time::Duration;

/// Retry an async operation up to `attempts` times with a doubling delay.
/// Used where a just-issued credential might not yet be recognized by the
/// backend on the very next call (token-propagation races).
pub async fn retry_with_backoff<T, E, F, Fut>(
    attempts: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!("attempt {attempt} failed: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
