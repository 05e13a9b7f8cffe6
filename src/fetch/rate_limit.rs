use std::future::Future;
use std::time::Duration;

use super::FetchError;

/// Waits between attempts after a 429, in order. Retries stop once the
/// schedule is exhausted.
pub const DEFAULT_BACKOFF: &[Duration] = &[
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(240),
];

/// Wait before retry `attempt` (zero-based), preferring the server's
/// `Retry-After` hint when it sent one.
pub fn backoff_for(schedule: &[Duration], attempt: usize, retry_after: Option<Duration>) -> Option<Duration> {
    let scheduled = schedule.get(attempt).copied()?;
    Some(retry_after.unwrap_or(scheduled))
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// A failed attempt, with the server's `Retry-After` hint if any.
#[derive(Debug)]
pub struct Attempt {
    pub error: FetchError,
    pub retry_after: Option<Duration>,
}

impl From<FetchError> for Attempt {
    fn from(error: FetchError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Run `call` until it succeeds, fails with something other than a 429, or
/// the backoff schedule runs out.
pub async fn retry_rate_limited<T, F, Fut>(schedule: &[Duration], mut call: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(failed) if failed.error.is_rate_limited() => {
                let Some(wait) = backoff_for(schedule, attempt, failed.retry_after) else {
                    return Err(failed.error);
                };
                log::warn!(
                    "Rate limited (429). Waiting {}s before retry {}/{}",
                    wait.as_secs(),
                    attempt + 1,
                    schedule.len()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(failed) => return Err(failed.error),
        }
    }
}
