use std::future::Future;
use std::time::Duration;

use crate::config::Settings;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.initial_load_attempts.clamp(1, 20),
            base_delay: Duration::from_millis(settings.retry_base_delay_ms.min(60_000)),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms.min(300_000)),
        }
    }

    pub fn backoff(&self, attempt: usize) -> Duration {
        // attempt is 1-based (attempt=1 => base_delay)
        if attempt <= 1 {
            return self.base_delay.min(self.max_delay);
        }

        let exp_shift = (attempt - 1).min(30) as u32;
        let base_ms = self.base_delay.as_millis() as u64;
        let raw_ms = base_ms.saturating_mul(1u64 << exp_shift);
        Duration::from_millis(raw_ms).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Run `op` up to `max_attempts` times with exponential backoff.
///
/// A rate-limited failure ends the sequence at once: hammering the remote
/// again would only extend the lockout.
pub async fn retry_unless_rate_limited<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                crate::warn_log!("{}: rate limited on attempt {}, giving up", label, attempt);
                return Err(e);
            }
            Err(e) if attempt >= config.max_attempts => {
                crate::warn_log!("{}: failed after {} attempts: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let delay = config.backoff(attempt);
                crate::debug_log!(
                    "{}: attempt {} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
