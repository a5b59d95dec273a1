use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

pub const DEFAULT_BACKOFF: f64 = 1.5;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        if backoff >= 1.0 {
            self.backoff = backoff;
        }
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn should_retry<E: Retryable>(&self, attempt: u32, error: &E) -> bool {
        if attempt + 1 >= self.max_attempts {
            return false;
        }

        error.is_retryable()
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(attempt as i32);
        self.initial_delay.mul_f64(factor)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("{}: succeeded on attempt {}", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !self.should_retry(attempt, &e) {
                        tracing::warn!(
                            "{}: giving up after attempt {}/{}: {}",
                            label,
                            attempt + 1,
                            self.max_attempts,
                            e
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:.1}s",
                        label,
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
