use crate::errors::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff, optionally with full jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Backoff {
    pub const fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            initial,
            max,
            jitter: false,
        }
    }

    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Wait after failed attempt `attempt`; uniform in `[0, ceiling]` when jittered.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let ms = ceiling.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the retry budget
/// is spent. The last error is returned.
pub async fn with_backoff<T, F, Fut>(
    policy: &Backoff,
    what: &str,
    is_retryable: impl Fn(&Error) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt > policy.max_retries || !is_retryable(&e) {
                    return Err(e);
                }

                let wait = policy.delay(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                    what,
                    attempt,
                    policy.max_retries + 1,
                    e,
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: Backoff = Backoff::new(3, Duration::from_millis(1), Duration::from_millis(4));

    #[test]
    fn test_ceiling_doubles_and_caps() {
        let policy = Backoff::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.ceiling(3), Duration::from_millis(350));
        assert_eq!(policy.ceiling(40), Duration::from_millis(350));
    }

    #[test]
    fn test_jittered_delay_stays_under_ceiling() {
        let policy =
            Backoff::new(3, Duration::from_millis(50), Duration::from_secs(1)).with_jitter();
        for attempt in 1..=4 {
            for _ in 0..50 {
                assert!(policy.delay(attempt) <= policy.ceiling(attempt));
            }
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&FAST, "op", |_| true, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::ChannelSend)
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(&FAST, "op", |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ChannelSend)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(
            &FAST,
            "op",
            |e| !matches!(e, Error::Validation(_)),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Validation("bad".to_string()))
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
