//! Retriable errors and a bounded exponential backoff retry loop.

use std::{error::Error, fmt::Display, thread, time::Duration};

use getset::CopyGetters;
use thiserror::Error;
use typed_builder::TypedBuilder;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Marks an error as transient. Errors without this marker are terminal.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RetriableError {
    #[source]
    error: Box<dyn Error + Send + Sync + 'static>,
}

/// The retry policy used by [`retry`].
///
/// The delay before attempt `n + 1` is `initial * 2^n`, capped at `max_delay`, scaled by a
/// random factor in `1 ± jitter`.
#[derive(Debug, Clone, Copy, PartialEq, TypedBuilder, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct Backoff {
    /// The delay before the first retry.
    #[builder(default = Duration::from_millis(100))]
    initial: Duration,

    /// The upper bound of a single delay.
    #[builder(default = Duration::from_secs(5))]
    max_delay: Duration,

    /// The maximum number of attempts, including the first one.
    #[builder(default = 5)]
    max_attempts: u32,

    /// The relative jitter applied to each delay, between `0.0` and `1.0`.
    #[builder(default = 0.2)]
    jitter: f64,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Errors that can tell whether the failed operation may succeed when repeated.
pub trait Retriable {
    /// Returns `true` if the error, or an error it wraps, is tagged as retriable.
    fn is_retriable(&self) -> bool;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RetriableError {
    /// Tags an error as retriable.
    pub fn new(error: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl Backoff {
    /// Returns the delay to wait after the failed attempt with index `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let base = self.initial.saturating_mul(factor).min(self.max_delay);
        if self.jitter <= 0.0 {
            return base;
        }

        let jitter = self.jitter.min(1.0);
        let scale = 1.0 + rand::random_range(-jitter..=jitter);
        base.mul_f64(scale)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs `operation` until it succeeds, fails with a terminal error, or the attempts of `policy`
/// are exhausted. The last error is returned unchanged.
pub fn retry<T, E, F>(policy: &Backoff, mut operation: F) -> Result<T, E>
where
    E: Retriable + Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt + 1 < max_attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    "attempt {}/{} failed, retrying in {:?}: {}",
                    attempt + 1,
                    max_attempts,
                    delay,
                    e
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Backoff {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Retriable for RetriableError {
    fn is_retriable(&self) -> bool {
        true
    }
}

impl Retriable for anyhow::Error {
    fn is_retriable(&self) -> bool {
        self.chain().any(|e| e.is::<RetriableError>())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn fast_policy(max_attempts: u32) -> Backoff {
        Backoff::builder()
            .initial(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .max_attempts(max_attempts)
            .jitter(0.0)
            .build()
    }

    #[test]
    fn test_backoff_delay_grows_and_is_capped() {
        let policy = Backoff::builder()
            .initial(Duration::from_millis(100))
            .max_delay(Duration::from_millis(350))
            .jitter(0.0)
            .build();
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_jitter_stays_in_bounds() {
        let policy = Backoff::builder()
            .initial(Duration::from_millis(100))
            .jitter(0.5)
            .build();
        for _ in 0..50 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test_log::test]
    fn test_retry_recovers_from_retriable_errors() {
        let calls = Cell::new(0);
        let result: anyhow::Result<&str> = retry(&fast_policy(3), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(anyhow::Error::new(RetriableError::new("connection reset")))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = retry(&fast_policy(2), || {
            calls.set(calls.get() + 1);
            Err(anyhow::Error::new(RetriableError::new("timeout")))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_retry_stops_on_terminal_error() {
        let calls = Cell::new(0);
        let result: anyhow::Result<()> = retry(&fast_policy(5), || {
            calls.set(calls.get() + 1);
            Err(anyhow::anyhow!("malformed manifest"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retriable_marker_survives_context() {
        let err = anyhow::Error::new(RetriableError::new("connection reset"))
            .context("unable to fetch blob");
        assert!(err.is_retriable());
        assert!(!anyhow::anyhow!("plain").is_retriable());
    }
}
