//! Bounded exponential backoff for transport operations.

use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Retry policy: `max_attempts` tries, sleeping `base`, `2*base`, ...
/// between them, never longer than `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base: Duration::ZERO,
            cap: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Run `op` until it succeeds or attempts run out, sleeping between tries.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    pub fn run<T, F>(&self, op_name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.run_with_sleep(op_name, op, std::thread::sleep)
    }

    /// Like [`run`](Self::run) with an injectable sleeper, for tests.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    pub fn run_with_sleep<T, F, S>(&self, op_name: &str, mut op: F, mut sleep: S) -> Result<T>
    where
        F: FnMut() -> Result<T>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    let delay = self.delay(attempt);
                    warn!(op = op_name, attempt, ?delay, error = %err, "Retrying after failure");
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(10));
        assert_eq!(policy.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let mut slept = Vec::new();

        let result = policy.run_with_sleep(
            "push",
            || {
                calls += 1;
                if calls < 3 {
                    Err(Error::Other("network".into()))
                } else {
                    Ok(calls)
                }
            },
            |d| slept.push(d),
        );

        assert_eq!(result.unwrap(), 3);
        assert_eq!(slept, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn test_returns_last_error_when_exhausted() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let mut sleeps = 0;

        let result: Result<()> = policy.run_with_sleep(
            "fetch",
            || {
                calls += 1;
                Err(Error::Other(format!("attempt {calls}")))
            },
            |_| sleeps += 1,
        );

        assert_eq!(result.unwrap_err().to_string(), "attempt 3");
        assert_eq!(calls, 3);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn test_none_tries_once() {
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::none().run_with_sleep(
            "op",
            || {
                calls += 1;
                Err(Error::Other("x".into()))
            },
            |_| panic!("must not sleep"),
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
