//! Bounded retry with exponential backoff for transport calls.

use std::thread;
use std::time::Duration;

/// HTTP statuses that are retried at the transport layer.
pub const RETRY_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Sleep before the `retry`-th retry (1-based): zero for the first,
    /// then `unit * 2^(retry - 1)`.
    pub fn delay_before_retry(&self, retry: usize) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let shift = (retry - 1).min(16) as u32;
        self.backoff_unit.saturating_mul(1u32 << shift)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. `op` receives the 0-based attempt number.
    pub fn run<T, E, F, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut retries = 0;
        loop {
            match op(retries) {
                Ok(value) => return Ok(value),
                Err(err) if retries < self.max_retries && is_transient(&err) => {
                    retries += 1;
                    let delay = self.delay_before_retry(retries);
                    log::warn!(
                        "Transient failure ({}); retry {}/{} in {:.1}s",
                        err,
                        retries,
                        self.max_retries,
                        delay.as_secs_f64()
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10));
        assert_eq!(policy.delay_before_retry(1), Duration::ZERO);
        assert_eq!(policy.delay_before_retry(2), Duration::from_secs(20));
        assert_eq!(policy.delay_before_retry(3), Duration::from_secs(40));
        assert_eq!(policy.delay_before_retry(5), Duration::from_secs(160));
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result: Result<usize, Failure> = policy.run(
            |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(Failure::Transient)
                } else {
                    Ok(attempt)
                }
            },
            |e| *e == Failure::Transient,
        );
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_gives_up_after_budget() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), Failure> = policy.run(
            |_| {
                calls += 1;
                Err(Failure::Transient)
            },
            |e| *e == Failure::Transient,
        );
        assert_eq!(result, Err(Failure::Transient));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), Failure> = policy.run(
            |_| {
                calls += 1;
                Err(Failure::Fatal)
            },
            |e| *e == Failure::Transient,
        );
        assert_eq!(result, Err(Failure::Fatal));
        assert_eq!(calls, 1);
    }
}
