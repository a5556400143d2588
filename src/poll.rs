// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Bounded polling and retry primitives.
//!
//! Both loops are timed through a [`Clock`] so tests can drive them with a
//! manual clock. The transmit path uses [`poll_until`] for its free-slot
//! watchdog and [`retry`] for the BUF_XMIT commit.

use crate::clock::Clock;
use std::time::Duration;

/// Result of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition was met.
    Ready(T),
    /// The budget ran out first.
    Expired { waited: Duration },
}

/// Call `poll` until it yields a value or `budget` has elapsed, sleeping
/// `interval` between calls.
///
/// `poll` runs at least once. Errors from `poll` end the loop immediately.
pub fn poll_until<T, E>(
    clock: &dyn Clock,
    budget: Duration,
    interval: Duration,
    mut poll: impl FnMut() -> Result<Option<T>, E>,
) -> Result<PollOutcome<T>, E> {
    let start = clock.now();
    loop {
        if let Some(value) = poll()? {
            return Ok(PollOutcome::Ready(value));
        }
        let waited = clock.now().saturating_duration_since(start);
        if waited >= budget {
            return Ok(PollOutcome::Expired { waited });
        }
        clock.sleep(interval);
    }
}

/// Last error of an exhausted [`retry`].
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `op` up to `attempts` times, pausing between failures.
///
/// `op` receives the 1-based attempt number. At least one attempt is made.
pub fn retry<T, E>(
    clock: &dyn Clock,
    attempts: u32,
    pause: Duration,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryExhausted<E>> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= attempts => return Err(RetryExhausted { attempts, error }),
            Err(_) => {
                clock.sleep(pause);
                attempt += 1;
            }
        }
    }
}

/// Async [`poll_until`]: suspends on the tokio timer instead of sleeping.
#[cfg(feature = "async")]
pub async fn poll_until_async<T, E, F, Fut>(
    budget: Duration,
    interval: Duration,
    mut poll: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, E>>,
{
    let start = tokio::time::Instant::now();
    loop {
        if let Some(value) = poll().await? {
            return Ok(PollOutcome::Ready(value));
        }
        let waited = start.elapsed();
        if waited >= budget {
            return Ok(PollOutcome::Expired { waited });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Async [`retry`]: pauses on the tokio timer between failures.
#[cfg(feature = "async")]
pub async fn retry_async<T, E>(
    attempts: u32,
    pause: Duration,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryExhausted<E>> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= attempts => return Err(RetryExhausted { attempts, error }),
            Err(_) => {
                tokio::time::sleep(pause).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_poll_ready_first_call_does_not_sleep() {
        let clock = ManualClock::new();
        let outcome: Result<_, ()> = poll_until(&clock, Duration::from_secs(1), MS, || Ok(Some(7)));
        assert_eq!(outcome.unwrap(), PollOutcome::Ready(7));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_poll_ready_after_some_calls() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let outcome: Result<_, ()> = poll_until(&clock, Duration::from_secs(1), MS, || {
            calls += 1;
            Ok((calls == 10).then_some(calls))
        });
        assert_eq!(outcome.unwrap(), PollOutcome::Ready(10));
        assert_eq!(clock.elapsed(), 9 * MS);
    }

    #[test]
    fn test_poll_expires() {
        let clock = ManualClock::new();
        let mut calls = 0u32;
        let outcome: Result<PollOutcome<()>, ()> =
            poll_until(&clock, Duration::from_secs(1), MS, || {
                calls += 1;
                Ok(None)
            });
        assert_eq!(
            outcome.unwrap(),
            PollOutcome::Expired {
                waited: Duration::from_secs(1)
            }
        );
        assert_eq!(calls, 1001);
    }

    #[test]
    fn test_poll_error_stops() {
        let clock = ManualClock::new();
        let outcome: Result<PollOutcome<()>, &str> =
            poll_until(&clock, Duration::from_secs(1), MS, || Err("broken"));
        assert_eq!(outcome.unwrap_err(), "broken");
    }

    #[test]
    fn test_retry_succeeds_after_failures() {
        let clock = ManualClock::new();
        let result = retry(&clock, 15, Duration::from_millis(50), |attempt| {
            if attempt < 3 {
                Err(attempt)
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_exhausted() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let result: Result<(), _> = retry(&clock, 15, Duration::from_millis(50), |attempt| {
            calls += 1;
            Err(attempt)
        });
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 15);
        assert_eq!(exhausted.error, 15);
        assert_eq!(calls, 15);
        assert_eq!(clock.elapsed(), Duration::from_millis(50 * 14));
    }

    #[test]
    fn test_retry_zero_attempts_runs_once() {
        let clock = ManualClock::new();
        let result: Result<(), _> = retry(&clock, 0, MS, |_| Err(()));
        assert_eq!(result.unwrap_err().attempts, 1);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_poll_until_async() {
        let mut calls = 0;
        let outcome: Result<_, ()> = poll_until_async(Duration::from_millis(500), MS, || {
            calls += 1;
            let ready = calls >= 3;
            async move { Ok(ready.then_some(())) }
        })
        .await;
        assert_eq!(outcome.unwrap(), PollOutcome::Ready(()));

        let outcome: Result<PollOutcome<()>, ()> =
            poll_until_async(Duration::from_millis(5), MS, || async { Ok(None) }).await;
        assert!(matches!(outcome.unwrap(), PollOutcome::Expired { .. }));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_retry_async() {
        let result = retry_async(5, MS, |attempt| if attempt < 3 { Err(attempt) } else { Ok(attempt) }).await;
        assert_eq!(result.unwrap(), 3);

        let exhausted = retry_async(4, MS, |attempt| Err::<(), _>(attempt)).await.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.error, 4);
    }
}
