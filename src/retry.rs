//! Bounded retry with a fixed delay.
//!
//! Both startup phases (driver acquisition and migration execution) go through
//! [`Retrier::run`]. Attempt 1 runs immediately, every later attempt is
//! preceded by exactly `policy.delay`. There is no backoff growth and no
//! jitter between retries; desynchronising instances is the job of the
//! startup jitter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;

/// Blocking sleep used between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Parks the current coroutine, or blocks the thread outside the may runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingSleeper;

impl Sleeper for BlockingSleeper {
    fn sleep(&self, duration: Duration) {
        may::coroutine::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Maximum attempts and the delay preceding attempts 2..=max_attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Driver acquisition default: 10 attempts, 500ms apart.
    pub const DRIVER: RetryPolicy = RetryPolicy::fixed(10, Duration::from_millis(500));
    /// Migration execution default: 20 attempts, 500ms apart.
    pub const MIGRATE: RetryPolicy = RetryPolicy::fixed(20, Duration::from_millis(500));

    /// `max_attempts` is clamped to at least one.
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }
}

/// Classification of one failed attempt.
#[derive(Debug)]
pub struct RetryOutcome<'e, E> {
    pub attempt: u32,
    pub error: &'e E,
    pub retryable: bool,
}

impl<E: fmt::Display> RetryOutcome<'_, E> {
    fn log(&self, phase: &str, max_attempts: u32) {
        if self.retryable && self.attempt < max_attempts {
            log::info!(
                "{} failed due to lock contention, will retry attempt={} max_attempts={} error={}",
                phase,
                self.attempt,
                max_attempts,
                self.error
            );
        } else {
            log::error!(
                "{} failed attempt={} max_attempts={} retryable={} error={}",
                phase,
                self.attempt,
                max_attempts,
                self.retryable,
                self.error
            );
        }
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed with an error the classifier rejected.
    #[error("{error}")]
    Fatal { attempt: u32, error: E },
    /// Every attempt failed with a retryable error; `error` is the last one.
    #[error("{error} (gave up after {attempts} attempts)")]
    Exhausted { attempts: u32, error: E },
    /// The cancel token fired before the given attempt could start.
    #[error("cancelled before attempt {attempt}")]
    Cancelled { attempt: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// Number of attempts that actually ran.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempt, .. } => *attempt,
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempt, .. } => attempt.saturating_sub(1),
        }
    }

    /// The last error observed, if any attempt ran.
    pub fn into_error(self) -> Option<E> {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => Some(error),
            RetryError::Cancelled { last, .. } => last,
        }
    }
}

/// Runs one phase of the startup under a [`RetryPolicy`].
pub struct Retrier<'a> {
    phase: &'static str,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    cancel: &'a CancelToken,
}

impl<'a> Retrier<'a> {
    pub fn new(
        phase: &'static str,
        policy: RetryPolicy,
        sleeper: &'a dyn Sleeper,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            phase,
            policy,
            sleeper,
            cancel,
        }
    }

    /// Invoke `op` until it succeeds, fails fatally, or runs out of attempts.
    pub fn run<T, E, C, F>(&self, is_retryable: C, mut op: F) -> Result<T, RetryError<E>>
    where
        E: fmt::Display,
        C: Fn(&E) -> bool,
        F: FnMut(u32) -> Result<T, E>,
    {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::retry_phase_span(self.phase).entered();

        let max_attempts = self.policy.max_attempts;
        let mut last: Option<E> = None;
        let mut attempt = 1;

        loop {
            if attempt > 1 {
                if self.cancel.is_cancelled() {
                    return Err(RetryError::Cancelled { attempt, last });
                }
                log::info!(
                    "retrying {} attempt={} max_attempts={} delay_ms={}",
                    self.phase,
                    attempt,
                    max_attempts,
                    self.policy.delay.as_millis()
                );
                self.sleeper.sleep(self.policy.delay);
            }
            if self.cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempt, last });
            }

            #[cfg(feature = "metrics")]
            crate::metrics::METRICS.record_attempt(self.phase);

            let error = match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} succeeded attempt={}", self.phase, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let outcome = RetryOutcome {
                attempt,
                error: &error,
                retryable: is_retryable(&error),
            };
            outcome.log(self.phase, max_attempts);

            if !outcome.retryable {
                return Err(RetryError::Fatal { attempt, error });
            }
            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }
            last = Some(error);
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested sleeps instead of blocking.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn recorded(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn lockish(e: &String) -> bool {
        e.contains("lock")
    }

    #[test]
    fn test_first_attempt_runs_without_delay() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("driver", RetryPolicy::DRIVER, &sleeper, &cancel);

        let value = retrier.run(lockish, |_| Ok::<_, String>(7)).unwrap();
        assert_eq!(value, 7);
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn test_succeeds_on_last_attempt_with_fixed_delays() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("driver", RetryPolicy::DRIVER, &sleeper, &cancel);

        let mut calls = 0;
        let value = retrier
            .run(lockish, |attempt| {
                calls += 1;
                if attempt < 10 {
                    Err("could not obtain lock".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();

        assert_eq!(value, 10);
        assert_eq!(calls, 10);
        assert_eq!(sleeper.recorded(), vec![Duration::from_millis(500); 9]);
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("migrate", RetryPolicy::MIGRATE, &sleeper, &cancel);

        let err = retrier
            .run(lockish, |attempt| Err::<(), _>(format!("lock busy #{attempt}")))
            .unwrap_err();

        assert_eq!(err.attempts(), 20);
        match err {
            RetryError::Exhausted { attempts, error } => {
                assert_eq!(attempts, 20);
                assert_eq!(error, "lock busy #20");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(sleeper.recorded().len(), 19);
    }

    #[test]
    fn test_fatal_error_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("migrate", RetryPolicy::MIGRATE, &sleeper, &cancel);

        let mut calls = 0;
        let err = retrier
            .run(lockish, |_| {
                calls += 1;
                Err::<(), _>("syntax error at or near \"CREAT\"".to_string())
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, RetryError::Fatal { attempt: 1, .. }));
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn test_fatal_after_retryable() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("migrate", RetryPolicy::MIGRATE, &sleeper, &cancel);

        let err = retrier
            .run(lockish, |attempt| {
                if attempt == 1 {
                    Err::<(), _>("lock".to_string())
                } else {
                    Err("permission denied".to_string())
                }
            })
            .unwrap_err();

        assert!(matches!(err, RetryError::Fatal { attempt: 2, .. }));
        assert_eq!(sleeper.recorded().len(), 1);
    }

    #[test]
    fn test_single_attempt_policy_never_sleeps() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        let retrier = Retrier::new("driver", policy, &sleeper, &cancel);

        let err = retrier
            .run(lockish, |_| Err::<(), _>("lock".to_string()))
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 1, .. }));
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn test_cancel_between_attempts() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancelToken::new();
        let retrier = Retrier::new("driver", RetryPolicy::DRIVER, &sleeper, &cancel);

        let err = retrier
            .run(lockish, |_| {
                cancel.cancel();
                Err::<(), _>("lock".to_string())
            })
            .unwrap_err();

        match err {
            RetryError::Cancelled { attempt, last } => {
                assert_eq!(attempt, 2);
                assert_eq!(last.as_deref(), Some("lock"));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(sleeper.recorded().is_empty());
    }
}
