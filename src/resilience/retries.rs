//! Retry logic.
//!
//! # Responsibilities
//! - Classify failures as transient or terminal
//! - Execute an operation up to a fixed attempt budget
//! - Wait a fixed delay between attempts
//! - Report how many attempts were consumed
//!
//! # Design Decisions
//! - Fixed delay, no exponential growth or jitter
//! - Terminal failures stop the loop without consuming the budget
//! - The delay is only awaited when another attempt will follow

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Classification of an error for retry purposes.
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_transient(&self) -> bool;
}

/// Attempt budget for a single retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is raised to 1 if zero.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Per-attempt state of a retried operation.
///
/// ```text
/// Idle → Attempting → Succeeded
///                   → TransientFailure → Attempting (budget remains)
///                                      → TerminalFailure (budget spent)
///                   → TerminalFailure (non-retryable error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Attempting { attempt: u32 },
    TransientFailure { attempt: u32 },
    Succeeded { attempt: u32 },
    TerminalFailure { attempt: u32 },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::TerminalFailure { .. })
    }
}

/// A successful result and the attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why the retry loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUp {
    /// Every attempt failed transiently.
    Exhausted,
    /// An attempt failed with a non-retryable error.
    NonRetryable,
}

/// The last error and the attempts consumed before giving up.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
    pub reason: GiveUp,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            GiveUp::Exhausted => write!(
                f,
                "gave up after {} attempt(s): {}",
                self.attempts, self.error
            ),
            GiveUp::NonRetryable => write!(f, "{}", self.error),
        }
    }
}

/// Run `operation` under `policy`.
///
/// `operation` receives the 1-based attempt number. `observe` is called on
/// every state transition.
pub async fn retry<T, E, F, Fut, O>(
    policy: &RetryPolicy,
    mut operation: F,
    mut observe: O,
) -> Result<Retried<T>, RetryError<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(AttemptState),
{
    let mut attempt = 0;
    observe(AttemptState::Idle);

    loop {
        attempt += 1;
        observe(AttemptState::Attempting { attempt });

        let error = match operation(attempt).await {
            Ok(value) => {
                observe(AttemptState::Succeeded { attempt });
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            observe(AttemptState::TerminalFailure { attempt });
            return Err(RetryError {
                error,
                attempts: attempt,
                reason: GiveUp::NonRetryable,
            });
        }

        if attempt >= policy.max_attempts {
            observe(AttemptState::TerminalFailure { attempt });
            return Err(RetryError {
                error,
                attempts: attempt,
                reason: GiveUp::Exhausted,
            });
        }

        observe(AttemptState::TransientFailure { attempt });
        tracing::debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay = ?policy.delay,
            error = %error,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[derive(Debug)]
    enum TestError {
        Refused,
        Rejected,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestError::Refused => write!(f, "connection refused"),
                TestError::Rejected => write!(f, "access refused"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Refused)
        }
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_consume_whole_budget() {
        let policy = RetryPolicy::new(4, Duration::from_millis(2000));
        let calls = Cell::new(0);
        let started = Instant::now();

        let result = retry(
            &policy,
            |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(TestError::Refused) }
            },
            |_| {},
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.get(), 4);
        assert_eq!(err.attempts, 4);
        assert_eq!(err.reason, GiveUp::Exhausted);
        // Three gaps between four attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(6000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(8000), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_stops_after_one_attempt() {
        let policy = RetryPolicy::new(10, Duration::from_millis(2000));
        let calls = Cell::new(0);
        let started = Instant::now();

        let err = retry(
            &policy,
            |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(TestError::Rejected) }
            },
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.reason, GiveUp::NonRetryable);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));

        let ok = retry(
            &policy,
            |attempt| async move {
                if attempt < 3 {
                    Err(TestError::Refused)
                } else {
                    Ok(attempt * 10)
                }
            },
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(ok.attempts, 3);
        assert_eq!(ok.value, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_every_transition() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let mut states = Vec::new();

        let _ = retry(
            &policy,
            |_| async { Err::<(), _>(TestError::Refused) },
            |state| states.push(state),
        )
        .await;

        assert_eq!(
            states,
            vec![
                AttemptState::Idle,
                AttemptState::Attempting { attempt: 1 },
                AttemptState::TransientFailure { attempt: 1 },
                AttemptState::Attempting { attempt: 2 },
                AttemptState::TerminalFailure { attempt: 2 },
            ]
        );
        assert!(states.last().unwrap().is_terminal());
    }
}
