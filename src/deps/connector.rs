//! Bounded-retry connection to a dependency.

use crate::deps::{AttemptError, Connector};
use crate::error::ConnectionError;
use crate::observability::metrics;
use crate::resilience::retries::{retry, AttemptState, GiveUp, RetryError, RetryPolicy, Retried};

/// Connect to a dependency, retrying transient failures under `policy`.
///
/// Returns the ready handle, or a [`ConnectionError`] carrying the last
/// cause once the budget is spent or a non-retryable error occurs. Failed
/// attempts never leave a connection open; collaborators drop partial
/// connections before returning an error.
pub async fn connect<C: Connector>(
    connector: &C,
    policy: &RetryPolicy,
) -> Result<C::Handle, ConnectionError> {
    let dependency = connector.dependency();
    let max_attempts = policy.max_attempts();

    tracing::info!(
        dependency = %dependency,
        endpoint = %connector.endpoint(),
        max_attempts,
        delay = ?policy.delay(),
        "Connecting to dependency"
    );

    let result = retry(
        policy,
        |attempt| async move {
            let outcome = connector.attempt().await;
            if let Err(e @ AttemptError::Transient(_)) = &outcome {
                tracing::warn!(
                    dependency = %dependency,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Dependency unreachable"
                );
            }
            outcome
        },
        |state| {
            if let AttemptState::Attempting { attempt } = state {
                tracing::debug!(dependency = %dependency, attempt, "Connection attempt");
            }
            if let Some(outcome) = attempt_outcome(state) {
                metrics::record_connection_attempt(dependency, outcome);
            }
        },
    )
    .await;

    match result {
        Ok(Retried { value, attempts }) => {
            tracing::info!(dependency = %dependency, attempts, "Dependency connected");
            Ok(value)
        }
        Err(RetryError {
            error,
            attempts,
            reason,
        }) => {
            let reason = match reason {
                GiveUp::Exhausted => "retry budget exhausted",
                GiveUp::NonRetryable => "non-retryable error",
            };
            tracing::debug!(dependency = %dependency, attempts, reason, "Giving up on dependency");
            Err(ConnectionError {
                dependency,
                attempts,
                cause: error.into_cause(),
            })
        }
    }
}

/// Metric label for an attempt that just finished, if `state` is one.
fn attempt_outcome(state: AttemptState) -> Option<&'static str> {
    match state {
        AttemptState::Succeeded { .. } => Some("connected"),
        AttemptState::TransientFailure { .. } => Some("transient"),
        AttemptState::TerminalFailure { .. } => Some("failed"),
        AttemptState::Idle | AttemptState::Attempting { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{Dependency, DependencyHandle};
    use crate::error::BoxError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Handle;

    #[async_trait]
    impl DependencyHandle for Handle {
        async fn check(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    /// Fails with the given error until `succeed_on` is reached.
    struct Flaky {
        calls: AtomicU32,
        succeed_on: Option<u32>,
        fatal: bool,
    }

    #[async_trait]
    impl Connector for Flaky {
        type Handle = Handle;

        fn dependency(&self) -> Dependency {
            Dependency::Queue
        }

        fn endpoint(&self) -> String {
            "localhost:5672".into()
        }

        async fn attempt(&self) -> Result<Handle, AttemptError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(n) if call >= n => Ok(Handle),
                _ if self.fatal => Err(AttemptError::fatal("ACCESS_REFUSED")),
                _ => Err(AttemptError::transient("connection refused")),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_last_cause() {
        let connector = Flaky {
            calls: AtomicU32::new(0),
            succeed_on: None,
            fatal: false,
        };
        let policy = RetryPolicy::new(3, Duration::from_millis(2000));

        let err = connect(&connector, &policy).await.err().unwrap();

        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.dependency, Dependency::Queue);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.cause.to_string(), "connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_uses_one_attempt() {
        let connector = Flaky {
            calls: AtomicU32::new(0),
            succeed_on: None,
            fatal: true,
        };
        let policy = RetryPolicy::new(10, Duration::from_millis(2000));

        let err = connect(&connector, &policy).await.err().unwrap();

        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.cause.to_string(), "ACCESS_REFUSED");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_budget() {
        let connector = Flaky {
            calls: AtomicU32::new(0),
            succeed_on: Some(2),
            fatal: false,
        };
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        assert!(connect(&connector, &policy).await.is_ok());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn only_finished_attempts_are_counted() {
        assert_eq!(attempt_outcome(AttemptState::Idle), None);
        assert_eq!(attempt_outcome(AttemptState::Attempting { attempt: 1 }), None);
        assert_eq!(
            attempt_outcome(AttemptState::TransientFailure { attempt: 1 }),
            Some("transient")
        );
        assert_eq!(
            attempt_outcome(AttemptState::TerminalFailure { attempt: 3 }),
            Some("failed")
        );
        assert_eq!(
            attempt_outcome(AttemptState::Succeeded { attempt: 2 }),
            Some("connected")
        );
    }
}
