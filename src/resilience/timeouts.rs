//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound every dependency round trip with a deadline
//! - Report an elapsed deadline as its own error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timed-out connection attempt counts as transient

use std::future::Future;
use std::time::Duration;

/// Deadline for a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single health probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for closing a dependency connection.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `future` with a deadline.
pub async fn with_timeout<F: Future>(deadline: Duration, future: F) -> Result<F::Output, Elapsed> {
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| Elapsed(deadline))
}
