//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection attempt to a dependency:
//!     → timeouts.rs (deadline per attempt)
//!     → On failure: retries.rs (transient? wait fixed delay, try again)
//!     → Budget spent or non-retryable: terminal failure
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only connectivity-class errors are retried
//! - Retry budget is a fixed attempt count with a fixed delay

pub mod retries;
pub mod timeouts;

pub use retries::{retry, RetryPolicy, Retryable};
