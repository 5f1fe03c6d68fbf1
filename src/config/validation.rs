//! Configuration validation.
//!
//! # Responsibilities
//! - Enforce value ranges the rest of the system relies on
//! - Correct out-of-range values instead of rejecting them
//!
//! # Design Decisions
//! - Loading never fails, so every violation has a defined correction
//! - Each correction is logged once at warn level

use crate::config::schema::{Configuration, HealthCheckConfig};

/// Correct settings that would violate runtime invariants.
pub fn normalize(config: &mut Configuration) {
    if config.connection.retry_attempts == 0 {
        tracing::warn!(
            retry_attempts = config.connection.retry_attempts,
            "Connection retry attempts must be at least 1, using 1"
        );
        config.connection.retry_attempts = 1;
    }

    if config.health_check.interval_ms == 0 {
        let default = HealthCheckConfig::default().interval_ms;
        tracing::warn!(
            interval_ms = default,
            "Health check interval must be positive, using default"
        );
        config.health_check.interval_ms = default;
    }
}
