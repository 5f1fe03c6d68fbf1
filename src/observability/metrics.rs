//! Metrics collection.
//!
//! # Metrics
//! - `bob_connection_attempts_total` (counter): attempts by dependency, outcome
//! - `bob_dependency_healthy` (gauge): 1=healthy, 0=unhealthy, by dependency
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the embedding process chooses
//!   the exporter
//! - Labels are static strings only

use crate::deps::Dependency;

/// Record the outcome of one connection attempt.
pub fn record_connection_attempt(dependency: Dependency, outcome: &'static str) {
    metrics::counter!(
        "bob_connection_attempts_total",
        "dependency" => dependency.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the latest health probe result for a dependency.
pub fn record_dependency_health(dependency: Dependency, healthy: bool) {
    metrics::gauge!("bob_dependency_healthy", "dependency" => dependency.as_str())
        .set(if healthy { 1.0 } else { 0.0 });
}
