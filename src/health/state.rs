//! Dependency health state.
//!
//! # States
//! - Unknown: no probe has completed yet
//! - Healthy: last probe succeeded
//! - Unhealthy: last probe failed or timed out
//!
//! # Design Decisions
//! - Snapshots are immutable and swapped atomically
//! - Readers (the health endpoint) never block the monitor

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::deps::Dependency;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DependencyStatus {
    Unknown,
    Healthy,
    Unhealthy { error: String },
}

impl DependencyStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DependencyStatus::Healthy)
    }
}

/// Point-in-time view of both dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub storage: DependencyStatus,
    pub queue: DependencyStatus,
    /// Completed probe rounds.
    pub checks: u64,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.storage.is_healthy() && self.queue.is_healthy()
    }

    pub fn status(&self, dependency: Dependency) -> &DependencyStatus {
        match dependency {
            Dependency::Storage => &self.storage,
            Dependency::Queue => &self.queue,
        }
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            storage: DependencyStatus::Unknown,
            queue: DependencyStatus::Unknown,
            checks: 0,
        }
    }
}

/// Shared, lock-free holder of the latest snapshot.
#[derive(Debug, Default)]
pub struct HealthState {
    current: ArcSwap<HealthSnapshot>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: HealthSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}
