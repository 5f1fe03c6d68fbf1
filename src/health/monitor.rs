//! Recurring dependency health checks.
//!
//! # Responsibilities
//! - Periodically probe both dependency handles
//! - Publish the results to the shared health state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::deps::{Dependencies, Dependency, DependencyHandle};
use crate::health::state::{DependencyStatus, HealthSnapshot, HealthState};
use crate::observability::metrics;
use crate::resilience::timeouts::{with_timeout, PROBE_TIMEOUT};

pub struct HealthMonitor {
    dependencies: Dependencies,
    state: Arc<HealthState>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(dependencies: Dependencies, state: Arc<HealthState>, interval: Duration) -> Self {
        Self {
            dependencies,
            state,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Health monitor starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        let timeout = self.interval.min(PROBE_TIMEOUT);

        let (storage, queue) = tokio::join!(
            probe(Dependency::Storage, self.dependencies.storage.as_ref(), timeout),
            probe(Dependency::Queue, self.dependencies.queue.as_ref(), timeout),
        );

        let previous = self.state.snapshot();
        for (dependency, status) in [(Dependency::Storage, &storage), (Dependency::Queue, &queue)] {
            if previous.status(dependency).is_healthy() != status.is_healthy() {
                match status {
                    DependencyStatus::Healthy => {
                        tracing::info!(dependency = %dependency, "Dependency healthy")
                    }
                    DependencyStatus::Unhealthy { error } => {
                        tracing::warn!(dependency = %dependency, error = %error, "Dependency unhealthy")
                    }
                    DependencyStatus::Unknown => {}
                }
            }
            metrics::record_dependency_health(dependency, status.is_healthy());
        }

        self.state.publish(HealthSnapshot {
            storage,
            queue,
            checks: previous.checks + 1,
        });
    }
}

async fn probe(
    dependency: Dependency,
    handle: &dyn DependencyHandle,
    timeout: Duration,
) -> DependencyStatus {
    match with_timeout(timeout, handle.check()).await {
        Ok(Ok(())) => DependencyStatus::Healthy,
        Ok(Err(e)) => {
            tracing::debug!(dependency = %dependency, error = %e, "Health probe failed");
            DependencyStatus::Unhealthy {
                error: e.to_string(),
            }
        }
        Err(e) => DependencyStatus::Unhealthy {
            error: e.to_string(),
        },
    }
}
