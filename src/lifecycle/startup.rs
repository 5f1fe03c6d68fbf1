//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration
//! - Connect storage and queue concurrently under one retry policy
//! - Deploy the service only once both handles are ready
//! - Report the terminal outcome exactly once
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, no degraded mode
//! - The first connection failure wins; the sibling attempt is abandoned
//!   if still running, or its handle closed if it already connected
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use crate::config::Configuration;
use crate::deps::{
    connect, Connector, Dependencies, DependencyHandle, QueueConnector, StorageConnector,
};
use crate::error::{ConnectionError, StartupError};
use crate::http::server::{Deploy, DeploySettings, Deployment, ServiceDeployer};
use crate::resilience::RetryPolicy;

/// Outcome of a startup run.
pub type DeploymentResult = Result<Deployment, StartupError>;

/// Load configuration from the environment and start the service.
pub async fn run() -> DeploymentResult {
    let config = Configuration::load();
    Orchestrator::from_config(config).run().await
}

/// Sequences dependency connections and deployment.
pub struct Orchestrator<S, Q, D> {
    config: Configuration,
    storage: S,
    queue: Q,
    deployer: D,
}

impl Orchestrator<StorageConnector, QueueConnector, ServiceDeployer> {
    /// Production wiring: PostgreSQL storage, AMQP queue, Axum server.
    pub fn from_config(config: Configuration) -> Self {
        let storage = StorageConnector::new(config.storage.clone());
        let queue = QueueConnector::new(config.queue.clone());
        Self::new(config, storage, queue, ServiceDeployer::new())
    }
}

impl<S, Q, D> Orchestrator<S, Q, D>
where
    S: Connector,
    Q: Connector,
    D: Deploy,
{
    pub fn new(config: Configuration, storage: S, queue: Q, deployer: D) -> Self {
        Self {
            config,
            storage,
            queue,
            deployer,
        }
    }

    /// Connect both dependencies, then deploy.
    pub async fn run(&self) -> DeploymentResult {
        let result = self.start().await;

        match &result {
            Ok(deployment) => tracing::info!(
                instance = %deployment.id(),
                address = %deployment.local_addr(),
                "Deployed service instance"
            ),
            Err(StartupError::Connection(e)) => tracing::error!(
                dependency = %e.dependency,
                attempts = e.attempts,
                cause = %e.cause,
                "Deployment error"
            ),
            Err(e) => tracing::error!(error = %e, "Deployment error"),
        }

        result
    }

    async fn start(&self) -> DeploymentResult {
        let policy = self.config.retry_policy();
        let dependencies = self.connect_all(&policy).await?;

        let settings = DeploySettings::from_config(&self.config);
        let deployment = self.deployer.deploy(&settings, dependencies).await?;
        Ok(deployment)
    }

    async fn connect_all(&self, policy: &RetryPolicy) -> Result<Dependencies, ConnectionError> {
        let storage = connect(&self.storage, policy);
        let queue = connect(&self.queue, policy);
        tokio::pin!(storage, queue);

        // Returning early drops the unfinished sibling, which cancels its
        // attempt and closes any socket it holds.
        tokio::select! {
            result = &mut storage => {
                let storage = result?;
                let queue = finish_sibling(&storage, queue.await).await?;
                Ok(Dependencies::new(Arc::new(storage), Arc::new(queue)))
            }
            result = &mut queue => {
                let queue = result?;
                let storage = finish_sibling(&queue, storage.await).await?;
                Ok(Dependencies::new(Arc::new(storage), Arc::new(queue)))
            }
        }
    }
}

/// Close `connected` if its sibling failed.
async fn finish_sibling<H, T>(
    connected: &H,
    sibling: Result<T, ConnectionError>,
) -> Result<T, ConnectionError>
where
    H: DependencyHandle,
{
    if sibling.is_err() {
        connected.close().await;
    }
    sibling
}
