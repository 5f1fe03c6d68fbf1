//! Service deployment.
//!
//! # Responsibilities
//! - Load the API document
//! - Bind the listener on the configured address
//! - Serve the routes with the dependency handles as backing resources
//! - Run the recurring health check alongside the server
//! - Release the listener, timer and handles when the service stops
//!
//! # Design Decisions
//! - The API document is loaded before binding, so a bad document never
//!   opens a socket
//! - A failed deployment closes both handles before returning
//! - One supervising task owns the server, the monitor and the handles

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Configuration, HealthCheckConfig};
use crate::deps::Dependencies;
use crate::error::DeploymentError;
use crate::health::{HealthMonitor, HealthState};
use crate::http::api_spec::ApiSpec;
use crate::http::router::{build_router, AppState};
use crate::lifecycle::Shutdown;

/// Identifier of a running service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceInstanceId(Uuid);

impl ServiceInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServiceInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network and health parameters for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    pub bind_host: String,
    pub bind_port: u16,
    pub health_check_interval: Duration,
    pub api_spec: PathBuf,
}

impl DeploySettings {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            bind_host: config.api.host.clone(),
            bind_port: config.api.port,
            health_check_interval: config.health_check.interval(),
            api_spec: config.api.spec_path.clone(),
        }
    }

    /// Health-check period, with zero replaced by the configured default.
    pub fn health_interval(&self) -> Duration {
        if self.health_check_interval.is_zero() {
            HealthCheckConfig::default().interval()
        } else {
            self.health_check_interval
        }
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn bind_address(&self) -> String {
        if self.bind_host.contains(':') {
            format!("[{}]:{}", self.bind_host, self.bind_port)
        } else {
            format!("{}:{}", self.bind_host, self.bind_port)
        }
    }
}

/// Brings up the service once both dependencies are ready.
#[async_trait]
pub trait Deploy: Send + Sync {
    /// Start serving. On error, `dependencies` have been released.
    async fn deploy(
        &self,
        settings: &DeploySettings,
        dependencies: Dependencies,
    ) -> Result<Deployment, DeploymentError>;
}

/// Axum-based deployer.
#[derive(Debug, Clone, Default)]
pub struct ServiceDeployer;

impl ServiceDeployer {
    pub fn new() -> Self {
        Self
    }

    async fn start(
        &self,
        settings: &DeploySettings,
        dependencies: Dependencies,
    ) -> Result<Deployment, DeploymentError> {
        let spec = ApiSpec::load(&settings.api_spec).map_err(|source| DeploymentError::ApiSpec {
            path: settings.api_spec.clone(),
            source,
        })?;

        tracing::info!(
            path = %settings.api_spec.display(),
            title = %spec.title,
            version = %spec.version,
            operations = spec.operations.len(),
            "API specification loaded"
        );

        let address = settings.bind_address();
        let listener = TcpListener::bind((settings.bind_host.as_str(), settings.bind_port))
            .await
            .map_err(|e| DeploymentError::bind(address.clone(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DeploymentError::bind(address, e))?;

        tracing::info!(address = %local_addr, "Listener bound");

        let health = Arc::new(HealthState::new());
        let router = build_router(
            &spec,
            AppState {
                health: health.clone(),
                dependencies: dependencies.clone(),
            },
        );
        let interval = settings.health_interval();
        if interval != settings.health_check_interval {
            tracing::warn!(
                interval = ?interval,
                "Health check interval must be positive, using default"
            );
        }
        let monitor = HealthMonitor::new(dependencies.clone(), health, interval);

        let id = ServiceInstanceId::new();
        let shutdown = Shutdown::new();
        // Subscribe before spawning so an immediate trigger is not lost.
        let stop = Stop {
            server: Box::pin(shutdown.stopped()),
            monitor: shutdown.subscribe(),
            trigger: shutdown.clone(),
        };
        let task = tokio::spawn(supervise(id, listener, router, monitor, dependencies, stop));

        Ok(Deployment {
            id,
            local_addr,
            shutdown,
            task,
        })
    }
}

#[async_trait]
impl Deploy for ServiceDeployer {
    async fn deploy(
        &self,
        settings: &DeploySettings,
        dependencies: Dependencies,
    ) -> Result<Deployment, DeploymentError> {
        match self.start(settings, dependencies.clone()).await {
            Ok(deployment) => Ok(deployment),
            Err(e) => {
                dependencies.release().await;
                Err(e)
            }
        }
    }
}

/// Stop requests for the tasks of one deployment.
struct Stop {
    server: Pin<Box<dyn Future<Output = ()> + Send>>,
    monitor: broadcast::Receiver<()>,
    trigger: Shutdown,
}

/// Run the server until shutdown, then stop the monitor and close handles.
async fn supervise(
    id: ServiceInstanceId,
    listener: TcpListener,
    router: Router,
    monitor: HealthMonitor,
    dependencies: Dependencies,
    stop: Stop,
) -> io::Result<()> {
    let Stop {
        server,
        monitor: monitor_stop,
        trigger,
    } = stop;
    let monitor = tokio::spawn(monitor.run(monitor_stop));

    tracing::info!(instance = %id, "HTTP server starting");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(server)
        .await;

    if let Err(e) = &result {
        tracing::error!(instance = %id, error = %e, "HTTP server failed");
    }

    // The server may have stopped on its own; make sure the monitor follows.
    trigger.trigger();
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "Health monitor task failed");
    }

    dependencies.release().await;
    tracing::info!(instance = %id, "HTTP server stopped");
    result
}

/// A running service instance.
#[derive(Debug)]
pub struct Deployment {
    id: ServiceInstanceId,
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<io::Result<()>>,
}

impl Deployment {
    pub fn id(&self) -> ServiceInstanceId {
        self.id
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops this deployment when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wait until the service stops. Handles are closed on return.
    pub async fn wait(self) -> io::Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }

    /// Stop serving, stop health checks, close handles.
    pub async fn shutdown(self) -> io::Result<()> {
        self.shutdown.trigger();
        self.wait().await
    }
}
