//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bob_apiserver::config::Configuration;
use bob_apiserver::deps::amqp::{self, Method, ACCESS_REFUSED};
use bob_apiserver::deps::{AttemptError, Connector, Dependencies, Dependency, DependencyHandle};
use bob_apiserver::error::{BoxError, DeploymentError};
use bob_apiserver::http::{Deploy, DeploySettings, Deployment, ServiceDeployer};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

pub const API_SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Bob API
  version: 1.0.0
paths:
  /can-we-build-it:
    get:
      operationId: HealthCheck
  /pipelines/groups/{group}/names/{name}:
    post:
      operationId: PipelineCreate
    delete:
      operationId: PipelineDelete
"#;

/// Write an API document to a temporary file.
pub fn api_spec_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Configuration for tests: ephemeral port, short delays.
pub fn test_config(spec: &NamedTempFile) -> Configuration {
    let mut config = Configuration::default();
    config.api.host = "127.0.0.1".to_string();
    config.api.port = 0;
    config.api.spec_path = spec.path().to_path_buf();
    config.health_check.interval_ms = 50;
    config.connection.retry_attempts = 3;
    config.connection.retry_delay_ms = 10;
    config
}

/// How a [`FakeConnector`] answers connection attempts.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Succeed,
    /// Transient failures until the given attempt succeeds.
    SucceedOn(u32),
    AlwaysTransient,
    Fatal,
    /// Every attempt stalls forever.
    Hang,
}

/// Observable state of a fake handle.
#[derive(Debug, Default)]
pub struct HandleProbe {
    pub healthy: AtomicBool,
    pub closed: AtomicBool,
    pub checks: AtomicU32,
}

impl HandleProbe {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

pub struct FakeHandle {
    probe: Arc<HandleProbe>,
}

#[async_trait]
impl DependencyHandle for FakeHandle {
    async fn check(&self) -> Result<(), BoxError> {
        self.probe.checks.fetch_add(1, Ordering::SeqCst);
        if self.probe.is_closed() {
            return Err("closed".into());
        }
        if self.probe.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err("probe failed".into())
        }
    }

    async fn close(&self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector with scripted outcomes and an attempt counter.
pub struct FakeConnector {
    dependency: Dependency,
    script: Script,
    attempts: Arc<AtomicU32>,
    probe: Arc<HandleProbe>,
}

impl FakeConnector {
    pub fn new(dependency: Dependency, script: Script) -> Self {
        let probe = HandleProbe::default();
        probe.set_healthy(true);
        Self {
            dependency,
            script,
            attempts: Arc::new(AtomicU32::new(0)),
            probe: Arc::new(probe),
        }
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }

    pub fn probe(&self) -> Arc<HandleProbe> {
        self.probe.clone()
    }

    /// A ready handle sharing this connector's probe.
    pub fn handle(&self) -> FakeHandle {
        FakeHandle {
            probe: self.probe.clone(),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Handle = FakeHandle;

    fn dependency(&self) -> Dependency {
        self.dependency
    }

    fn endpoint(&self) -> String {
        format!("fake-{}", self.dependency)
    }

    async fn attempt(&self) -> Result<FakeHandle, AttemptError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script {
            Script::Succeed => Ok(self.handle()),
            Script::SucceedOn(n) if attempt >= n => Ok(self.handle()),
            Script::SucceedOn(_) | Script::AlwaysTransient => {
                Err(AttemptError::transient(format!("{} unreachable", self.dependency)))
            }
            Script::Fatal => Err(AttemptError::fatal("authentication failed")),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// Build both handles directly, bypassing the connectors' retry loop.
pub fn dependencies(storage: &FakeConnector, queue: &FakeConnector) -> Dependencies {
    Dependencies::new(Arc::new(storage.handle()), Arc::new(queue.handle()))
}

/// Counts deploy calls, delegating to the real deployer.
#[derive(Default)]
pub struct CountingDeployer {
    pub calls: Arc<AtomicU32>,
    inner: ServiceDeployer,
}

impl CountingDeployer {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deploy for CountingDeployer {
    async fn deploy(
        &self,
        settings: &DeploySettings,
        dependencies: Dependencies,
    ) -> Result<Deployment, DeploymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.deploy(settings, dependencies).await
    }
}

/// Minimal AMQP broker speaking the connection handshake.
pub struct MockBroker {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicU32>,
    pub closed_cleanly: Arc<AtomicU32>,
}

impl MockBroker {
    /// Accepts `user`/`password`, refuses anything else with 403.
    pub async fn start(user: &'static str, password: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let closed_cleanly = Arc::new(AtomicU32::new(0));

        let accepted = connections.clone();
        let clean = closed_cleanly.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let clean = clean.clone();
                tokio::spawn(async move {
                    if let Ok(true) = serve_connection(socket, user, password).await {
                        clean.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            closed_cleanly,
        }
    }

    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn closed_cleanly(&self) -> u32 {
        self.closed_cleanly.load(Ordering::SeqCst)
    }
}

/// Returns `Ok(true)` when the client closed the connection with `connection.close`.
async fn serve_connection(
    mut socket: TcpStream,
    user: &str,
    password: &str,
) -> Result<bool, amqp::AmqpError> {
    let mut header = [0u8; 8];
    socket.read_exact(&mut header).await?;
    if &header != amqp::PROTOCOL_HEADER {
        return Ok(false);
    }

    amqp::write_method(
        &mut socket,
        &Method::Start {
            version_major: 0,
            version_minor: 9,
            mechanisms: "PLAIN AMQPLAIN".to_string(),
            locales: "en_US".to_string(),
        },
    )
    .await?;

    let response = match amqp::read_method(&mut socket).await? {
        Method::StartOk { response, .. } => response,
        _ => return Ok(false),
    };

    if response != Method::plain_credentials(user, password) {
        amqp::write_method(
            &mut socket,
            &Method::Close {
                reply_code: ACCESS_REFUSED,
                reply_text: "ACCESS_REFUSED - Login was refused".to_string(),
                class_id: 0,
                method_id: 0,
            },
        )
        .await?;
        return Ok(false);
    }

    amqp::write_method(
        &mut socket,
        &Method::Tune {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 60,
        },
    )
    .await?;

    match amqp::read_method(&mut socket).await? {
        Method::TuneOk { .. } => {}
        _ => return Ok(false),
    }
    match amqp::read_method(&mut socket).await? {
        Method::Open { .. } => {}
        _ => return Ok(false),
    }
    amqp::write_method(&mut socket, &Method::OpenOk).await?;

    loop {
        match amqp::read_method(&mut socket).await {
            Ok(Method::Close { .. }) => {
                amqp::write_method(&mut socket, &Method::CloseOk).await?;
                return Ok(true);
            }
            Ok(_) => continue,
            Err(_) => return Ok(false),
        }
    }
}
