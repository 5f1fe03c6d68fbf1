//! AMQP message queue collaborator.
//!
//! # Responsibilities
//! - Open a broker connection per attempt (TCP connect + AMQP handshake)
//! - Authenticate with SASL PLAIN against the default virtual host
//! - Classify failures into transient and fatal
//! - Probe and close the connection on behalf of the deployer
//!
//! # Design Decisions
//! - Heartbeats are negotiated off; liveness is probed by the health monitor
//! - Rejected credentials and refused vhost access are fatal
//! - Anything that looks like the broker not being ready yet is transient

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::QueueConfig;
use crate::deps::amqp::{self, AmqpError, Method, ACCESS_REFUSED, NOT_ALLOWED, REPLY_SUCCESS};
use crate::deps::{AttemptError, Connector, Dependency, DependencyHandle};
use crate::error::BoxError;
use crate::resilience::timeouts::{with_timeout, CLOSE_TIMEOUT, CONNECT_TIMEOUT};

const VIRTUAL_HOST: &str = "/";
const MECHANISM: &str = "PLAIN";
const LOCALE: &str = "en_US";
const DEFAULT_FRAME_MAX: u32 = 131_072;

/// Failure while opening a broker connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Amqp(#[from] AmqpError),

    #[error("broker closed the connection: {code} {text}")]
    Closed { code: u16, text: String },

    #[error("broker does not offer PLAIN authentication (offered: {0})")]
    NoPlainMechanism(String),

    #[error("unexpected {0} during handshake")]
    Unexpected(&'static str),
}

impl HandshakeError {
    pub fn is_transient(&self) -> bool {
        match self {
            HandshakeError::Connect(_) => true,
            HandshakeError::Amqp(AmqpError::Io(_)) => true,
            HandshakeError::Amqp(_) => false,
            HandshakeError::Closed { code, .. } => !matches!(*code, ACCESS_REFUSED | NOT_ALLOWED),
            HandshakeError::NoPlainMechanism(_) => false,
            HandshakeError::Unexpected(_) => false,
        }
    }
}

impl From<HandshakeError> for AttemptError {
    fn from(error: HandshakeError) -> Self {
        if error.is_transient() {
            AttemptError::transient(error)
        } else {
            AttemptError::fatal(error)
        }
    }
}

/// Connects to the message broker.
#[derive(Debug, Clone)]
pub struct QueueConnector {
    config: QueueConfig,
}

impl QueueConnector {
    pub fn new(config: QueueConfig) -> Self {
        Self { config }
    }

    async fn open(&self) -> Result<TcpStream, HandshakeError> {
        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(HandshakeError::Connect)?;
        stream.set_nodelay(true).map_err(HandshakeError::Connect)?;

        handshake(&mut stream, &self.config.user, &self.config.password).await?;
        Ok(stream)
    }
}

#[async_trait]
impl Connector for QueueConnector {
    type Handle = QueueHandle;

    fn dependency(&self) -> Dependency {
        Dependency::Queue
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn attempt(&self) -> Result<QueueHandle, AttemptError> {
        // On error the stream is dropped inside `open`, closing the socket.
        match with_timeout(CONNECT_TIMEOUT, self.open()).await {
            Ok(Ok(stream)) => Ok(QueueHandle::new(stream)),
            Ok(Err(e)) => Err(e.into()),
            Err(elapsed) => Err(AttemptError::transient(elapsed)),
        }
    }
}

/// Run the client side of the connection handshake on `stream`.
pub async fn handshake(
    stream: &mut TcpStream,
    user: &str,
    password: &str,
) -> Result<(), HandshakeError> {
    use tokio::io::AsyncWriteExt;

    stream
        .write_all(amqp::PROTOCOL_HEADER)
        .await
        .map_err(AmqpError::from)?;

    let mechanisms = match amqp::read_method(stream).await? {
        Method::Start { mechanisms, .. } => mechanisms,
        other => return Err(HandshakeError::Unexpected(other.name())),
    };
    if !mechanisms.split_whitespace().any(|m| m == MECHANISM) {
        return Err(HandshakeError::NoPlainMechanism(mechanisms));
    }

    amqp::write_method(
        stream,
        &Method::StartOk {
            mechanism: MECHANISM.to_string(),
            response: Method::plain_credentials(user, password),
            locale: LOCALE.to_string(),
        },
    )
    .await?;

    let (channel_max, frame_max) = match expect_reply(stream).await? {
        Method::Tune {
            channel_max,
            frame_max,
            ..
        } => (channel_max, frame_max),
        other => return Err(HandshakeError::Unexpected(other.name())),
    };

    let frame_max = match frame_max {
        0 => DEFAULT_FRAME_MAX,
        n => n.min(DEFAULT_FRAME_MAX),
    };
    amqp::write_method(
        stream,
        &Method::TuneOk {
            channel_max,
            frame_max,
            heartbeat: 0,
        },
    )
    .await?;
    amqp::write_method(
        stream,
        &Method::Open {
            virtual_host: VIRTUAL_HOST.to_string(),
        },
    )
    .await?;

    match expect_reply(stream).await? {
        Method::OpenOk => Ok(()),
        other => Err(HandshakeError::Unexpected(other.name())),
    }
}

/// Read the broker's reply, turning `connection.close` into an error.
async fn expect_reply(stream: &mut TcpStream) -> Result<Method, HandshakeError> {
    match amqp::read_method(stream).await? {
        Method::Close {
            reply_code,
            reply_text,
            ..
        } => {
            // Best effort: the broker drops the socket either way.
            let _ = amqp::write_method(stream, &Method::CloseOk).await;
            Err(HandshakeError::Closed {
                code: reply_code,
                text: reply_text,
            })
        }
        method => Ok(method),
    }
}

/// An open broker connection.
#[derive(Debug)]
pub struct QueueHandle {
    stream: Mutex<Option<TcpStream>>,
}

impl QueueHandle {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl DependencyHandle for QueueHandle {
    async fn check(&self) -> Result<(), BoxError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or("queue connection closed")?;

        // The broker only sends unsolicited data to close the connection.
        let mut buf = [0u8; 64];
        match stream.try_read(&mut buf) {
            Ok(0) => return Err("broker closed the connection".into()),
            Ok(_) => return Err("broker is closing the connection".into()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        amqp::write_heartbeat(stream).await?;
        Ok(())
    }

    async fn close(&self) {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return;
        };

        match with_timeout(CLOSE_TIMEOUT, goodbye(&mut stream)).await {
            Ok(Ok(())) => tracing::debug!("Queue connection closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Queue connection closed uncleanly"),
            Err(e) => tracing::warn!(error = %e, "Queue connection close timed out"),
        }
    }
}

/// Politely close the connection and wait for the broker to confirm.
async fn goodbye(stream: &mut TcpStream) -> Result<(), AmqpError> {
    amqp::write_method(
        stream,
        &Method::Close {
            reply_code: REPLY_SUCCESS,
            reply_text: "Goodbye".to_string(),
            class_id: 0,
            method_id: 0,
        },
    )
    .await?;

    loop {
        if let Method::CloseOk = amqp::read_method(stream).await? {
            return Ok(());
        }
    }
}
