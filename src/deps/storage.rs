//! PostgreSQL storage collaborator.
//!
//! # Responsibilities
//! - Open a single PostgreSQL connection per attempt
//! - Classify driver errors into transient and fatal
//! - Probe and close the connection on behalf of the deployer

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::sync::Mutex;

use crate::config::StorageConfig;
use crate::deps::{AttemptError, Connector, Dependency, DependencyHandle};
use crate::error::BoxError;
use crate::resilience::timeouts::{with_timeout, CLOSE_TIMEOUT, CONNECT_TIMEOUT};

/// SQLSTATE raised while the server is starting up or shutting down.
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Connects to the storage database.
#[derive(Debug, Clone)]
pub struct StorageConnector {
    config: StorageConfig,
}

impl StorageConnector {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.database)
            .application_name(env!("CARGO_PKG_NAME"))
    }
}

#[async_trait]
impl Connector for StorageConnector {
    type Handle = StorageHandle;

    fn dependency(&self) -> Dependency {
        Dependency::Storage
    }

    fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.config.host, self.config.port, self.config.database
        )
    }

    async fn attempt(&self) -> Result<StorageHandle, AttemptError> {
        let options = self.options();

        match with_timeout(CONNECT_TIMEOUT, PgConnection::connect_with(&options)).await {
            Ok(Ok(connection)) => Ok(StorageHandle::new(connection)),
            Ok(Err(e)) => Err(classify(e)),
            Err(elapsed) => Err(AttemptError::transient(elapsed)),
        }
    }
}

/// Map a driver error onto the retry classification.
///
/// Only connectivity failures are transient. Authentication failures
/// (`28xxx`), unknown databases (`3D000`), TLS and protocol errors are not.
pub fn classify(error: sqlx::Error) -> AttemptError {
    let transient = match &error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().as_deref() == Some(CANNOT_CONNECT_NOW),
        _ => false,
    };

    if transient {
        AttemptError::transient(error)
    } else {
        AttemptError::fatal(error)
    }
}

/// An open storage connection.
#[derive(Debug)]
pub struct StorageHandle {
    connection: Mutex<Option<PgConnection>>,
}

impl StorageHandle {
    fn new(connection: PgConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
        }
    }
}

#[async_trait]
impl DependencyHandle for StorageHandle {
    async fn check(&self) -> Result<(), BoxError> {
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or("storage connection closed")?;
        connection.ping().await?;
        Ok(())
    }

    async fn close(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };

        match with_timeout(CLOSE_TIMEOUT, connection.close()).await {
            Ok(Ok(())) => tracing::debug!("Storage connection closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Storage connection closed uncleanly"),
            Err(e) => tracing::warn!(error = %e, "Storage connection close timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::Retryable;
    use std::io;

    #[test]
    fn io_errors_are_transient() {
        let err = classify(sqlx::Error::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
        assert!(err.is_transient());
    }

    #[test]
    fn pool_timeout_is_transient() {
        assert!(classify(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn configuration_and_protocol_errors_are_fatal() {
        assert!(!classify(sqlx::Error::Configuration("bad url".into())).is_transient());
        assert!(!classify(sqlx::Error::Protocol("unexpected message".into())).is_transient());
    }

    #[test]
    fn endpoint_omits_credentials() {
        let connector = StorageConnector::new(StorageConfig::default());
        let endpoint = connector.endpoint();

        assert_eq!(endpoint, "localhost:5432/bob");
        assert_eq!(connector.dependency(), Dependency::Storage);
    }

    #[tokio::test]
    async fn closed_handle_fails_check() {
        let handle = StorageHandle {
            connection: Mutex::new(None),
        };

        assert!(handle.check().await.is_err());
        handle.close().await;
    }
}
