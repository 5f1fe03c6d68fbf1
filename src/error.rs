//! Startup error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::deps::Dependency;
use crate::http::api_spec::ApiSpecError;

/// Boxed cause reported by a dependency collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A dependency could not be connected within its retry budget.
#[derive(Debug, Error)]
#[error("failed to connect to {dependency} after {attempts} attempt(s): {cause}")]
pub struct ConnectionError {
    pub dependency: Dependency,
    pub attempts: u32,
    #[source]
    pub cause: BoxError,
}

/// The service could not be brought up once dependencies were ready.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("bind address {address} is already in use")]
    AddressInUse {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("failed to load API specification {}: {source}", path.display())]
    ApiSpec { path: PathBuf, source: ApiSpecError },
}

impl DeploymentError {
    /// Classify a bind failure.
    pub fn bind(address: String, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            Self::AddressInUse { address, source }
        } else {
            Self::Bind { address, source }
        }
    }
}

/// Terminal outcome of a failed startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),
}

impl StartupError {
    /// The dependency that failed, if the failure was a connection failure.
    pub fn dependency(&self) -> Option<Dependency> {
        match self {
            StartupError::Connection(e) => Some(e.dependency),
            StartupError::Deployment(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_in_use_is_a_bind_conflict() {
        let err = DeploymentError::bind(
            "0.0.0.0:7777".into(),
            io::Error::from(io::ErrorKind::AddrInUse),
        );
        assert!(matches!(err, DeploymentError::AddressInUse { .. }));
        assert_eq!(err.to_string(), "bind address 0.0.0.0:7777 is already in use");
    }

    #[test]
    fn other_bind_failures_keep_their_cause() {
        let err = DeploymentError::bind(
            "10.0.0.1:80".into(),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, DeploymentError::Bind { .. }));
    }

    #[test]
    fn connection_error_names_dependency() {
        let err = StartupError::from(ConnectionError {
            dependency: Dependency::Storage,
            attempts: 3,
            cause: "connection refused".into(),
        });

        assert_eq!(err.dependency(), Some(Dependency::Storage));
        assert_eq!(
            err.to_string(),
            "failed to connect to storage after 3 attempt(s): connection refused"
        );
    }
}
