//! External dependency subsystem.
//!
//! # Data Flow
//! ```text
//! Connection parameters (from Configuration)
//!     → storage.rs / queue.rs (one connection attempt, classified failure)
//!     → connector.rs (retry budget, terminal ConnectionError)
//!     → DependencyHandle (ready connection, owned by startup)
//!     → handed to the deployer, closed when the service stops
//! ```
//!
//! # Design Decisions
//! - Collaborators expose a single attempt; retrying lives in connector.rs
//! - Each collaborator decides which of its errors are transient
//! - Handles are object-safe so the deployer never sees concrete drivers

pub mod amqp;
pub mod connector;
pub mod queue;
pub mod storage;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::BoxError;
use crate::resilience::Retryable;

pub use connector::connect;
pub use queue::{QueueConnector, QueueHandle};
pub use storage::{StorageConnector, StorageHandle};

/// The external systems the service depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Storage,
    Queue,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Storage => "storage",
            Dependency::Queue => "queue",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single failed connection attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Connectivity failure; another attempt may succeed.
    #[error("{0}")]
    Transient(BoxError),

    /// Failure that retrying cannot fix (e.g. rejected credentials).
    #[error("{0}")]
    Fatal(BoxError),
}

impl AttemptError {
    pub fn transient(cause: impl Into<BoxError>) -> Self {
        Self::Transient(cause.into())
    }

    pub fn fatal(cause: impl Into<BoxError>) -> Self {
        Self::Fatal(cause.into())
    }

    pub fn into_cause(self) -> BoxError {
        match self {
            Self::Transient(cause) | Self::Fatal(cause) => cause,
        }
    }
}

impl Retryable for AttemptError {
    fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transient(_))
    }
}

/// A ready connection to a dependency.
#[async_trait]
pub trait DependencyHandle: Send + Sync + 'static {
    /// Verify the connection is still alive.
    async fn check(&self) -> Result<(), BoxError>;

    /// Close the connection. Idempotent; never fails.
    async fn close(&self);
}

/// Opens connections to one dependency.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: DependencyHandle;

    fn dependency(&self) -> Dependency;

    /// Human-readable address for logs. Never includes credentials.
    fn endpoint(&self) -> String;

    /// Make exactly one connection attempt.
    async fn attempt(&self) -> Result<Self::Handle, AttemptError>;
}

/// Both ready dependency handles, as handed to the deployer.
#[derive(Clone)]
pub struct Dependencies {
    pub storage: Arc<dyn DependencyHandle>,
    pub queue: Arc<dyn DependencyHandle>,
}

impl Dependencies {
    pub fn new(storage: Arc<dyn DependencyHandle>, queue: Arc<dyn DependencyHandle>) -> Self {
        Self { storage, queue }
    }

    /// Close both handles.
    pub async fn release(&self) {
        tokio::join!(self.storage.close(), self.queue.close());
        tracing::debug!("Dependency handles released");
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies").finish_non_exhaustive()
    }
}
