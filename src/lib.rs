//! Bob API server startup library.
//!
//! Reads `BOB_*` configuration from the environment, connects to PostgreSQL
//! storage and an AMQP broker with bounded retry, then serves the routes of
//! the API specification once both are reachable.

pub mod config;
pub mod deps;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::Configuration;
pub use error::{ConnectionError, DeploymentError, StartupError};
pub use http::{Deployment, ServiceDeployer};
pub use lifecycle::{DeploymentResult, Orchestrator, Shutdown};
