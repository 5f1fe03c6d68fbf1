//! HTTP service subsystem.
//!
//! # Data Flow
//! ```text
//! Ready dependency handles
//!     → server.rs (load spec, bind listener, spawn server + health monitor)
//!     → api_spec.rs (OpenAPI document → declared operations)
//!     → router.rs (operations + /health → Axum router with middleware)
//!     → Serve until shutdown
//! ```

pub mod api_spec;
pub mod router;
pub mod server;

pub use server::{Deploy, DeploySettings, Deployment, ServiceDeployer, ServiceInstanceId};
