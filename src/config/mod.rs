//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment (BOB_* variables)
//!     → loader.rs (lookup, parse, apply defaults)
//!     → validation.rs (correct out-of-range values)
//!     → Configuration (resolved, immutable)
//!     → passed by reference to startup, connectors and deployer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults; loading never fails
//! - Malformed values fall back to defaults with a warning

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    ApiConfig, Configuration, ConnectionConfig, HealthCheckConfig, QueueConfig, StorageConfig,
};
