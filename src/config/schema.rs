//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API
//! server. Every field has a literal default so a bare environment yields a
//! runnable configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::resilience::retries::RetryPolicy;

/// Root configuration for the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Storage (PostgreSQL) connection settings.
    pub storage: StorageConfig,

    /// Message queue (AMQP) connection settings.
    pub queue: QueueConfig,

    /// API listener settings.
    pub api: ApiConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Dependency connection retry settings.
    pub connection: ConnectionConfig,
}

impl Configuration {
    /// Retry policy shared by both dependency connections.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connection.retry_attempts, self.connection.retry_delay())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Database name.
    pub database: String,

    /// Database host.
    pub host: String,

    /// Database port.
    pub port: u16,

    pub user: String,

    pub password: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "bob".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "bob".to_string(),
            password: "bob".to_string(),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Broker host.
    pub host: String,

    /// Broker port.
    pub port: u16,

    pub user: String,

    pub password: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

/// API listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Location of the OpenAPI document describing the served routes.
    pub spec_path: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7777,
            spec_path: PathBuf::from("/bob/api.yaml"),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Health check interval in milliseconds.
    pub interval_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}

/// Connection retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Maximum number of connection attempts per dependency.
    pub retry_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 10,
            retry_delay_ms: 2000,
        }
    }
}
