//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Recurring health checks (monitor.rs):
//!     Periodic timer (health-check interval)
//!     → Probe storage and queue handles concurrently
//!     → Publish snapshot to state.rs
//!
//! Health endpoint (http/router.rs):
//!     GET /health → read latest snapshot
//! ```
//!
//! # Design Decisions
//! - The monitor owns only the cadence; probe semantics belong to handles
//! - Every probe is bounded by a timeout
//! - The monitor stops on the shutdown broadcast

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::{DependencyStatus, HealthSnapshot, HealthState};
