//! Shared definitions for the pxs netboot supervisor.
//!
//! Plain data types only: the supervisor binary and the renderer library both
//! depend on this crate, so it must stay free of I/O and runtime concerns.

mod config;
mod health;
mod service;

pub use config::StackConfig;
pub use health::{HealthCheckResult, HealthReport, SupervisorPhase};
pub use service::{ServiceDescriptor, ServiceKind, Transport};
