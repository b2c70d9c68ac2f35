pub mod commands;
pub mod config;
pub mod launcher;
pub mod monitor;
pub mod probe;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod supervisor;

// re-export selected public API
pub use monitor::HealthMonitor;
pub use supervisor::Supervisor;
