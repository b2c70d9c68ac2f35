use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one probe run. Produced fresh on every monitoring pass and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check: String,
    pub passed: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn pass(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: true,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn fail(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: false,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated result of running the full probe battery once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub results: Vec<HealthCheckResult>,
    pub failures: usize,
    pub finished_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_results(results: Vec<HealthCheckResult>) -> Self {
        let failures = results.iter().filter(|r| !r.passed).count();
        Self {
            results,
            failures,
            finished_at: Utc::now(),
        }
    }

    /// Healthy iff every single check passed.
    pub fn healthy(&self) -> bool {
        self.failures == 0
    }
}

/// Lifecycle phase of the supervisor. Transitions are one-directional except
/// Monitoring, which loops until a termination signal arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorPhase {
    Initializing,
    Rendering,
    Launching,
    Monitoring,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorPhase::Initializing => "initializing",
            SupervisorPhase::Rendering => "rendering",
            SupervisorPhase::Launching => "launching",
            SupervisorPhase::Monitoring => "monitoring",
            SupervisorPhase::ShuttingDown => "shutting-down",
            SupervisorPhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
