use std::time::Duration;

use common::{HealthCheckResult, HealthReport};
use futures::future::join_all;
use tracing::debug;

use crate::probe::HealthProbe;

/// Blanket per-probe deadline. Probes bound their own network calls below
/// this, so hitting it means a probe is wedged, and a wedged probe is a
/// failed probe, not a crash.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the probe battery and aggregates one report per pass.
///
/// `run` takes `&self` and touches no shared state, so concurrent passes
/// (the supervisor's periodic loop and an operator-triggered `pxs health`)
/// cannot corrupt each other.
pub struct HealthMonitor {
    probes: Vec<Box<dyn HealthProbe>>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(probes: Vec<Box<dyn HealthProbe>>) -> Self {
        Self {
            probes,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// One monitoring pass: every probe fans out as its own task with its
    /// own deadline, results come back in declaration order.
    pub async fn run(&self) -> HealthReport {
        debug!("running {} probes", self.probes.len());
        let checks = self.probes.iter().map(|probe| async move {
            match tokio::time::timeout(self.probe_timeout, probe.check()).await {
                Ok(result) => result,
                Err(_) => HealthCheckResult::fail(
                    probe.name(),
                    format!("probe did not finish within {:?}", self.probe_timeout),
                ),
            }
        });
        HealthReport::from_results(join_all(checks).await)
    }
}
