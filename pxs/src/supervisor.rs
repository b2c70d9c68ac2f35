use std::time::Duration;

use anyhow::{Context, Result};
use common::{ServiceDescriptor, StackConfig, SupervisorPhase};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::launcher::{self, ProcessHandle, STARTUP_TIMEOUT};
use crate::monitor::HealthMonitor;
use crate::probe::standard_probes;
use crate::server::ReportSlot;
use crate::services::managed_services;
use crate::shutdown::ShutdownCoordinator;

/// Top-level lifecycle: validate → render → launch → monitor until a
/// termination signal arrives, then stop everything in reverse order.
///
/// Owns every managed process; phases move one way, except Monitoring,
/// which loops until cancelled.
pub struct Supervisor {
    cfg: StackConfig,
    services: Vec<ServiceDescriptor>,
    phase: SupervisorPhase,
    table: Vec<ProcessHandle>,
    last_report: ReportSlot,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(cfg: StackConfig) -> Self {
        let services = managed_services(&cfg);
        Self {
            cfg,
            services,
            phase: SupervisorPhase::Initializing,
            table: Vec::new(),
            last_report: ReportSlot::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token the signal listener cancels to begin shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared slot the admin endpoint reads the last report from.
    pub fn report_slot(&self) -> ReportSlot {
        self.last_report.clone()
    }

    /// Run the whole lifecycle. Returns the process exit code on a clean
    /// shutdown; fatal render/launch errors propagate after teardown.
    pub async fn run(mut self) -> Result<i32> {
        self.set_phase(SupervisorPhase::Rendering);
        if let Err(e) = render_and_stage(&self.cfg).await {
            self.set_phase(SupervisorPhase::Stopped);
            return Err(e.context("configuration rendering failed, nothing launched"));
        }

        self.set_phase(SupervisorPhase::Launching);
        if let Err(e) = launcher::launch_all(&self.services, &mut self.table, STARTUP_TIMEOUT).await
        {
            error!("launch failed, tearing down partially started stack");
            ShutdownCoordinator::default().stop_all(&mut self.table).await;
            self.set_phase(SupervisorPhase::Stopped);
            return Err(e.context("daemon launch failed"));
        }

        self.set_phase(SupervisorPhase::Monitoring);
        let monitor = HealthMonitor::new(standard_probes(&self.cfg, &self.services));

        // readiness gate: the stack is not declared healthy until this
        // first pass lands in the report slot
        let first = monitor.run().await;
        if first.healthy() {
            info!("startup health check passed, stack ready");
        } else {
            warn!("startup health check: {} probe(s) failing", first.failures);
            log_failures(&first);
        }
        *self.last_report.write().await = Some(first);

        let interval = Duration::from_secs(self.cfg.monitor_interval_secs);
        monitor_until_cancelled(&monitor, &self.last_report, interval, &self.cancel).await;

        self.set_phase(SupervisorPhase::ShuttingDown);
        ShutdownCoordinator::default().stop_all(&mut self.table).await;
        self.set_phase(SupervisorPhase::Stopped);
        Ok(0)
    }

    fn set_phase(&mut self, next: SupervisorPhase) {
        info!("phase {} -> {}", self.phase, next);
        self.phase = next;
    }
}

/// Render every config, validate it with the owning daemon's checker, and
/// stage the bootloader files. Shared by `pxs start` and `pxs render`.
pub async fn render_and_stage(cfg: &StackConfig) -> Result<()> {
    let distros =
        librender::discover_distros(&cfg.http_root).context("scanning downloaded images")?;
    if distros.is_empty() {
        warn!(
            "no complete images under {}/images, boot menu will only offer local boot",
            cfg.http_root.display()
        );
    } else {
        info!("boot menu entries: {}", distros.join(", "));
    }

    for rendered in librender::render_all(cfg, &distros) {
        librender::commit(&rendered).await?;
    }

    let outcome = librender::stage_bootloader(&cfg.syslinux_dir, &cfg.tftp_root).await?;
    info!(
        "bootloader staging: {} copied, {} unchanged, {} missing",
        outcome.copied.len(),
        outcome.unchanged.len(),
        outcome.missing.len()
    );
    Ok(())
}

/// The steady-state loop. A failing probe is warned about and surfaced in
/// the report, never fatal; only cancellation ends the loop, and it does so
/// mid-sleep rather than at the next scheduled wake-up.
async fn monitor_until_cancelled(
    monitor: &HealthMonitor,
    slot: &ReportSlot,
    interval: Duration,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("termination signal observed, leaving monitoring loop");
                return;
            }
            _ = sleep(interval) => {
                let report = monitor.run().await;
                if report.healthy() {
                    info!("health check passed ({} probes)", report.results.len());
                } else {
                    warn!("health check: {} probe(s) failing", report.failures);
                    log_failures(&report);
                }
                *slot.write().await = Some(report);
            }
        }
    }
}

fn log_failures(report: &common::HealthReport) {
    for result in report.results.iter().filter(|r| !r.passed) {
        warn!("probe {} failed: {}", result.check, result.message);
    }
}

/// Arm the cancellation token on SIGTERM or SIGINT. Registered once at
/// startup; the monitoring loop observes the token instead of the signals.
pub fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            _ = int.recv() => info!("received SIGINT"),
        }
        cancel.cancel();
    });
    Ok(())
}
