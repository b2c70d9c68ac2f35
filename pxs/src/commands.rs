use std::io::{self, Write as _};

use anyhow::Result;
use tabwriter::TabWriter;
use tracing::error;

use crate::monitor::HealthMonitor;
use crate::probe::standard_probes;
use crate::server;
use crate::services::managed_services;
use crate::supervisor::{self, Supervisor};
use crate::config;

/// `pxs start`: resolve config, arm signal handling, expose the admin
/// endpoint and hand control to the supervisor until shutdown.
pub async fn start() -> Result<i32> {
    let cfg = config::resolve()?;
    let supervisor = Supervisor::new(cfg.clone());
    supervisor::spawn_signal_listener(supervisor.cancellation_token())?;

    let slot = supervisor.report_slot();
    let admin_port = cfg.admin_port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(admin_port, slot).await {
            error!("admin endpoint failed: {e:#}");
        }
    });

    supervisor.run().await
}

/// `pxs health`: one monitoring pass from a fresh process, for container
/// health-check hooks. The exit code is the verdict.
pub async fn health(json: bool) -> Result<i32> {
    let cfg = config::resolve()?;
    let services = managed_services(&cfg);
    let monitor = HealthMonitor::new(standard_probes(&cfg, &services));
    let report = monitor.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut tw = TabWriter::new(io::stdout());
        writeln!(&mut tw, "CHECK\tSTATUS\tMESSAGE")?;
        for result in &report.results {
            let status = if result.passed { "pass" } else { "FAIL" };
            writeln!(&mut tw, "{}\t{}\t{}", result.check, status, result.message)?;
        }
        tw.flush()?;
        println!(
            "{} checks, {} failing",
            report.results.len(),
            report.failures
        );
    }

    Ok(if report.healthy() { 0 } else { 1 })
}

/// `pxs render`: render, validate and stage without launching anything.
pub async fn render() -> Result<i32> {
    let cfg = config::resolve()?;
    supervisor::render_and_stage(&cfg).await?;
    Ok(0)
}
