use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use common::ServiceDescriptor;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// How long a freshly started daemon must stay up before it counts as
/// running. A daemon that rejects its environment exits well inside this.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Ownership record for one launched daemon. The supervisor's process table
/// is the single source of truth for what is running; no pid files.
#[derive(Debug)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: Option<u32>,
    child: Child,
}

impl ProcessHandle {
    /// Explicit is-running query; reaps the child if it has exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the daemon to stop through its native mechanism (SIGTERM).
    pub fn request_stop(&self) -> Result<()> {
        let pid = self.pid.with_context(|| format!("{} has no pid", self.name))?;
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        )
        .with_context(|| format!("sending SIGTERM to {} (pid {pid})", self.name))
    }

    /// Poll until the process has exited or the deadline passes.
    pub async fn wait_exited(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if !self.is_running() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Forced termination (SIGKILL), then reap.
    pub async fn force_kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .with_context(|| format!("killing {}", self.name))?;
        Ok(())
    }
}

/// Start every managed daemon in table order, appending each confirmed
/// handle to `table`. Returns an error as soon as one daemon fails to
/// confirm; `table` then holds exactly the daemons that did start, so the
/// caller can tear them down. Daemon N+1 is never attempted after a failed
/// daemon N.
pub async fn launch_all(
    services: &[ServiceDescriptor],
    table: &mut Vec<ProcessHandle>,
    startup_timeout: Duration,
) -> Result<()> {
    for svc in services {
        let handle = launch(svc, startup_timeout)
            .await
            .with_context(|| format!("launching {}", svc.name))?;
        info!("{} running (pid {:?})", svc.name, handle.pid);
        table.push(handle);
    }
    Ok(())
}

/// Start one daemon: re-validate its configuration, spawn the start command
/// and confirm the process stays up through the startup window.
pub async fn launch(svc: &ServiceDescriptor, startup_timeout: Duration) -> Result<ProcessHandle> {
    if let Some(validate) = &svc.validate {
        revalidate(&svc.name, validate).await?;
    }

    debug!("spawning {}: {:?}", svc.name, svc.start);
    let child = Command::new(svc.start_program())
        .args(svc.start_args())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning `{}`", svc.start.join(" ")))?;

    let mut handle = ProcessHandle {
        name: svc.name.clone(),
        pid: child.id(),
        child,
    };

    confirm_running(&mut handle, startup_timeout).await?;
    Ok(handle)
}

/// The launch-time config check. The renderer already validated the file
/// once, but the launcher re-checks right before start so a file edited
/// since rendering cannot take a daemon down.
async fn revalidate(name: &str, argv: &[String]) -> Result<()> {
    let run = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(VALIDATE_TIMEOUT, run)
        .await
        .with_context(|| format!("{name} config check timed out"))?
        .with_context(|| format!("running `{}`", argv.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{name} config check failed: {}", stderr.trim());
    }
    Ok(())
}

async fn confirm_running(handle: &mut ProcessHandle, window: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        match handle.child.try_wait() {
            Ok(Some(status)) => {
                bail!("{} exited during startup: {status}", handle.name);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}: could not query child state: {e}", handle.name);
            }
        }
        if start.elapsed() >= window {
            return Ok(());
        }
        sleep(POLL_INTERVAL).await;
    }
}
