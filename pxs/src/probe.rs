use std::io::ErrorKind;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use common::{HealthCheckResult, ServiceDescriptor, ServiceKind, StackConfig, Transport};
use sysinfo::{Disks, System};
use tokio::net::TcpStream;

/// Bound on the network calls a single probe makes. The monitor applies its
/// own blanket timeout on top, so a wedged probe can never stall a pass.
const NET_TIMEOUT: Duration = Duration::from_secs(2);
const CHECK_CMD_TIMEOUT: Duration = Duration::from_secs(5);

/// One narrow health question, answered without mutating anything.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> HealthCheckResult;
}

/// The full battery for the configured stack, in report order.
pub fn standard_probes(
    cfg: &StackConfig,
    services: &[ServiceDescriptor],
) -> Vec<Box<dyn HealthProbe>> {
    let mut probes: Vec<Box<dyn HealthProbe>> = Vec::new();

    for svc in services {
        probes.push(Box::new(ProcessAliveProbe {
            name: format!("{}-process", svc.name),
            process_name: svc.process_name.clone(),
        }));
        if let (Some(port), Some(transport)) = (svc.port, svc.transport) {
            probes.push(Box::new(PortListeningProbe {
                name: format!("{}-port", svc.name),
                port,
                transport,
            }));
        }
        if svc.kind == ServiceKind::Dhcp {
            if let Some(validate) = &svc.validate {
                probes.push(Box::new(ConfigTestProbe {
                    name: format!("{}-config", svc.name),
                    argv: validate.clone(),
                }));
            }
        }
    }

    probes.push(Box::new(HttpFetchProbe {
        name: "http-fetch".into(),
        url: format!("http://127.0.0.1:{}/", cfg.http_port),
    }));
    probes.push(Box::new(PxeFilesProbe {
        name: "pxe-files".into(),
        required: vec![cfg.bootloader_path(), cfg.boot_menu_path()],
    }));
    probes.push(Box::new(DiskSpaceProbe {
        name: "disk-space".into(),
        path: cfg.http_root.clone(),
        threshold_percent: 90.0,
    }));
    probes.push(Box::new(ReachabilityProbe {
        name: "network-reach".into(),
        endpoint: "8.8.8.8:53".into(),
    }));

    probes
}

/// Is a process with the daemon's executable name alive? Scans the process
/// table by name so it also works from a `pxs health` invocation that does
/// not own the child handles.
pub struct ProcessAliveProbe {
    pub name: String,
    pub process_name: String,
}

#[async_trait]
impl HealthProbe for ProcessAliveProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        let mut sys = System::new();
        sys.refresh_processes();
        let found = sys
            .processes()
            .values()
            .any(|p| p.name() == self.process_name);
        if found {
            HealthCheckResult::pass(&self.name, format!("{} is running", self.process_name))
        } else {
            HealthCheckResult::fail(
                &self.name,
                format!("no process named {} found", self.process_name),
            )
        }
    }
}

/// Is the daemon's port actually held open?
///
/// TCP is probed by connecting. UDP cannot be connect-probed, so the probe
/// tries to bind the port itself: EADDRINUSE means the daemon holds it
/// (pass), a successful bind means nobody is listening (fail).
pub struct PortListeningProbe {
    pub name: String,
    pub port: u16,
    pub transport: Transport,
}

#[async_trait]
impl HealthProbe for PortListeningProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        match self.transport {
            Transport::Tcp => {
                let addr = format!("127.0.0.1:{}", self.port);
                match tokio::time::timeout(NET_TIMEOUT, TcpStream::connect(&addr)).await {
                    Ok(Ok(_)) => {
                        HealthCheckResult::pass(&self.name, format!("tcp/{} accepting", self.port))
                    }
                    Ok(Err(e)) => HealthCheckResult::fail(
                        &self.name,
                        format!("tcp/{} refused: {e}", self.port),
                    ),
                    Err(_) => HealthCheckResult::fail(
                        &self.name,
                        format!("tcp/{} connect timed out", self.port),
                    ),
                }
            }
            Transport::Udp => match UdpSocket::bind(("0.0.0.0", self.port)) {
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    HealthCheckResult::pass(&self.name, format!("udp/{} bound", self.port))
                }
                Err(e) => HealthCheckResult::fail(
                    &self.name,
                    format!("udp/{} probe error: {e}", self.port),
                ),
                Ok(_) => HealthCheckResult::fail(
                    &self.name,
                    format!("udp/{} has no listener", self.port),
                ),
            },
        }
    }
}

/// Synthetic functional request against the image server.
pub struct HttpFetchProbe {
    pub name: String,
    pub url: String,
}

#[async_trait]
impl HealthProbe for HttpFetchProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        let client = match reqwest::Client::builder().timeout(NET_TIMEOUT).build() {
            Ok(c) => c,
            Err(e) => return HealthCheckResult::fail(&self.name, format!("client setup: {e}")),
        };
        match client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => {
                HealthCheckResult::pass(&self.name, format!("GET {} -> {}", self.url, resp.status()))
            }
            Ok(resp) => {
                HealthCheckResult::fail(&self.name, format!("GET {} -> {}", self.url, resp.status()))
            }
            Err(e) => HealthCheckResult::fail(&self.name, format!("GET {} failed: {e}", self.url)),
        }
    }
}

/// Re-run the daemon's own config test against the live file.
pub struct ConfigTestProbe {
    pub name: String,
    pub argv: Vec<String>,
}

#[async_trait]
impl HealthProbe for ConfigTestProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        let run = tokio::process::Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(CHECK_CMD_TIMEOUT, run).await {
            Ok(Ok(output)) if output.status.success() => {
                HealthCheckResult::pass(&self.name, "config test passed")
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                HealthCheckResult::fail(
                    &self.name,
                    format!("config test failed: {}", stderr.trim()),
                )
            }
            Ok(Err(e)) => HealthCheckResult::fail(&self.name, format!("config test spawn: {e}")),
            Err(_) => HealthCheckResult::fail(&self.name, "config test timed out"),
        }
    }
}

/// The files a PXE client needs before anything else: the bootloader served
/// over TFTP and the default boot menu.
pub struct PxeFilesProbe {
    pub name: String,
    pub required: Vec<PathBuf>,
}

#[async_trait]
impl HealthProbe for PxeFilesProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if missing.is_empty() {
            HealthCheckResult::pass(&self.name, format!("{} files present", self.required.len()))
        } else {
            HealthCheckResult::fail(&self.name, format!("missing: {}", missing.join(", ")))
        }
    }
}

/// Disk usage under the serving root stays below the threshold.
pub struct DiskSpaceProbe {
    pub name: String,
    pub path: PathBuf,
    pub threshold_percent: f64,
}

#[async_trait]
impl HealthProbe for DiskSpaceProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        let disks = Disks::new_with_refreshed_list();
        // longest mount-point prefix wins, the same way df resolves a path
        let disk = disks
            .iter()
            .filter(|d| self.path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());
        let Some(disk) = disk else {
            return HealthCheckResult::fail(
                &self.name,
                format!("no filesystem found for {}", self.path.display()),
            );
        };
        let total = disk.total_space();
        if total == 0 {
            return HealthCheckResult::fail(&self.name, "filesystem reports zero size");
        }
        let used_percent = 100.0 * (total - disk.available_space()) as f64 / total as f64;
        if used_percent < self.threshold_percent {
            HealthCheckResult::pass(
                &self.name,
                format!("{used_percent:.0}% used (threshold {:.0}%)", self.threshold_percent),
            )
        } else {
            HealthCheckResult::fail(
                &self.name,
                format!("{used_percent:.0}% used exceeds {:.0}%", self.threshold_percent),
            )
        }
    }
}

/// Outbound reachability, for spotting a dead uplink rather than a dead
/// daemon. A timeout here is a failed check, never a crash.
pub struct ReachabilityProbe {
    pub name: String,
    pub endpoint: String,
}

#[async_trait]
impl HealthProbe for ReachabilityProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthCheckResult {
        match tokio::time::timeout(NET_TIMEOUT, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(_)) => HealthCheckResult::pass(&self.name, format!("{} reachable", self.endpoint)),
            Ok(Err(e)) => {
                HealthCheckResult::fail(&self.name, format!("{} unreachable: {e}", self.endpoint))
            }
            Err(_) => HealthCheckResult::fail(
                &self.name,
                format!("{} connect timed out", self.endpoint),
            ),
        }
    }
}
