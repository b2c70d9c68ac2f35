use std::env;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use common::StackConfig;
use tracing::{debug, info};

/// Resolve the effective stack configuration from the environment plus
/// documented defaults. The result is immutable for the process lifetime;
/// nothing reads the environment after this returns.
///
/// Every effective value is logged so an operator can audit what a given
/// run actually used.
pub fn resolve() -> Result<StackConfig> {
    let subnet: Ipv4Addr = env_or("DHCP_SUBNET", "10.0.0.0")?;
    let netmask: Ipv4Addr = env_or("DHCP_NETMASK", "255.255.255.0")?;
    let range_start: Ipv4Addr = env_or("DHCP_RANGE_START", "10.0.0.50")?;
    let range_end: Ipv4Addr = env_or("DHCP_RANGE_END", "10.0.0.100")?;
    let router: Ipv4Addr = env_or("DHCP_ROUTER", "10.0.0.1")?;
    let dns = dns_list(&env_or::<String>("DHCP_DNS", "8.8.8.8,8.8.4.4")?)?;
    let domain: String = env_or("DHCP_DOMAIN", "pxe.local")?;
    let lease_secs: u32 = env_or("DHCP_LEASE_TIME", "600")?;
    let boot_timeout: u32 = env_or("BOOT_TIMEOUT", "50")?;
    let boot_default: String = env_or("BOOT_DEFAULT", "local")?;
    let http_port: u16 = env_or("HTTP_PORT", "8080")?;
    let admin_port: u16 = env_or("ADMIN_PORT", "10280")?;
    let monitor_interval_secs: u64 = env_or("MONITOR_INTERVAL", "60")?;

    let server_ip = match env::var("SERVER_IP") {
        Ok(raw) => {
            let ip = raw
                .parse::<Ipv4Addr>()
                .with_context(|| format!("parsing SERVER_IP `{raw}`"))?;
            info!("SERVER_IP={ip}");
            ip
        }
        Err(_) => {
            let ip = detect_host_ip().context("detecting this host's address; set SERVER_IP")?;
            info!("SERVER_IP={ip} (detected)");
            ip
        }
    };

    let cfg = StackConfig {
        subnet,
        netmask,
        range_start,
        range_end,
        router,
        dns,
        domain,
        lease_secs,
        boot_timeout,
        boot_default,
        http_port,
        server_ip,
        admin_port,
        monitor_interval_secs,
        tftp_root: env_or::<String>("TFTP_ROOT", "/srv/tftp")?.into(),
        http_root: env_or::<String>("HTTP_ROOT", "/srv/http")?.into(),
        syslinux_dir: env_or::<String>("SYSLINUX_DIR", "/usr/lib/syslinux")?.into(),
        config_dir: env_or::<String>("CONFIG_DIR", "/etc/pxs")?.into(),
    };
    validate(&cfg)?;
    Ok(cfg)
}

/// Reject configurations dhcpd would refuse anyway, before anything renders.
pub fn validate(cfg: &StackConfig) -> Result<()> {
    let net = cfg
        .network()
        .with_context(|| format!("subnet {} with netmask {}", cfg.subnet, cfg.netmask))?;
    if !net.contains(cfg.range_start) {
        bail!("DHCP_RANGE_START {} is not inside {net}", cfg.range_start);
    }
    if !net.contains(cfg.range_end) {
        bail!("DHCP_RANGE_END {} is not inside {net}", cfg.range_end);
    }
    if cfg.range_start > cfg.range_end {
        bail!(
            "DHCP_RANGE_START {} is above DHCP_RANGE_END {}",
            cfg.range_start,
            cfg.range_end
        );
    }
    if !net.contains(cfg.router) {
        bail!("DHCP_ROUTER {} is not inside {net}", cfg.router);
    }
    if cfg.lease_secs == 0 {
        bail!("DHCP_LEASE_TIME must be positive");
    }
    if cfg.dns.is_empty() {
        bail!("DHCP_DNS must name at least one server");
    }
    Ok(())
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => {
            let value = raw
                .parse::<T>()
                .with_context(|| format!("parsing {key} `{raw}`"))?;
            info!("{key}={raw}");
            Ok(value)
        }
        Err(_) => {
            info!("{key}={default} (default)");
            Ok(default
                .parse::<T>()
                .unwrap_or_else(|_| unreachable!("builtin default for {key} must parse")))
        }
    }
}

fn dns_list(raw: &str) -> Result<Vec<Ipv4Addr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Ipv4Addr>()
                .with_context(|| format!("parsing DHCP_DNS entry `{s}`"))
        })
        .collect()
}

/// Best-effort detection of the address other machines on the boot network
/// reach us at. A connected UDP socket never sends a packet; the kernel just
/// picks the source address its route table would use.
fn detect_host_ip() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("binding detection socket")?;
    if socket.connect("8.8.8.8:53").is_ok() {
        if let Ok(addr) = socket.local_addr() {
            if let IpAddr::V4(ip) = addr.ip() {
                if !ip.is_loopback() && !ip.is_unspecified() {
                    return Ok(ip);
                }
            }
        }
    }

    // No default route; fall back to whatever the hostname resolves to.
    let hostname = gethostname::gethostname();
    let hostname = hostname.to_string_lossy();
    debug!("route-based detection failed, resolving hostname {hostname}");
    let resolved = format!("{hostname}:0")
        .to_socket_addrs()
        .with_context(|| format!("resolving hostname {hostname}"))?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
            _ => None,
        });
    resolved.with_context(|| format!("hostname {hostname} has no usable IPv4 address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_stack_env() {
        for key in [
            "DHCP_SUBNET",
            "DHCP_NETMASK",
            "DHCP_RANGE_START",
            "DHCP_RANGE_END",
            "DHCP_ROUTER",
            "DHCP_DNS",
            "DHCP_DOMAIN",
            "DHCP_LEASE_TIME",
            "BOOT_TIMEOUT",
            "BOOT_DEFAULT",
            "HTTP_PORT",
            "ADMIN_PORT",
            "MONITOR_INTERVAL",
            "SERVER_IP",
            "TFTP_ROOT",
            "HTTP_ROOT",
            "SYSLINUX_DIR",
            "CONFIG_DIR",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults_resolve() {
        clear_stack_env();
        unsafe { env::set_var("SERVER_IP", "192.168.1.2") };
        let cfg = resolve().unwrap();
        assert_eq!(cfg.subnet, Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(cfg.range_start, Ipv4Addr::new(10, 0, 0, 50));
        assert_eq!(cfg.dns.len(), 2);
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.server_ip, Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    #[serial]
    fn test_env_overrides_win() {
        clear_stack_env();
        unsafe {
            env::set_var("SERVER_IP", "10.1.0.2");
            env::set_var("DHCP_SUBNET", "10.1.0.0");
            env::set_var("DHCP_RANGE_START", "10.1.0.10");
            env::set_var("DHCP_RANGE_END", "10.1.0.20");
            env::set_var("DHCP_ROUTER", "10.1.0.1");
            env::set_var("HTTP_PORT", "9090");
        }
        let cfg = resolve().unwrap();
        assert_eq!(cfg.subnet, Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.http_base_url(), "http://10.1.0.2:9090");
        clear_stack_env();
    }

    #[test]
    #[serial]
    fn test_range_outside_subnet_rejected() {
        clear_stack_env();
        unsafe {
            env::set_var("SERVER_IP", "10.0.0.2");
            env::set_var("DHCP_RANGE_START", "192.168.0.50");
        }
        assert!(resolve().is_err());
        clear_stack_env();
    }

    #[test]
    #[serial]
    fn test_inverted_range_rejected() {
        clear_stack_env();
        unsafe {
            env::set_var("SERVER_IP", "10.0.0.2");
            env::set_var("DHCP_RANGE_START", "10.0.0.100");
            env::set_var("DHCP_RANGE_END", "10.0.0.50");
        }
        assert!(resolve().is_err());
        clear_stack_env();
    }

    #[test]
    fn test_dns_list_parses_and_trims() {
        let list = dns_list("8.8.8.8, 1.1.1.1,").unwrap();
        assert_eq!(list.len(), 2);
        assert!(dns_list("not-an-ip").is_err());
    }
}
