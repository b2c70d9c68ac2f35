use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnetwork::{IpNetworkError, Ipv4Network};
use serde::{Deserialize, Serialize};

/// Effective configuration of the whole stack, resolved once at startup from
/// the environment plus documented defaults, then passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    // Address assignment
    pub subnet: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns: Vec<Ipv4Addr>,
    pub domain: String,
    pub lease_secs: u32,

    // Boot menu
    /// PXELINUX timeout, in tenths of a second.
    pub boot_timeout: u32,
    pub boot_default: String,

    // Image serving
    pub http_port: u16,
    /// Address embedded in boot-menu URLs; detected at startup when not
    /// explicitly configured.
    pub server_ip: Ipv4Addr,

    // Supervisor
    pub admin_port: u16,
    pub monitor_interval_secs: u64,

    // Paths
    pub tftp_root: PathBuf,
    pub http_root: PathBuf,
    pub syslinux_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl StackConfig {
    /// The DHCP subnet as a typed network.
    pub fn network(&self) -> Result<Ipv4Network, IpNetworkError> {
        Ipv4Network::with_netmask(self.subnet, self.netmask)
    }

    /// Base URL the rendered boot menu points kernel/initrd fetches at.
    pub fn http_base_url(&self) -> String {
        format!("http://{}:{}", self.server_ip, self.http_port)
    }

    pub fn boot_menu_path(&self) -> PathBuf {
        self.tftp_root.join("pxelinux.cfg").join("default")
    }

    pub fn bootloader_path(&self) -> PathBuf {
        self.tftp_root.join("pxelinux.0")
    }
}
