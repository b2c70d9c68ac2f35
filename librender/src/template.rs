use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use common::StackConfig;

/// How a rendered file is checked before it may replace the live copy.
#[derive(Debug, Clone)]
pub enum Validation {
    /// Run the daemon's own syntax checker; the staged file path is appended
    /// as the final argument.
    Command(Vec<String>),
    /// The daemon has no checker; require the token to appear in the output.
    Structural { required_token: String },
}

/// One expanded configuration file, not yet written to its destination.
#[derive(Debug, Clone)]
pub struct RenderedConfig {
    pub name: String,
    pub dest: PathBuf,
    pub content: String,
    pub validation: Validation,
}

/// Expand every configuration file of the stack. `distros` is the list of
/// distribution tags found under the image root, in the order the boot menu
/// should list them.
///
/// Rendering is pure: identical inputs yield byte-identical content.
pub fn render_all(cfg: &StackConfig, distros: &[String]) -> Vec<RenderedConfig> {
    vec![
        RenderedConfig {
            name: "dhcpd.conf".into(),
            dest: cfg.config_dir.join("dhcpd.conf"),
            content: dhcpd_conf(cfg),
            validation: Validation::Command(vec!["dhcpd".into(), "-t".into(), "-cf".into()]),
        },
        RenderedConfig {
            name: "boot-menu".into(),
            dest: cfg.boot_menu_path(),
            content: boot_menu(cfg, distros),
            validation: Validation::Structural {
                required_token: format!("LABEL {}", cfg.boot_default),
            },
        },
        RenderedConfig {
            name: "nginx.conf".into(),
            dest: cfg.config_dir.join("nginx.conf"),
            content: nginx_conf(cfg),
            validation: Validation::Command(vec!["nginx".into(), "-t".into(), "-c".into()]),
        },
    ]
}

/// List distribution tags under `<http_root>/images`, sorted so repeated
/// renders produce identical menus. A tag counts only if the downloader has
/// finished placing both kernel and initrd.
pub fn discover_distros(http_root: &Path) -> Result<Vec<String>> {
    let images = http_root.join("images");
    if !images.is_dir() {
        return Ok(Vec::new());
    }
    let mut tags = Vec::new();
    for entry in std::fs::read_dir(&images)
        .with_context(|| format!("reading image root {}", images.display()))?
    {
        let entry = entry?;
        if !entry.metadata()?.is_dir() {
            continue;
        }
        let dir = entry.path();
        if dir.join("vmlinuz").is_file() && dir.join("initrd.img").is_file() {
            if let Some(tag) = dir.file_name().and_then(|n| n.to_str()) {
                tags.push(tag.to_string());
            }
        }
    }
    tags.sort();
    Ok(tags)
}

fn dhcpd_conf(cfg: &StackConfig) -> String {
    let dns = cfg
        .dns
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    let _ = writeln!(out, "option domain-name \"{}\";", cfg.domain);
    let _ = writeln!(out, "option domain-name-servers {dns};");
    let _ = writeln!(out, "default-lease-time {};", cfg.lease_secs);
    let _ = writeln!(out, "max-lease-time {};", cfg.lease_secs * 4);
    let _ = writeln!(out, "authoritative;");
    let _ = writeln!(out);
    let _ = writeln!(out, "allow booting;");
    let _ = writeln!(out, "allow bootp;");
    let _ = writeln!(out);
    let _ = writeln!(out, "subnet {} netmask {} {{", cfg.subnet, cfg.netmask);
    let _ = writeln!(out, "  range {} {};", cfg.range_start, cfg.range_end);
    let _ = writeln!(out, "  option routers {};", cfg.router);
    let _ = writeln!(out, "  next-server {};", cfg.server_ip);
    let _ = writeln!(out, "  filename \"pxelinux.0\";");
    let _ = writeln!(out, "}}");
    out
}

fn boot_menu(cfg: &StackConfig, distros: &[String]) -> String {
    let base = cfg.http_base_url();

    let mut out = String::new();
    let _ = writeln!(out, "DEFAULT menu.c32");
    let _ = writeln!(out, "PROMPT 0");
    let _ = writeln!(out, "TIMEOUT {}", cfg.boot_timeout);
    let _ = writeln!(out, "ONTIMEOUT {}", cfg.boot_default);
    let _ = writeln!(out);
    let _ = writeln!(out, "MENU TITLE network boot");
    let _ = writeln!(out);
    let _ = writeln!(out, "LABEL local");
    let _ = writeln!(out, "  MENU LABEL boot from local disk");
    let _ = writeln!(out, "  LOCALBOOT 0");
    for tag in distros {
        let _ = writeln!(out);
        let _ = writeln!(out, "LABEL {tag}");
        let _ = writeln!(out, "  MENU LABEL install {tag}");
        let _ = writeln!(out, "  KERNEL {base}/images/{tag}/vmlinuz");
        let _ = writeln!(out, "  INITRD {base}/images/{tag}/initrd.img");
        let _ = writeln!(out, "  APPEND url={base}/images/{tag}/ ip=dhcp");
    }
    out
}

fn nginx_conf(cfg: &StackConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "worker_processes 1;");
    let _ = writeln!(out, "pid /run/pxs-nginx.pid;");
    let _ = writeln!(out, "error_log stderr warn;");
    let _ = writeln!(out);
    let _ = writeln!(out, "events {{");
    let _ = writeln!(out, "  worker_connections 64;");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);
    let _ = writeln!(out, "http {{");
    let _ = writeln!(out, "  access_log off;");
    let _ = writeln!(out, "  server {{");
    let _ = writeln!(out, "    listen {};", cfg.http_port);
    let _ = writeln!(out, "    root {};", cfg.http_root.display());
    let _ = writeln!(out, "    autoindex on;");
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_config() -> StackConfig {
        StackConfig {
            subnet: Ipv4Addr::new(10, 0, 0, 0),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            range_start: Ipv4Addr::new(10, 0, 0, 50),
            range_end: Ipv4Addr::new(10, 0, 0, 100),
            router: Ipv4Addr::new(10, 0, 0, 1),
            dns: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            domain: "pxe.local".into(),
            lease_secs: 600,
            boot_timeout: 50,
            boot_default: "local".into(),
            http_port: 9090,
            server_ip: Ipv4Addr::new(192, 168, 7, 2),
            admin_port: 10280,
            monitor_interval_secs: 60,
            tftp_root: "/srv/tftp".into(),
            http_root: "/srv/http".into(),
            syslinux_dir: "/usr/lib/syslinux".into(),
            config_dir: "/etc/pxs".into(),
        }
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let cfg = test_config();
        let distros = vec!["debian-12".to_string(), "ubuntu-24.04".to_string()];
        let a = render_all(&cfg, &distros);
        let b = render_all(&cfg, &distros);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content, y.content, "{} not byte-identical", x.name);
        }
    }

    #[test]
    fn test_dhcpd_conf_embeds_range() {
        let conf = dhcpd_conf(&test_config());
        assert!(conf.contains("subnet 10.0.0.0 netmask 255.255.255.0"));
        assert!(conf.contains("range 10.0.0.50 10.0.0.100;"));
        assert!(conf.contains("option routers 10.0.0.1;"));
        assert!(conf.contains("option domain-name-servers 8.8.8.8, 8.8.4.4;"));
        assert!(conf.contains("default-lease-time 600;"));
        assert!(conf.contains("next-server 192.168.7.2;"));
    }

    #[test]
    fn test_boot_menu_embeds_http_urls() {
        let menu = boot_menu(&test_config(), &["debian-12".to_string()]);
        assert!(menu.contains("KERNEL http://192.168.7.2:9090/images/debian-12/vmlinuz"));
        assert!(menu.contains("INITRD http://192.168.7.2:9090/images/debian-12/initrd.img"));
        assert!(menu.contains("TIMEOUT 50"));
        assert!(menu.contains("ONTIMEOUT local"));
        assert!(menu.contains("LABEL local"));
    }

    #[test]
    fn test_nginx_conf_listens_on_port() {
        let conf = nginx_conf(&test_config());
        assert!(conf.contains("listen 9090;"));
        assert!(conf.contains("root /srv/http;"));
    }

    #[test]
    fn test_discover_distros_requires_complete_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir_all(images.join("debian-12")).unwrap();
        std::fs::write(images.join("debian-12/vmlinuz"), b"k").unwrap();
        std::fs::write(images.join("debian-12/initrd.img"), b"i").unwrap();
        // initrd still downloading, must not show up in the menu
        std::fs::create_dir_all(images.join("fedora-42")).unwrap();
        std::fs::write(images.join("fedora-42/vmlinuz"), b"k").unwrap();

        let tags = discover_distros(tmp.path()).unwrap();
        assert_eq!(tags, vec!["debian-12".to_string()]);
    }

    #[test]
    fn test_discover_distros_missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_distros(&tmp.path().join("nope")).unwrap().is_empty());
    }
}
