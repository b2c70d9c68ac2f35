//! End-to-end scenarios against the render pipeline and the probe battery,
//! using temp directories and stand-in checker commands in place of the
//! real daemons.

use std::net::Ipv4Addr;
use std::path::Path;

use common::{HealthReport, StackConfig};
use librender::{Validation, commit, discover_distros, render_all, stage_bootloader};
use pxs::monitor::HealthMonitor;
use pxs::probe::{HealthProbe, PortListeningProbe, ProcessAliveProbe, PxeFilesProbe};

fn stack_config(root: &Path, http_port: u16) -> StackConfig {
    StackConfig {
        subnet: Ipv4Addr::new(10, 0, 0, 0),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        range_start: Ipv4Addr::new(10, 0, 0, 50),
        range_end: Ipv4Addr::new(10, 0, 0, 100),
        router: Ipv4Addr::new(10, 0, 0, 1),
        dns: vec![Ipv4Addr::new(8, 8, 8, 8)],
        domain: "pxe.local".into(),
        lease_secs: 600,
        boot_timeout: 50,
        boot_default: "local".into(),
        http_port,
        server_ip: Ipv4Addr::new(10, 0, 0, 2),
        admin_port: 10280,
        monitor_interval_secs: 60,
        tftp_root: root.join("tftp"),
        http_root: root.join("http"),
        syslinux_dir: root.join("syslinux"),
        config_dir: root.join("etc"),
    }
}

/// The daemons' own checkers are not installed on the test host; accepting
/// every file is the passing-validation case.
fn accept_all(rendered: &mut librender::RenderedConfig) {
    if let Validation::Command(argv) = &mut rendered.validation {
        *argv = vec!["true".into()];
    }
}

#[tokio::test]
async fn test_rendered_stack_embeds_detected_address_and_port() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = stack_config(tmp.path(), 9090);

    let images = cfg.http_root.join("images/debian-12");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("vmlinuz"), b"kernel").unwrap();
    std::fs::write(images.join("initrd.img"), b"initrd").unwrap();

    let distros = discover_distros(&cfg.http_root).unwrap();
    let mut rendered = render_all(&cfg, &distros);
    for r in &mut rendered {
        accept_all(r);
        commit(r).await.unwrap();
    }

    let menu = std::fs::read_to_string(cfg.boot_menu_path()).unwrap();
    assert!(menu.contains("http://10.0.0.2:9090/images/debian-12/vmlinuz"));

    let dhcpd = std::fs::read_to_string(cfg.config_dir.join("dhcpd.conf")).unwrap();
    assert!(dhcpd.contains("range 10.0.0.50 10.0.0.100;"));

    let nginx = std::fs::read_to_string(cfg.config_dir.join("nginx.conf")).unwrap();
    assert!(nginx.contains("listen 9090;"));
}

#[tokio::test]
async fn test_rendering_twice_is_byte_identical_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = stack_config(tmp.path(), 8080);

    for _ in 0..2 {
        let mut rendered = render_all(&cfg, &[]);
        for r in &mut rendered {
            accept_all(r);
            commit(r).await.unwrap();
        }
    }
    let first = std::fs::read(cfg.config_dir.join("dhcpd.conf")).unwrap();

    let mut rendered = render_all(&cfg, &[]);
    for r in &mut rendered {
        accept_all(r);
        commit(r).await.unwrap();
    }
    assert_eq!(std::fs::read(cfg.config_dir.join("dhcpd.conf")).unwrap(), first);
}

#[tokio::test]
async fn test_rejected_render_keeps_live_stack_config() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = stack_config(tmp.path(), 8080);

    let mut rendered = render_all(&cfg, &[]);
    for r in &mut rendered {
        accept_all(r);
        commit(r).await.unwrap();
    }
    let live = std::fs::read_to_string(cfg.config_dir.join("dhcpd.conf")).unwrap();

    // next render cycle: the daemon's checker rejects the new file
    let mut rendered = render_all(&cfg, &[]);
    for r in &mut rendered {
        if let Validation::Command(argv) = &mut r.validation {
            *argv = vec!["false".into()];
            assert!(commit(r).await.is_err());
        }
    }
    assert_eq!(
        std::fs::read_to_string(cfg.config_dir.join("dhcpd.conf")).unwrap(),
        live
    );
}

#[tokio::test]
async fn test_missing_bootloader_fails_only_the_pxe_probe() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = stack_config(tmp.path(), 8080);

    // staging finds an empty syslinux dir: nothing lands in the tftp root
    std::fs::create_dir_all(&cfg.syslinux_dir).unwrap();
    stage_bootloader(&cfg.syslinux_dir, &cfg.tftp_root).await.unwrap();

    // a process probe that matches this very test binary stands in for a
    // daemon that is alive while its serving files are absent
    let mut sys = sysinfo::System::new();
    sys.refresh_processes();
    let me = sysinfo::get_current_pid().unwrap();
    let my_name = sys.processes().get(&me).unwrap().name().to_string();

    let probes: Vec<Box<dyn HealthProbe>> = vec![
        Box::new(ProcessAliveProbe {
            name: "dhcpd-process".into(),
            process_name: my_name,
        }),
        Box::new(PxeFilesProbe {
            name: "pxe-files".into(),
            required: vec![cfg.bootloader_path(), cfg.boot_menu_path()],
        }),
    ];
    let report: HealthReport = HealthMonitor::new(probes).run().await;

    assert!(!report.healthy());
    assert_eq!(report.failures, 1);
    let by_name = |n: &str| report.results.iter().find(|r| r.check == n).unwrap();
    assert!(by_name("dhcpd-process").passed);
    assert!(!by_name("pxe-files").passed);
}

#[tokio::test]
async fn test_port_probe_against_live_listener() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let probe = PortListeningProbe {
        name: "nginx-port".into(),
        port,
        transport: common::Transport::Tcp,
    };
    let report = HealthMonitor::new(vec![Box::new(probe)]).run().await;
    assert!(report.healthy());
}
