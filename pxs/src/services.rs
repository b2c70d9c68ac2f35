use common::{ServiceDescriptor, ServiceKind, StackConfig, Transport};

/// The managed daemons in launch order. Address assignment comes first and
/// image serving last: the boot menu rendered for PXE clients references the
/// image server's URL, so dhcpd must never hand out leases pointing at a
/// stack that is still half up.
pub fn managed_services(cfg: &StackConfig) -> Vec<ServiceDescriptor> {
    let dhcpd_conf = cfg.config_dir.join("dhcpd.conf");
    let nginx_conf = cfg.config_dir.join("nginx.conf");

    vec![
        ServiceDescriptor {
            name: "dhcpd".into(),
            kind: ServiceKind::Dhcp,
            start: vec![
                "dhcpd".into(),
                "-f".into(),
                "-cf".into(),
                dhcpd_conf.display().to_string(),
            ],
            validate: Some(vec![
                "dhcpd".into(),
                "-t".into(),
                "-cf".into(),
                dhcpd_conf.display().to_string(),
            ]),
            port: Some(67),
            transport: Some(Transport::Udp),
            process_name: "dhcpd".into(),
        },
        ServiceDescriptor {
            name: "tftpd".into(),
            kind: ServiceKind::Tftp,
            start: vec![
                "in.tftpd".into(),
                "-L".into(),
                "-s".into(),
                cfg.tftp_root.display().to_string(),
            ],
            validate: None,
            port: Some(69),
            transport: Some(Transport::Udp),
            process_name: "in.tftpd".into(),
        },
        ServiceDescriptor {
            name: "nginx".into(),
            kind: ServiceKind::Http,
            start: vec![
                "nginx".into(),
                "-c".into(),
                nginx_conf.display().to_string(),
                "-g".into(),
                "daemon off;".into(),
            ],
            validate: Some(vec![
                "nginx".into(),
                "-t".into(),
                "-c".into(),
                nginx_conf.display().to_string(),
            ]),
            port: Some(cfg.http_port),
            transport: Some(Transport::Tcp),
            process_name: "nginx".into(),
        },
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    pub(crate) fn test_config() -> StackConfig {
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
            http_port: 9090,
            server_ip: Ipv4Addr::new(10, 0, 0, 2),
            admin_port: 10280,
            monitor_interval_secs: 60,
            tftp_root: "/srv/tftp".into(),
            http_root: "/srv/http".into(),
            syslinux_dir: "/usr/lib/syslinux".into(),
            config_dir: "/etc/pxs".into(),
        }
    }

    #[test]
    fn test_launch_order_is_dhcp_first_http_last() {
        let services = managed_services(&test_config());
        assert_eq!(services[0].kind, ServiceKind::Dhcp);
        assert_eq!(services.last().unwrap().kind, ServiceKind::Http);
    }

    #[test]
    fn test_http_descriptor_uses_configured_port() {
        let services = managed_services(&test_config());
        let http = services.iter().find(|s| s.kind == ServiceKind::Http).unwrap();
        assert_eq!(http.port, Some(9090));
        assert_eq!(http.transport, Some(Transport::Tcp));
    }

    #[test]
    fn test_daemons_with_configs_also_carry_checkers() {
        for svc in managed_services(&test_config()) {
            match svc.kind {
                ServiceKind::Tftp => assert!(svc.validate.is_none()),
                _ => assert!(svc.validate.is_some(), "{} needs a checker", svc.name),
            }
        }
    }
}
