use serde::{Deserialize, Serialize};

/// Which of the managed daemons a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Address assignment (dhcpd).
    Dhcp,
    /// Boot-file transfer (in.tftpd).
    Tftp,
    /// Image serving over HTTP (nginx).
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Udp,
    Tcp,
}

/// One managed daemon: how to start it, how to validate its config and how
/// to find it again from a separate invocation.
///
/// Immutable once constructed; the supervisor builds one per daemon at
/// initialization and passes them around by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub kind: ServiceKind,
    /// argv of the foreground start command.
    pub start: Vec<String>,
    /// argv of the daemon's own syntax-check command, when it has one.
    pub validate: Option<Vec<String>>,
    /// Listening port the daemon is expected to hold open.
    pub port: Option<u16>,
    pub transport: Option<Transport>,
    /// Executable name as it appears in the process table, for liveness
    /// scans that do not own the child handle.
    pub process_name: String,
}

impl ServiceDescriptor {
    pub fn start_program(&self) -> &str {
        &self.start[0]
    }

    pub fn start_args(&self) -> &[String] {
        &self.start[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_argv_split() {
        let d = ServiceDescriptor {
            name: "dhcpd".into(),
            kind: ServiceKind::Dhcp,
            start: vec!["dhcpd".into(), "-f".into(), "-cf".into(), "/etc/dhcpd.conf".into()],
            validate: Some(vec!["dhcpd".into(), "-t".into()]),
            port: Some(67),
            transport: Some(Transport::Udp),
            process_name: "dhcpd".into(),
        };
        assert_eq!(d.start_program(), "dhcpd");
        assert_eq!(d.start_args().len(), 3);
    }
}
