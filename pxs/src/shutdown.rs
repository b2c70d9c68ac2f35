use std::time::Duration;

use tracing::{error, info, warn};

use crate::launcher::ProcessHandle;

/// Bounded wait for one daemon's graceful stop before escalating.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Stops the managed daemons in reverse start order.
///
/// Each daemon gets its native graceful stop first and a forced kill only
/// after the timeout. A daemon that refuses to die, or a signal that cannot
/// be delivered, is logged and skipped; it never blocks shutdown of the
/// remaining daemons.
pub struct ShutdownCoordinator {
    stop_timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self {
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

impl ShutdownCoordinator {
    pub fn new(stop_timeout: Duration) -> Self {
        Self { stop_timeout }
    }

    /// Drains the process table. The table is empty afterwards; every
    /// handle has either exited or been killed.
    pub async fn stop_all(&self, table: &mut Vec<ProcessHandle>) {
        while let Some(mut handle) = table.pop() {
            self.stop_one(&mut handle).await;
        }
    }

    async fn stop_one(&self, handle: &mut ProcessHandle) {
        if !handle.is_running() {
            info!("{} already exited", handle.name);
            return;
        }

        info!("stopping {}", handle.name);
        match handle.request_stop() {
            Ok(()) => {
                if handle.wait_exited(self.stop_timeout).await {
                    info!("{} stopped", handle.name);
                    return;
                }
                warn!(
                    "{} still running after {:?}, escalating to SIGKILL",
                    handle.name, self.stop_timeout
                );
            }
            Err(e) => {
                warn!("{}: graceful stop failed: {e:#}, escalating", handle.name);
            }
        }

        if let Err(e) = handle.force_kill().await {
            error!("{}: forced kill failed: {e:#}", handle.name);
        } else {
            info!("{} killed", handle.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::launch;
    use common::{ServiceDescriptor, ServiceKind, Transport};

    fn descriptor(name: &str, start: Vec<&str>) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.into(),
            kind: ServiceKind::Http,
            start: start.into_iter().map(String::from).collect(),
            validate: None,
            port: None,
            transport: Some(Transport::Tcp),
            process_name: name.into(),
        }
    }

    const WINDOW: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_stop_all_empties_table() {
        let mut table = Vec::new();
        for name in ["first", "second", "third"] {
            table.push(launch(&descriptor(name, vec!["sleep", "30"]), WINDOW).await.unwrap());
        }
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(2));
        coordinator.stop_all(&mut table).await;
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_term_ignorer_gets_killed_and_sequence_continues() {
        let mut table = Vec::new();
        table.push(launch(&descriptor("polite", vec!["sleep", "30"]), WINDOW).await.unwrap());
        // ignores SIGTERM, must be escalated to SIGKILL
        table.push(
            launch(
                &descriptor("stubborn", vec!["sh", "-c", "trap '' TERM; sleep 30"]),
                WINDOW,
            )
            .await
            .unwrap(),
        );

        let coordinator = ShutdownCoordinator::new(Duration::from_millis(300));
        coordinator.stop_all(&mut table).await;
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_already_exited_daemon_is_skipped() {
        let mut handle = launch(&descriptor("gone", vec!["sleep", "30"]), WINDOW).await.unwrap();
        handle.force_kill().await.unwrap();
        let mut table = vec![handle];
        // must not error or hang on a dead process
        ShutdownCoordinator::default().stop_all(&mut table).await;
        assert!(table.is_empty());
    }
}
