use chrono::{DateTime, Utc};
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::signal;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a backend ended up stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process had already exited before we asked
    AlreadyExited(Option<i32>),
    /// The process exited within the grace period
    Exited(Option<i32>),
    /// The grace period ran out and the tree was force killed
    Killed,
}

/// The spawned backend process. Owns the child exclusively.
pub struct BackendProcess {
    child: Option<Child>,
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Dropping a handle that was never terminated kills the whole tree
impl Drop for BackendProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Backend (PID {}) dropped while running, force killing", self.pid);
            if let Err(e) = signal::force_kill_tree(self.pid) {
                warn!("Failed to kill backend tree {}: {}", self.pid, e);
            }
            child.kill().ok();
            child.wait().ok();
        }
    }
}

impl BackendProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Some(child),
            pid,
            started_at: Utc::now(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit status if the backend has already exited
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Error checking backend status: {}", e);
                None
            }
        }
    }

    /// Stop the backend and everything it spawned
    ///
    /// Sends the polite request to the whole tree, waits up to `grace`,
    /// then force kills. Always reaps the child before returning.
    pub fn terminate(mut self, grace: Duration) -> TerminationOutcome {
        let pid = self.pid;
        let Some(mut child) = self.child.take() else {
            return TerminationOutcome::AlreadyExited(None);
        };

        if let Ok(Some(status)) = child.try_wait() {
            info!("Backend (PID {}) had already exited: {}", pid, status);
            // The leader is gone but its descendants may not be
            signal::force_kill_tree(pid).ok();
            return TerminationOutcome::AlreadyExited(status.code());
        }

        info!("Stopping backend (PID {})", pid);
        let polite = match signal::request_stop(pid) {
            Ok(()) => true,
            Err(e) => {
                warn!("Termination request to PID {} failed: {}, force killing", pid, e);
                false
            }
        };

        if polite {
            let deadline = Instant::now() + grace;
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        info!("Backend (PID {}) exited: {}", pid, status);
                        reap_descendants(pid);
                        return TerminationOutcome::Exited(status.code());
                    }
                    Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL_INTERVAL),
                    Ok(None) => {
                        warn!("Backend (PID {}) still running after {:?}", pid, grace);
                        break;
                    }
                    Err(e) => {
                        warn!("Error waiting for backend (PID {}): {}", pid, e);
                        break;
                    }
                }
            }
        }

        if let Err(e) = signal::force_kill_tree(pid) {
            warn!("Failed to force kill backend tree {}: {}", pid, e);
        }
        child.kill().ok();
        child.wait().ok();
        info!("Backend (PID {}) force killed", pid);
        TerminationOutcome::Killed
    }
}

/// The leader exited; make sure nothing it started outlives it
fn reap_descendants(pid: u32) {
    #[cfg(unix)]
    {
        if signal::tree_alive(pid) {
            warn!("Backend group {} outlived its leader, force killing", pid);
            signal::force_kill_tree(pid).ok();
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::process::test_support::wait_until_group_gone;
    use std::process::Command;

    fn spawn_group(script: &str) -> BackendProcess {
        use std::os::unix::process::CommandExt;
        let child = Command::new("sh")
            .args(["-c", script])
            .process_group(0)
            .spawn()
            .unwrap();
        BackendProcess::new(child)
    }

    #[test]
    fn test_terminate_stops_whole_group() {
        // sh stays the leader while sleep runs as a second group member
        let process = spawn_group("sleep 30 & wait");
        let pid = process.pid();
        std::thread::sleep(Duration::from_millis(100));

        let outcome = process.terminate(Duration::from_secs(2));
        assert!(matches!(outcome, TerminationOutcome::Exited(_) | TerminationOutcome::Killed));
        assert!(wait_until_group_gone(pid));
    }

    #[test]
    fn test_terminate_escalates_when_term_is_ignored() {
        let process = spawn_group("trap '' TERM; while true; do sleep 1; done");
        let pid = process.pid();
        std::thread::sleep(Duration::from_millis(100));

        let outcome = process.terminate(Duration::from_millis(300));
        assert_eq!(outcome, TerminationOutcome::Killed);
        assert!(wait_until_group_gone(pid));
    }

    #[test]
    fn test_terminate_after_exit_reports_status() {
        let mut process = spawn_group("exit 7");
        let deadline = Instant::now() + Duration::from_secs(3);
        while process.try_exit_status().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let outcome = process.terminate(Duration::from_secs(1));
        assert_eq!(outcome, TerminationOutcome::AlreadyExited(Some(7)));
    }

    #[test]
    fn test_drop_kills_running_backend() {
        let process = spawn_group("sleep 30");
        let pid = process.pid();
        drop(process);
        assert!(wait_until_group_gone(pid));
    }
}
