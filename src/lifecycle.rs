/// Application lifecycle for the shell
/// One `ShellLifecycle` per application run. It owns the backend process,
/// remembers when startup began, and guarantees the window is opened once.
/// Tauri keeps it in managed state so the setup hook and the exit hooks see
/// the same instance.
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{LauncherConfig, ReadinessMode};
use crate::error::{LaunchError, LaunchResult};
use crate::port_manager;
use crate::process::{BackendProcess, TerminationOutcome};
use crate::server_log::BackendLog;
use crate::server_spawner::LaunchPlan;
use crate::signals::TerminationSignals;
use crate::window::{WindowHost, WindowSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Nothing to stop: never started, or already stopped
    NotRunning,
    Stopped {
        pid: u32,
        termination: TerminationOutcome,
    },
}

pub struct ShellLifecycle {
    config: LauncherConfig,
    backend: Mutex<Option<BackendProcess>>,
    startup_began: Mutex<Option<Instant>>,
    window_requested: AtomicBool,
    backend_log: Option<BackendLog>,
}

impl ShellLifecycle {
    pub fn new(config: LauncherConfig) -> Self {
        let backend_log = config
            .backend
            .capture_output
            .then(BackendLog::default_location);

        Self {
            config,
            backend: Mutex::new(None),
            startup_began: Mutex::new(None),
            window_requested: AtomicBool::new(false),
            backend_log,
        }
    }

    /// Send captured backend output somewhere other than the default log
    pub fn with_backend_log(mut self, log: BackendLog) -> Self {
        self.backend_log = Some(log);
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Spawn the backend described by the config, relative to this executable
    pub fn start_backend(&self) -> LaunchResult<u32> {
        let plan = LaunchPlan::from_current_exe(&self.config.backend)?;
        self.start_backend_with(&plan)
    }

    /// Spawn the backend from an explicit plan. Only ever succeeds once.
    pub fn start_backend_with(&self, plan: &LaunchPlan) -> LaunchResult<u32> {
        let mut slot = self.backend.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(LaunchError::AlreadyRunning(existing.pid()));
        }

        self.startup_began.lock().get_or_insert_with(Instant::now);

        plan.preflight()?;

        if let Ok(port) = port_manager::url_port(&self.config.window.url) {
            if !port_manager::is_port_available(port) {
                warn!("Port {} is already in use; the backend may fail to bind", port);
            }
        }

        let process = plan.spawn(self.backend_log.as_ref())?;
        let pid = process.pid();
        *slot = Some(process);
        Ok(pid)
    }

    pub fn backend_pid(&self) -> Option<u32> {
        self.backend.lock().as_ref().map(BackendProcess::pid)
    }

    /// Why the backend can no longer serve, if it can't
    fn backend_gone_reason(&self) -> Option<String> {
        let mut slot = self.backend.lock();
        match slot.as_mut() {
            Some(process) => process.try_exit_status().map(|status| status.to_string()),
            None => Some("backend is not running".to_string()),
        }
    }

    /// Open the window once the delay has elapsed and, in probe mode, the
    /// backend answers. Returns `Ok(false)` if a window was already requested.
    pub async fn open_window_when_ready<H>(&self, host: &H) -> LaunchResult<bool>
    where
        H: WindowHost + ?Sized,
    {
        if self.window_requested.swap(true, Ordering::SeqCst) {
            debug!("Window already requested for this run");
            return Ok(false);
        }

        let readiness = &self.config.readiness;
        let began = *self.startup_began.lock().get_or_insert_with(Instant::now);
        let open_at = began + readiness.startup_delay();
        tokio::time::sleep_until(tokio::time::Instant::from_std(open_at)).await;

        if readiness.mode == ReadinessMode::Probe {
            port_manager::wait_for_backend(&self.config.window.url, readiness, || {
                self.backend_gone_reason()
            })
            .await?;
        }

        host.open(&WindowSpec::from_config(&self.config.window))?;
        Ok(true)
    }

    /// Stop the backend. Safe to call any number of times.
    pub fn shutdown(&self) -> ShutdownOutcome {
        let taken = self.backend.lock().take();
        self.stop(taken, self.config.shutdown.grace_period())
    }

    /// Wait for Ctrl-C, SIGTERM or a lost terminal, then stop the backend
    pub async fn shutdown_on_signal(&self, signals: &mut TerminationSignals) -> ShutdownOutcome {
        let name = signals.recv().await;
        info!("Received {}, stopping backend", name);
        self.shutdown()
    }

    /// Shutdown for the panic path: never blocks on the backend lock, no grace period
    pub fn emergency_stop(&self) -> ShutdownOutcome {
        let taken = self.backend.try_lock().and_then(|mut slot| slot.take());
        self.stop(taken, Duration::ZERO)
    }

    fn stop(&self, process: Option<BackendProcess>, grace: Duration) -> ShutdownOutcome {
        let Some(process) = process else {
            debug!("Shutdown requested with no backend running");
            return ShutdownOutcome::NotRunning;
        };

        let pid = process.pid();
        info!("Shutting down backend (PID {}, started {})", pid, process.started_at());
        let termination = process.terminate(grace);
        info!("Backend (PID {}) stopped: {:?}", pid, termination);
        ShutdownOutcome::Stopped { pid, termination }
    }
}
