use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::app::{APP_ID, APP_NAME, CONFIG_FILE_NAME};

/// Launcher configuration settings
///
/// Every field has a default, so a partial (or absent) `launcher.json`
/// behaves exactly like the stock shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub backend: BackendConfig,
    pub window: WindowConfig,
    pub readiness: ReadinessConfig,
    pub shutdown: ShutdownConfig,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend entry point. Relative paths are resolved against the
    /// directory holding the launcher executable.
    pub entry_point: PathBuf,

    /// Interpreter override. `None` picks `python` on Windows, `python3` elsewhere.
    pub interpreter: Option<String>,

    /// Run the interpreter through `sh -c` / `cmd /C`
    pub use_shell: bool,

    /// Pipe backend stdout/stderr into the backend log instead of inheriting them
    pub capture_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub url: String,

    /// Keep the loaded page away from host IPC
    pub context_isolation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessMode {
    /// Open the window once the delay elapses, whatever the backend is doing
    FixedDelay,
    /// Wait for the delay, then poll the URL until the backend answers
    Probe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub mode: ReadinessMode,
    pub startup_delay_ms: u64,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time between the polite termination request and the forced kill
    pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            entry_point: PathBuf::from("..").join("dist").join("run"),
            interpreter: None,
            use_shell: true,
            capture_output: false,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: APP_NAME.to_string(),
            width: 1200,
            height: 800,
            url: "http://localhost:8501".to_string(),
            context_isolation: true,
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            mode: ReadinessMode::Probe,
            startup_delay_ms: 3000,
            probe_interval_ms: 250,
            probe_timeout_ms: 30_000,
            request_timeout_ms: 1000,
        }
    }
}

impl ReadinessConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5000,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl LauncherConfig {
    /// Load configuration from the user config directory, falling back to defaults
    ///
    /// Called before tracing is initialised, so problems are reported on stderr.
    pub fn load() -> Self {
        let Some(config_path) = Self::config_path() else {
            return Self::default();
        };

        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Ignoring launcher config: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Log where the effective configuration came from
    pub fn log_source(&self) {
        match Self::config_path() {
            Some(path) if path.exists() => info!("Launcher config: {:?}", path),
            Some(path) => info!("No launcher config at {:?}, using defaults", path),
            None => warn!("No config directory on this platform, using defaults"),
        }
    }

    /// `<config_dir>/<app id>/launcher.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join(CONFIG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("resume-shell-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_stock_shell() {
        let config = LauncherConfig::default();
        assert_eq!(config.window.url, "http://localhost:8501");
        assert_eq!(config.window.width, 1200);
        assert_eq!(config.window.height, 800);
        assert!(config.window.context_isolation);
        assert_eq!(config.readiness.startup_delay_ms, 3000);
        assert_eq!(config.backend.entry_point, PathBuf::from("../dist/run"));
        assert!(config.backend.use_shell);
        assert!(!config.backend.capture_output);
        assert!(config.backend.interpreter.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = temp_config(r#"{ "readiness": { "mode": "fixed-delay" }, "log_level": "debug" }"#);
        let config = LauncherConfig::load_from(&path).unwrap();

        assert_eq!(config.readiness.mode, ReadinessMode::FixedDelay);
        assert_eq!(config.readiness.startup_delay_ms, 3000);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.window.url, "http://localhost:8501");

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = temp_config("{ not json");
        let err = LauncherConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse"));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_log_level_maps_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
        assert_eq!(tracing::Level::from(LogLevel::default()), tracing::Level::INFO);
    }
}
