use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between "app ready" and "window visible",
/// plus the teardown path.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("could not determine the launcher install directory: {0}")]
    InstallDir(#[source] std::io::Error),

    #[error("interpreter `{0}` was not found on PATH")]
    InterpreterNotFound(String),

    #[error("backend entry point not found at {}", .0.display())]
    EntryPointMissing(PathBuf),

    #[error("failed to spawn backend `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend is already running (PID {0})")]
    AlreadyRunning(u32),

    #[error("backend exited before accepting connections ({0})")]
    BackendExited(String),

    #[error("backend at {url} did not accept connections within {waited_ms} ms")]
    ReadinessTimeout { url: String, waited_ms: u64 },

    #[error("invalid backend URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to create window: {0}")]
    Window(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type LaunchResult<T> = Result<T, LaunchError>;
