/// Backend output capture
/// When output capture is enabled the backend's stdout/stderr are piped here:
/// every line lands in a timestamped log file and in tracing.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::app::{APP_ID, BACKEND_LOG_FILE_NAME};

#[derive(Debug, Clone)]
pub struct BackendLog {
    path: PathBuf,
    // Shared by the pump threads so an unwritable log is reported once
    warned: Arc<AtomicBool>,
}

impl BackendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Platform-specific location for the backend log
    /// - macOS: ~/Library/Application Support/<app>/logs/backend.log
    /// - Windows: %LOCALAPPDATA%\<app>\logs\backend.log
    /// - Linux: ~/.local/share/<app>/logs/backend.log
    pub fn default_location() -> Self {
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_ID)
            .join("logs");
        Self::new(log_dir.join(BACKEND_LOG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates the log and writes a header for a fresh backend run
    pub fn start_session(&self, pid: u32) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let result = self.open(true).and_then(|mut file| {
            writeln!(file, "=== backend (PID {}) started at {} ===", pid, timestamp)
        });
        self.report(result);
    }

    /// Appends a timestamped line
    pub fn append(&self, line: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let result = self
            .open(false)
            .and_then(|mut file| writeln!(file, "[{}] {}", timestamp, line));
        self.report(result);
    }

    fn open(&self, truncate: bool) -> io::Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        options.open(&self.path)
    }

    fn report(&self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!("Cannot write backend log {:?}: {}", self.path, e);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Out,
    Err,
}

/// Takes the child's piped stdout/stderr and pumps them on background threads
pub fn capture_output(child: &mut Child, log: &BackendLog) {
    if let Some(stdout) = child.stdout.take() {
        let log = log.clone();
        std::thread::spawn(move || pump(stdout, Stream::Out, &log));
    }
    if let Some(stderr) = child.stderr.take() {
        let log = log.clone();
        std::thread::spawn(move || pump(stderr, Stream::Err, &log));
    }
}

/// Reads until the pipe closes. Lines that aren't UTF-8 are converted lossily
/// so the pipe keeps draining.
fn pump(source: impl Read, stream: Stream, log: &BackendLog) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Stopped reading backend {:?}: {}", stream, e);
                break;
            }
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        record_line(log, stream, line);
    }
}

fn record_line(log: &BackendLog, stream: Stream, line: &str) {
    match stream {
        Stream::Out => {
            log.append(&format!("[OUT] {}", line));
            info!("[Backend] {}", line);
        }
        Stream::Err => {
            log.append(&format!("[ERR] {}", line));
            if looks_like_error(line) {
                error!("[Backend Error] {}", line);
            } else {
                info!("[Backend] {}", line);
            }
        }
    }
}

/// Python servers write all their logging to stderr, so only flag real failures
fn looks_like_error(line: &str) -> bool {
    line.contains("ERROR") || line.contains("Traceback") || line.contains("Exception")
}
