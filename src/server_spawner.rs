/// Backend process spawning
/// Resolves where the backend lives relative to the launcher, which interpreter
/// runs it, and how the command line is handed to the platform shell.
use std::io::IsTerminal;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::{LaunchError, LaunchResult};
use crate::process::BackendProcess;
use crate::server_log::{self, BackendLog};

/// Operating system identity, as far as backend launching cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    /// `python` on Windows, `python3` everywhere else
    pub fn default_interpreter(self) -> &'static str {
        match self {
            Platform::Windows => "python",
            _ => "python3",
        }
    }
}

/// A fully resolved backend launch: which interpreter, which arguments,
/// and how to start it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub interpreter: String,
    pub args: Vec<String>,
    pub entry_point: PathBuf,
    pub use_shell: bool,
    pub capture_output: bool,
    pub platform: Platform,
}

impl LaunchPlan {
    /// Plan for `interpreter <entry_point>` through the platform shell
    pub fn new(interpreter: impl Into<String>, entry_point: impl Into<PathBuf>) -> Self {
        let entry_point = entry_point.into();
        Self {
            interpreter: interpreter.into(),
            args: vec![entry_point.to_string_lossy().to_string()],
            entry_point,
            use_shell: true,
            capture_output: false,
            platform: Platform::current(),
        }
    }

    /// Resolve the plan against an explicit install directory and platform
    pub fn resolve(config: &BackendConfig, install_dir: &Path, platform: Platform) -> Self {
        let entry_point = resolve_entry_point(install_dir, &config.entry_point);
        let interpreter = config
            .interpreter
            .clone()
            .unwrap_or_else(|| platform.default_interpreter().to_string());

        Self {
            use_shell: config.use_shell,
            capture_output: config.capture_output,
            platform,
            ..Self::new(interpreter, entry_point)
        }
    }

    /// Resolve the plan relative to the running launcher executable
    pub fn from_current_exe(config: &BackendConfig) -> LaunchResult<Self> {
        let install_dir = install_dir()?;
        debug!("Launcher install dir: {:?}", install_dir);
        Ok(Self::resolve(config, &install_dir, Platform::current()))
    }

    /// The program and arguments actually handed to the OS
    pub fn program(&self) -> (String, Vec<String>) {
        if !self.use_shell {
            return (self.interpreter.clone(), self.args.clone());
        }

        match self.platform {
            // /S: cmd strips exactly the outer quotes and runs the rest verbatim
            Platform::Windows => (
                "cmd".to_string(),
                vec![
                    "/S".to_string(),
                    "/C".to_string(),
                    format!("\"{}\"", self.shell_command_line()),
                ],
            ),
            _ => (
                "sh".to_string(),
                vec!["-c".to_string(), self.shell_command_line()],
            ),
        }
    }

    /// `interpreter arg...` quoted for the platform shell
    pub fn shell_command_line(&self) -> String {
        let quote: fn(&str) -> String = match self.platform {
            Platform::Windows => quote_windows,
            _ => quote_posix,
        };

        std::iter::once(self.interpreter.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Catch the failures we can see before spawning
    pub fn preflight(&self) -> LaunchResult<()> {
        let resolved = which::which(&self.interpreter)
            .map_err(|_| LaunchError::InterpreterNotFound(self.interpreter.clone()))?;
        debug!("Interpreter {} resolved to {:?}", self.interpreter, resolved);

        if !self.entry_point.exists() {
            return Err(LaunchError::EntryPointMissing(self.entry_point.clone()));
        }
        Ok(())
    }

    /// Spawn the backend in its own process group
    pub fn spawn(&self, log: Option<&BackendLog>) -> LaunchResult<BackendProcess> {
        let (program, args) = self.program();
        info!("Starting backend: {} {:?}", program, args);

        let mut cmd = Command::new(&program);

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            const CREATE_NO_WINDOW: u32 = 0x08000000;

            // cmd.exe has its own quoting rules, so the line goes through untouched
            if self.use_shell {
                for arg in &args {
                    cmd.raw_arg(arg);
                }
            } else {
                cmd.args(&args);
            }
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        }

        #[cfg(not(target_os = "windows"))]
        {
            cmd.args(&args);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let capture = self.capture_output && log.is_some();
        if inherits_stdin(Platform::current(), std::io::stdin().is_terminal()) {
            cmd.stdin(Stdio::inherit());
        } else {
            // A background process group reading the terminal is stopped by SIGTTIN
            debug!("Launcher stdin is a terminal, backend gets /dev/null");
            cmd.stdin(Stdio::null());
        }
        if capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let (true, Some(log)) = (capture, log) {
            log.start_session(child.id());
            server_log::capture_output(&mut child, log);
        }

        let process = BackendProcess::new(child);
        info!("Backend started with PID {}", process.pid());
        Ok(process)
    }
}

/// Directory containing the launcher executable
pub fn install_dir() -> LaunchResult<PathBuf> {
    let exe_path = std::env::current_exe().map_err(LaunchError::InstallDir)?;
    exe_path.parent().map(Path::to_path_buf).ok_or_else(|| {
        LaunchError::InstallDir(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{:?} has no parent directory", exe_path),
        ))
    })
}

/// Join a configured entry point onto the install directory, folding `..`
pub fn resolve_entry_point(install_dir: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        normalize_lexically(configured)
    } else {
        normalize_lexically(&install_dir.join(configured))
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn quote_posix(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

fn quote_windows(word: &str) -> String {
    if word.contains([' ', '\t', '&', '(', ')', '^', '|', '<', '>']) {
        format!("\"{}\"", word)
    } else {
        word.to_string()
    }
}

/// Whether the backend can share the launcher's stdin. On Unix it runs outside
/// the terminal's foreground group, so a terminal stdin can't be handed over.
fn inherits_stdin(platform: Platform, stdin_is_terminal: bool) -> bool {
    platform == Platform::Windows || !stdin_is_terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_follows_platform() {
        assert_eq!(Platform::Windows.default_interpreter(), "python");
        assert_eq!(Platform::MacOs.default_interpreter(), "python3");
        assert_eq!(Platform::Linux.default_interpreter(), "python3");
        assert_eq!(Platform::Other.default_interpreter(), "python3");
    }

    #[test]
    fn test_entry_point_is_one_level_up() {
        let resolved = resolve_entry_point(Path::new("/opt/shell/bin"), Path::new("../dist/run"));
        assert_eq!(resolved, PathBuf::from("/opt/shell/dist/run"));

        let resolved = resolve_entry_point(Path::new("/opt/shell/bin"), Path::new("./backend/./run"));
        assert_eq!(resolved, PathBuf::from("/opt/shell/bin/backend/run"));
    }

    #[test]
    fn test_normalize_keeps_leading_parent_dirs() {
        assert_eq!(normalize_lexically(Path::new("../../a/../b")), PathBuf::from("../../b"));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_entry_point_is_used_as_is() {
        let resolved = resolve_entry_point(Path::new("/opt/shell/bin"), Path::new("/srv/app/run"));
        assert_eq!(resolved, PathBuf::from("/srv/app/run"));
    }

    #[test]
    fn test_plan_has_single_entry_point_argument() {
        let config = BackendConfig::default();

        let plan = LaunchPlan::resolve(&config, Path::new("/opt/shell/bin"), Platform::Windows);
        assert_eq!(plan.interpreter, "python");
        assert_eq!(plan.args, vec![plan.entry_point.to_string_lossy().to_string()]);

        let plan = LaunchPlan::resolve(&config, Path::new("/opt/shell/bin"), Platform::Linux);
        assert_eq!(plan.interpreter, "python3");
        assert_eq!(plan.args, vec!["/opt/shell/dist/run".to_string()]);
        assert!(plan.use_shell);
    }

    #[test]
    fn test_configured_interpreter_wins() {
        let config = BackendConfig {
            interpreter: Some("/usr/local/bin/python3.12".to_string()),
            ..BackendConfig::default()
        };
        let plan = LaunchPlan::resolve(&config, Path::new("/opt/shell/bin"), Platform::Windows);
        assert_eq!(plan.interpreter, "/usr/local/bin/python3.12");
    }

    #[test]
    fn test_posix_shell_rendering() {
        let plan = LaunchPlan {
            platform: Platform::Linux,
            ..LaunchPlan::new("python3", "/opt/it's here/dist/run")
        };
        let (program, args) = plan.program();
        assert_eq!(program, "sh");
        assert_eq!(args[0], "-c");
        assert_eq!(args[1], r"'python3' '/opt/it'\''s here/dist/run'");
    }

    #[test]
    fn test_windows_shell_rendering() {
        let plan = LaunchPlan {
            platform: Platform::Windows,
            ..LaunchPlan::new("python", r"C:\Program Files\Shell\dist\run")
        };
        let (program, args) = plan.program();
        assert_eq!(program, "cmd");
        assert_eq!(
            args,
            vec![
                "/S".to_string(),
                "/C".to_string(),
                r#""python "C:\Program Files\Shell\dist\run"""#.to_string(),
            ]
        );
    }

    #[test]
    fn test_without_shell_runs_interpreter_directly() {
        let plan = LaunchPlan {
            use_shell: false,
            ..LaunchPlan::new("python3", "/opt/shell/dist/run")
        };
        let (program, args) = plan.program();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["/opt/shell/dist/run".to_string()]);
    }

    #[test]
    fn test_terminal_stdin_is_withheld_outside_windows() {
        assert!(!inherits_stdin(Platform::Linux, true));
        assert!(!inherits_stdin(Platform::MacOs, true));
        assert!(inherits_stdin(Platform::Linux, false));
        assert!(inherits_stdin(Platform::Windows, true));
    }

    #[test]
    fn test_preflight_reports_missing_interpreter() {
        let plan = LaunchPlan::new("resume-shell-no-such-interpreter", "/nonexistent/run");
        assert!(matches!(
            plan.preflight(),
            Err(LaunchError::InterpreterNotFound(name)) if name == "resume-shell-no-such-interpreter"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_preflight_reports_missing_entry_point() {
        let plan = LaunchPlan::new("sh", "/nonexistent/resume-shell/dist/run");
        assert!(matches!(plan.preflight(), Err(LaunchError::EntryPointMissing(_))));
    }
}
