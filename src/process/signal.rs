//! Platform termination primitives for the backend's process tree.
//!
//! On Unix the backend leads its own process group (pgid == pid), so every
//! signal goes to the group. On Windows `taskkill /T` walks the tree.

use std::io;

#[cfg(unix)]
pub fn request_stop(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGTERM)
}

#[cfg(unix)]
pub fn force_kill_tree(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGKILL)
}

/// Whether any member of the backend's process group is still around
#[cfg(unix)]
pub fn tree_alive(pid: u32) -> bool {
    // SAFETY: killpg only takes plain integers
    unsafe { libc::killpg(pid as libc::pid_t, 0) == 0 }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: killpg only takes plain integers
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    // ESRCH: the whole group is already gone
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(target_os = "windows")]
pub fn request_stop(pid: u32) -> io::Result<()> {
    taskkill(&["/PID", &pid.to_string(), "/T"])
}

#[cfg(target_os = "windows")]
pub fn force_kill_tree(pid: u32) -> io::Result<()> {
    taskkill(&["/F", "/PID", &pid.to_string(), "/T"])
}

#[cfg(target_os = "windows")]
fn taskkill(args: &[&str]) -> io::Result<()> {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let output = std::process::Command::new("taskkill")
        .args(args)
        .creation_flags(CREATE_NO_WINDOW)
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}
